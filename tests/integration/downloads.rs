//! Download integration tests: archives land in a temporary directory.

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

use casewatch::actions::{self, DownloadFlags};
use casewatch::case::CaseId;

use crate::fixtures::{case, FakeService};

fn built(id: u64) -> casewatch::Case {
    case(id, "BUILT", Some("SUCCESS"), Some("SUCCESS"))
}

/// Test: Missing content-disposition
/// Then the archive is saved as `{id}.zip`
#[tokio::test]
async fn test_download_falls_back_to_id_filename() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::new(vec![built(42)]);
    service.with_archive(None, b"PK\x03\x04results");

    let path = assert_ok!(actions::download_case(&service, CaseId(42), dir.path()).await);

    assert_eq!(path, dir.path().join("42.zip"));
    assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04results");
}

#[tokio::test]
async fn test_download_uses_header_filename() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::new(vec![built(42)]);
    service.with_archive(Some(r#"attachment; filename="case_42_hist.tar.gz""#), b"data");

    let path = assert_ok!(actions::download_case(&service, CaseId(42), dir.path()).await);
    assert_eq!(path.file_name().unwrap(), "case_42_hist.tar.gz");
}

#[tokio::test]
async fn test_download_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("results").join("niwot");
    let service = FakeService::new(vec![built(5)]);
    service.with_archive(None, b"data");

    let path = assert_ok!(actions::download_case(&service, CaseId(5), &target).await);
    assert!(path.starts_with(&target));
    assert!(path.exists());
}

/// Test: Failed download
/// Then no file is written and the in-flight mark is still cleared
#[test]
fn test_failed_download_clears_flag() {
    let dir = TempDir::new().unwrap();
    let service = FakeService::new(Vec::new());
    let flags = DownloadFlags::new();

    let guard = flags.begin(CaseId(9));
    assert!(flags.is_downloading(CaseId(9)));

    let result = tokio_test::block_on(async move {
        let _guard = guard;
        actions::download_case(&service, CaseId(9), dir.path()).await
    });

    assert_err!(result);
    assert!(!flags.is_downloading(CaseId(9)));
}
