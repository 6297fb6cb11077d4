//! User-triggered case actions: run, download, create, edit, delete.
//!
//! Each action talks to the service and reports the resulting snapshot to
//! the store. None of them retries; a failure is logged and returned, and
//! the user can simply trigger the action again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;

use crate::case::{Case, CaseId, CaseUpdate, NewCase};
use crate::client::CaseService;
use crate::store::{CaseStore, StoreEvent};
use crate::{cwlog, cwlog_debug, cwlog_error, Error, Result};

/// Trigger a run. The returned snapshot replaces the local one; the poll
/// supervisor picks it up from there.
pub async fn run_case(service: &dyn CaseService, store: &dyn CaseStore, id: CaseId) -> Result<Case> {
    match service.run_case(id).await {
        Ok(case) => {
            cwlog!("Run triggered for case {}: status={}", id, case.status);
            store.dispatch(StoreEvent::UpdateSelectedSiteCase { case: case.clone() });
            Ok(case)
        }
        Err(e) => {
            cwlog_error!("Run failed for case {}: {}", id, e);
            Err(e)
        }
    }
}

pub async fn create_case(
    service: &dyn CaseService,
    store: &dyn CaseStore,
    request: &NewCase,
) -> Result<Case> {
    if request.name.trim().is_empty() {
        return Err(Error::Validation("case name cannot be empty".to_string()));
    }
    match service.create_case(request).await {
        Ok(case) => {
            cwlog!("Case {} created on site {}", case.id, request.site);
            store.dispatch(StoreEvent::AddSelectedSiteCase { case: case.clone() });
            Ok(case)
        }
        Err(e) => {
            cwlog_error!("Create failed for '{}': {}", request.name, e);
            Err(e)
        }
    }
}

/// Edit the name and/or variables of a case. The returned snapshot replaces
/// the local one.
pub async fn update_case(
    service: &dyn CaseService,
    store: &dyn CaseStore,
    id: CaseId,
    update: &CaseUpdate,
) -> Result<Case> {
    if update.is_empty() {
        return Err(Error::Validation("nothing to change".to_string()));
    }
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::Validation("case name cannot be empty".to_string()));
    }
    match service.update_case(id, update).await {
        Ok(case) => {
            cwlog!("Case {} edited: name={}", id, case.display_name());
            store.dispatch(StoreEvent::UpdateSelectedSiteCase { case: case.clone() });
            Ok(case)
        }
        Err(e) => {
            cwlog_error!("Edit failed for case {}: {}", id, e);
            Err(e)
        }
    }
}

pub async fn delete_case(service: &dyn CaseService, store: &dyn CaseStore, id: CaseId) -> Result<()> {
    match service.delete_case(id).await {
        Ok(()) => {
            cwlog!("Case {} deleted", id);
            store.dispatch(StoreEvent::RemoveSelectedSiteCase { id });
            Ok(())
        }
        Err(e) => {
            cwlog_error!("Delete failed for case {}: {}", id, e);
            Err(e)
        }
    }
}

/// Download the results archive of a case into `dir`, returning the saved path.
pub async fn download_case(service: &dyn CaseService, id: CaseId, dir: &Path) -> Result<PathBuf> {
    let archive = match service.download_case(id).await {
        Ok(archive) => archive,
        Err(e) => {
            cwlog_error!("Download failed for case {}: {}", id, e);
            return Err(e);
        }
    };

    let filename = download_filename(archive.content_disposition.as_deref(), id);
    let path = dir.join(filename);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, &archive.bytes).await?;
    cwlog!(
        "Case {} results saved to {} ({} bytes)",
        id,
        path.display(),
        archive.bytes.len()
    );
    Ok(path)
}

/// Quoted file name in a `content-disposition` header.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"filename="(.*)""#).unwrap());

/// File name for a downloaded archive: the `filename="..."` value of the
/// `content-disposition` header, or `{id}.zip`. Directory parts are stripped.
pub fn download_filename(content_disposition: Option<&str>, id: CaseId) -> String {
    content_disposition
        .and_then(|header| FILENAME_RE.captures(header))
        .and_then(|caps| caps.get(1))
        .and_then(|m| Path::new(m.as_str()).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{id}.zip"))
}

/// In-flight download markers, one counter per case.
///
/// Marking does not block a second download of the same case; it only lets
/// the view show a busy indicator until every download of that case ends.
#[derive(Debug, Clone, Default)]
pub struct DownloadFlags {
    in_flight: Arc<Mutex<HashMap<CaseId, usize>>>,
}

impl DownloadFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a download as started. The mark is removed when the guard drops.
    pub fn begin(&self, id: CaseId) -> InFlight {
        *self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert(0) += 1;
        cwlog_debug!("Download started for case {}", id);
        InFlight {
            id,
            flags: self.clone(),
        }
    }

    pub fn is_downloading(&self, id: CaseId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn finish(&self, id: CaseId) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_flight.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&id);
            }
        }
    }
}

/// Clears its download mark on drop, whatever way the download ended.
#[derive(Debug)]
pub struct InFlight {
    id: CaseId,
    flags: DownloadFlags,
}

impl InFlight {
    pub fn case_id(&self) -> CaseId {
        self.id
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flags.finish(self.id);
    }
}
