use thiserror::Error;

use crate::case::CaseId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Case not found: {0}")]
    CaseNotFound(CaseId),

    #[error("No active site selected")]
    NoActiveSite,

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Whether a later retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Api { status, .. } => status.is_server_error(),
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", Error::NoHomeDir), "No home directory");
        assert_eq!(
            format!("{}", Error::CaseNotFound(CaseId(42))),
            "Case not found: 42"
        );
        assert_eq!(
            format!(
                "{}",
                Error::Api {
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: "missing".to_string(),
                }
            ),
            "API error (404 Not Found): missing"
        );
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = Error::Api {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert!(err.is_transient());

        let err = Error::Api {
            status: reqwest::StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(!err.is_transient());
        assert!(!Error::NoActiveSite.is_transient());
    }
}
