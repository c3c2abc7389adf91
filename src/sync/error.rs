use thiserror::Error;

/// Failures of the sync client. Rendered with `Display` into the roster's error field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("server rejected the request")]
    Rejected,
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("change feed error: {0}")]
    Feed(String),
    #[error("change feed closed")]
    Closed,
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}
