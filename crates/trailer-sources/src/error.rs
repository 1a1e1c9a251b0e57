//! Per-source resolution error types.

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no candidate found")]
    NotFound,

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("{binary} not found on PATH")]
    BinaryNotFound { binary: &'static str },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected response shape: {0}")]
    Shape(String),

    #[error("request rejected by remote as unauthorized (status {0})")]
    AuthRejected(u16),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            SourceError::Timeout(_) => true,
            _ => false,
        }
    }
}
