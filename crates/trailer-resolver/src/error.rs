//! Resolver error types.
//!
//! Per §4.14/§7, a resolution failure of any kind degrades to an empty
//! result at the HTTP edge rather than propagating as a 4xx/5xx — this
//! enum exists for internal flow control and logging, not for the
//! response surface.

use thiserror::Error;

pub type ResolverResult<T> = Result<T, ResolverError>;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("metadata lookup failed: {0}")]
    Metadata(#[from] trailer_metadata::MetadataError),

    #[error("storage error: {0}")]
    Storage(#[from] trailer_store::StorageError),

    #[error("source error: {0}")]
    Source(#[from] trailer_sources::SourceError),

    #[error("no metadata record for this id")]
    NotFound,

    #[error("request gate deadline exceeded")]
    GateDeadlineExceeded,
}
