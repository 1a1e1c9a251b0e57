//! Shared data models for the trailer resolution engine.
//!
//! This crate provides the Serde-serializable types that flow between the
//! persistence store, the cache, the tracker, and the per-source resolvers:
//! the cached artifact itself, the learned success/quality statistics, the
//! circuit-breaker state, the rotatable archive cookie, and the transient
//! canonical-title record produced by the metadata resolver.

pub mod artifact;
pub mod cookie;
pub mod retry;
pub mod stats;
pub mod title;

pub use artifact::{ResolvedArtifact, SourceType};
pub use cookie::ArchiveCookie;
pub use retry::{retry_async, FailureTracker, RetryConfig, RetryResult};
pub use stats::{quality_score, CircuitState, QualityStat, QualityTier, StatType, SuccessStat};
pub use title::{CanonicalTitle, MediaType, VideoSite};
