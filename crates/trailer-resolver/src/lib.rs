//! Resolution orchestration for the trailer resolution engine: the
//! candidate-source race (C10), the bounded-concurrency request gate
//! (C11), and background cache warm-up/eviction (C4.12).

pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod orchestrator;
pub mod warmup;

pub use config::ResolverConfig;
pub use error::{ResolverError, ResolverResult};
pub use gate::RequestGate;
pub use logging::ResolutionLogger;
pub use orchestrator::{parse_request_id, EpisodeHint, Orchestrator, StreamEntry};
pub use warmup::Warmup;
