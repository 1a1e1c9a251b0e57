//! HTTP surface for the trailer resolution engine.
//!
//! This crate provides:
//! - The resolution endpoint, gated by C11's bounded-concurrency semaphore
//! - A static addon manifest
//! - Liveness/readiness health checks
//! - Cache/cookie admin endpoints and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
