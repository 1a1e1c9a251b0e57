//! Persistence, caching, tracking and circuit-breaking for the trailer
//! resolution engine.
//!
//! This crate groups C1 (Persistence Store), C2 (Resolution Cache), C3
//! (Success/Quality Tracker) and C4 (Circuit Breaker) because the design
//! couples their writes through one batched-flush mechanism onto a single
//! SQLite file — splitting them into separate crates would only scatter
//! that coupling across crate boundaries.

pub mod cache;
pub mod circuit;
pub mod cookies;
pub mod db;
pub mod error;
pub mod tracker;

pub use cache::{Cache, UrlValidator, ValidationOutcome, CACHE_CAPACITY};
pub use circuit::CircuitRegistry;
pub use cookies::CookieJar;
pub use db::Db;
pub use error::{StorageError, StorageResult};
pub use tracker::{Tracker, STAT_CAPACITY_PER_TYPE};
