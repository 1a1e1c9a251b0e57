//! Resolver configuration, following this codebase's `*Config::from_env()`
//! idiom (see `trailer-api/src/config.rs` for the sibling HTTP-edge config).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// C11 Request Gate: max concurrent in-flight resolutions.
    pub gate_capacity: usize,
    /// C11 Request Gate: hard wall deadline per request.
    pub request_deadline: Duration,
    /// C2 Resolution Cache capacity.
    pub cache_capacity: usize,
    /// C3 Tracker per-type stat capacity.
    pub stat_capacity: usize,
    /// C1/C2/C3 batched-flush interval.
    pub flush_interval: Duration,
    /// C7 proxy pool, one URL per forward-proxy endpoint.
    pub proxy_list: Vec<String>,
    /// C8 seed cookie string, if any.
    pub archive_cookie: Option<String>,
    /// Path to the local SQLite database file.
    pub db_path: String,
    /// API key for the metadata resolver (C5).
    pub metadata_api_key: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            gate_capacity: 5,
            request_deadline: Duration::from_secs(15),
            cache_capacity: 10_000,
            stat_capacity: 5_000,
            flush_interval: Duration::from_millis(150),
            proxy_list: Vec::new(),
            archive_cookie: None,
            db_path: "trailers.db".to_string(),
            metadata_api_key: String::new(),
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            gate_capacity: std::env::var("RESOLVER_GATE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.gate_capacity),
            request_deadline: Duration::from_secs(
                std::env::var("RESOLVER_REQUEST_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.request_deadline.as_secs()),
            ),
            cache_capacity: std::env::var("RESOLVER_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.cache_capacity),
            stat_capacity: std::env::var("RESOLVER_STAT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.stat_capacity),
            flush_interval: Duration::from_millis(
                std::env::var("RESOLVER_FLUSH_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.flush_interval.as_millis() as u64),
            ),
            proxy_list: std::env::var("PROXY_LIST")
                .ok()
                .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
                .unwrap_or_default(),
            archive_cookie: std::env::var("ARCHIVE_COOKIE").ok(),
            db_path: std::env::var("DB_PATH").unwrap_or(default.db_path),
            metadata_api_key: std::env::var("TMDB_API_KEY").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let config = ResolverConfig::default();
        assert_eq!(config.gate_capacity, 5);
        assert_eq!(config.request_deadline, Duration::from_secs(15));
        assert_eq!(config.cache_capacity, 10_000);
        assert_eq!(config.stat_capacity, 5_000);
    }

    #[test]
    fn proxy_list_parses_comma_separated_env() {
        std::env::set_var("PROXY_LIST", "http://p1:8080, http://p2:8080,");
        let config = ResolverConfig::from_env();
        assert_eq!(config.proxy_list, vec!["http://p1:8080", "http://p2:8080"]);
        std::env::remove_var("PROXY_LIST");
    }
}
