//! Circuit Breaker (C4): per-instance fault isolation for replicated sources
//! (proxy pool, legacy Piped/Invidious instance lists).
//!
//! Circuit rows are memory-only per §3 "Ownership & lifecycle" — nothing
//! here is flushed to the persistence store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use trailer_models::CircuitState;

pub struct CircuitRegistry {
    circuits: RwLock<HashMap<String, CircuitState>>,
}

impl CircuitRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            circuits: RwLock::new(HashMap::new()),
        })
    }

    pub async fn is_available(&self, identifier: &str) -> bool {
        let circuits = self.circuits.read().await;
        match circuits.get(identifier) {
            Some(state) => state.is_available(Utc::now()),
            None => true,
        }
    }

    pub async fn record_failure(&self, identifier: &str) {
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(identifier.to_string())
            .or_insert_with(|| CircuitState::new(identifier))
            .record_failure(Utc::now());
    }

    pub async fn record_success(&self, identifier: &str) {
        let mut circuits = self.circuits.write().await;
        circuits
            .entry(identifier.to_string())
            .or_insert_with(|| CircuitState::new(identifier))
            .record_success();
    }

    /// Filter a candidate list down to instances whose circuit currently
    /// permits an attempt, preserving input order.
    pub async fn filter_available(&self, candidates: Vec<String>) -> Vec<String> {
        let circuits = self.circuits.read().await;
        candidates
            .into_iter()
            .filter(|id| circuits.get(id).map(|c| c.is_available(Utc::now())).unwrap_or(true))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_five_failures_and_filters_candidate() {
        let registry = CircuitRegistry::new();
        for _ in 0..5 {
            registry.record_failure("proxy-1").await;
        }
        assert!(!registry.is_available("proxy-1").await);

        let filtered = registry
            .filter_available(vec!["proxy-1".to_string(), "proxy-2".to_string()])
            .await;
        assert_eq!(filtered, vec!["proxy-2".to_string()]);
    }

    #[tokio::test]
    async fn success_clears_open_circuit() {
        let registry = CircuitRegistry::new();
        for _ in 0..5 {
            registry.record_failure("proxy-1").await;
        }
        registry.record_success("proxy-1").await;
        assert!(registry.is_available("proxy-1").await);
    }
}
