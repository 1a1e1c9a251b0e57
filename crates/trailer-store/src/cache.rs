//! Resolution cache (C2): hot in-memory map with source-aware TTL and
//! pre-expiry revalidation, backed by batched durable writes to C1.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use trailer_models::{ResolvedArtifact, SourceType};

use crate::db::Db;
use crate::error::StorageResult;

/// Cache capacity cap per §3: beyond this, evict oldest by timestamp.
pub const CACHE_CAPACITY: usize = 10_000;

/// How often queued mutations are flushed to SQLite as one transaction (§4.1).
const FLUSH_INTERVAL: Duration = Duration::from_millis(150);

/// Outcome of a [`UrlValidator`] probe against a resolved artifact's URL.
///
/// Only `Gone` causes eviction (§4.9/§7 upstream-gone). Everything else,
/// including network errors and timeouts, is treated as still-valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Gone,
}

/// Seam for C9 (the URL Validator) so `trailer-store` doesn't need to depend
/// on `trailer-sources`' HTTP client. `trailer-resolver` wires the concrete
/// implementation in at construction time.
#[async_trait]
pub trait UrlValidator: Send + Sync {
    async fn probe(&self, url: &str) -> ValidationOutcome;
}

pub struct Cache {
    entries: RwLock<HashMap<String, ResolvedArtifact>>,
    db: Db,
    flush_tx: mpsc::UnboundedSender<ResolvedArtifact>,
}

impl Cache {
    pub async fn new(db: Db) -> StorageResult<Arc<Self>> {
        let seed = db.load_recent_cache(CACHE_CAPACITY as i64).await?;
        let mut entries = HashMap::with_capacity(seed.len());
        for artifact in seed {
            entries.insert(artifact.imdb_id.clone(), artifact);
        }
        info!(loaded = entries.len(), "hydrated resolution cache from disk");

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let cache = Arc::new(Self {
            entries: RwLock::new(entries),
            db,
            flush_tx,
        });
        spawn_flusher(cache.db.clone(), flush_rx);
        Ok(cache)
    }

    /// §4.2 `get`: present and unexpired, else absent.
    pub async fn get(&self, imdb_id: &str) -> Option<ResolvedArtifact> {
        let entries = self.entries.read().await;
        entries.get(imdb_id).filter(|a| !a.is_expired()).cloned()
    }

    /// §4.2 `get_with_validation`: as `get`, but pre-expiry-revalidates via
    /// the injected [`UrlValidator`] when the entry is old enough to be
    /// worth probing. Only a `Gone` outcome evicts.
    pub async fn get_with_validation(&self, imdb_id: &str, validator: &dyn UrlValidator) -> Option<ResolvedArtifact> {
        let candidate = {
            let entries = self.entries.read().await;
            entries.get(imdb_id).cloned()
        }?;

        if candidate.is_expired() {
            return None;
        }

        if candidate.needs_revalidation() {
            match validator.probe(&candidate.preview_url).await {
                ValidationOutcome::Gone => {
                    debug!(imdb_id, "validator reports artifact gone, evicting");
                    self.delete(imdb_id).await;
                    return None;
                }
                ValidationOutcome::Valid => {}
            }
        }

        Some(candidate)
    }

    /// §4.2 `set`: stamps `timestamp=now`, infers `source_type` from the URL
    /// host if not supplied, writes in-memory immediately, enqueues the
    /// durable write. Never called for a failed resolution (no negative
    /// caching, invariant 1).
    pub async fn set(&self, mut artifact: ResolvedArtifact) {
        artifact.timestamp = Utc::now();
        if artifact.preview_url.is_empty() {
            warn!(imdb_id = %artifact.imdb_id, "refusing to cache artifact with empty preview_url");
            return;
        }

        let mut entries = self.entries.write().await;
        entries.insert(artifact.imdb_id.clone(), artifact.clone());
        let over_capacity = entries.len().saturating_sub(CACHE_CAPACITY);
        if over_capacity > 0 {
            evict_oldest(&mut entries, over_capacity);
        }
        drop(entries);

        let _ = self.flush_tx.send(artifact);
    }

    pub async fn delete(&self, imdb_id: &str) {
        self.entries.write().await.remove(imdb_id);
        if let Err(e) = self.db.delete_cache(imdb_id).await {
            warn!(imdb_id, error = %e, "failed to delete cache row");
        }
    }

    pub async fn delete_all(&self) {
        self.entries.write().await.clear();
        if let Err(e) = self.db.delete_all_cache().await {
            warn!(error = %e, "failed to clear cache table");
        }
    }

    /// Hourly sweep per §4.2/§4.12: drop TTL-expired rows, then trim to cap.
    pub async fn evict_expired(&self) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, a| !a.is_expired());
        let expired = before - entries.len();
        let over_capacity = entries.len().saturating_sub(CACHE_CAPACITY);
        if over_capacity > 0 {
            evict_oldest(&mut entries, over_capacity);
        }
        if expired > 0 || over_capacity > 0 {
            info!(expired, trimmed = over_capacity, remaining = entries.len(), "cache eviction sweep");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn evict_oldest(entries: &mut HashMap<String, ResolvedArtifact>, count: usize) {
    let mut ids: Vec<(String, chrono::DateTime<Utc>)> =
        entries.iter().map(|(k, v)| (k.clone(), v.timestamp)).collect();
    ids.sort_by_key(|(_, ts)| *ts);
    for (id, _) in ids.into_iter().take(count) {
        entries.remove(&id);
    }
}

fn spawn_flusher(db: Db, mut rx: mpsc::UnboundedReceiver<ResolvedArtifact>) {
    tokio::spawn(async move {
        let mut batch = Vec::new();
        let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                maybe_item = rx.recv() => {
                    match maybe_item {
                        Some(item) => batch.push(item),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if batch.is_empty() {
                        continue;
                    }
                    flush_batch(&db, std::mem::take(&mut batch)).await;
                }
            }
        }
        if !batch.is_empty() {
            flush_batch(&db, batch).await;
        }
    });
}

async fn flush_batch(db: &Db, batch: Vec<ResolvedArtifact>) {
    for artifact in batch {
        if let Err(e) = db.upsert_cache(&artifact).await {
            if e.is_busy() {
                debug!(imdb_id = %artifact.imdb_id, "database busy, will retry on next mutation");
            } else {
                warn!(imdb_id = %artifact.imdb_id, error = %e, "failed to persist cache row");
            }
        }
    }
}

/// Build an artifact with a timestamp-default and an inferred source type
/// when the caller doesn't know or care about the exact host classification.
pub fn artifact_with_inferred_type(
    imdb_id: impl Into<String>,
    preview_url: impl Into<String>,
    source: impl Into<String>,
) -> ResolvedArtifact {
    let preview_url = preview_url.into();
    let source_type = SourceType::infer_from_url(&preview_url);
    ResolvedArtifact {
        imdb_id: imdb_id.into(),
        preview_url,
        track_id: None,
        country: None,
        youtube_key: None,
        source_type,
        source: source.into(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid;
    #[async_trait]
    impl UrlValidator for AlwaysValid {
        async fn probe(&self, _url: &str) -> ValidationOutcome {
            ValidationOutcome::Valid
        }
    }

    struct AlwaysGone;
    #[async_trait]
    impl UrlValidator for AlwaysGone {
        async fn probe(&self, _url: &str) -> ValidationOutcome {
            ValidationOutcome::Gone
        }
    }

    async fn fresh_cache() -> Arc<Cache> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache_test.db");
        std::mem::forget(dir);
        let db = Db::connect(path.to_str().unwrap()).await.unwrap();
        Cache::new(db).await.unwrap()
    }

    #[tokio::test]
    async fn miss_then_set_then_hit() {
        let cache = fresh_cache().await;
        assert!(cache.get("tt0111161").await.is_none());

        let artifact = artifact_with_inferred_type("tt0111161", "https://example.com/a.mp4", "itunes");
        cache.set(artifact).await;

        let hit = cache.get("tt0111161").await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn validator_non_aggression_keeps_stale_but_reachable_entry() {
        let cache = fresh_cache().await;
        let mut artifact = artifact_with_inferred_type("tt0111161", "https://archive.org/a.mp4", "archive");
        artifact.timestamp = Utc::now() - chrono::Duration::hours(600);
        cache.entries.write().await.insert(artifact.imdb_id.clone(), artifact);

        let result = cache.get_with_validation("tt0111161", &AlwaysValid).await;
        assert!(result.is_some(), "403/5xx/timeout must not evict");
    }

    #[tokio::test]
    async fn validator_evicts_on_gone() {
        let cache = fresh_cache().await;
        let mut artifact = artifact_with_inferred_type("tt0111161", "https://archive.org/a.mp4", "archive");
        artifact.timestamp = Utc::now() - chrono::Duration::hours(600);
        cache.entries.write().await.insert(artifact.imdb_id.clone(), artifact);

        let result = cache.get_with_validation("tt0111161", &AlwaysGone).await;
        assert!(result.is_none());
        assert!(cache.get("tt0111161").await.is_none());
    }

    #[tokio::test]
    async fn negative_results_are_never_cached() {
        let cache = fresh_cache().await;
        let empty = ResolvedArtifact {
            imdb_id: "tt9999999".into(),
            preview_url: String::new(),
            track_id: None,
            country: None,
            youtube_key: None,
            source_type: SourceType::Itunes,
            source: "itunes".into(),
            timestamp: Utc::now(),
        };
        cache.set(empty).await;
        assert!(cache.get("tt9999999").await.is_none());
    }
}
