//! Success/Quality Tracker (C3): per-source, per-instance, per-strategy
//! tallies that drive ranking, backed by batched durable writes to C1.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use trailer_models::{quality_score, QualityStat, QualityTier, StatType, SuccessStat};

use crate::circuit::CircuitRegistry;
use crate::db::Db;

/// Stat table capacity cap per §3: ≤ 5 000 entries per `type`.
pub const STAT_CAPACITY_PER_TYPE: usize = 5_000;

const FLUSH_INTERVAL: Duration = Duration::from_millis(150);

/// `StatType`s that represent a replicated instance (many interchangeable
/// endpoints of the same logical service). Recording a success against one
/// of these also resets the matching circuit (§4.3).
fn is_replicated_instance_type(stat_type: StatType) -> bool {
    matches!(stat_type, StatType::Proxy | StatType::Piped | StatType::Invidious)
}

/// Hard priority bonus per §4.3/§4.10: `ytdlp` > `apple`/`itunes` > `archive`.
/// The spec names the ordering, not the magnitude; these values are chosen
/// large enough to dominate any plausible success-rate spread while still
/// letting quality and success rate break ties within a priority band.
fn priority_bonus(source_name: &str) -> f64 {
    match source_name {
        "ytdlp" => 0.6,
        "apple" | "itunes" | "appletrailers" => 0.3,
        "archive" => 0.0,
        _ => 0.0,
    }
}

enum Mutation {
    Stat(SuccessStat),
    Quality(QualityStat),
}

/// `StatType` under which quality rows are persisted. Quality is tracked
/// per source name independent of which `StatType` its success/failure was
/// recorded against (`stat_type_for` in the orchestrator maps `itunes` and
/// `appletrailers` both onto `StatType::Itunes`, for instance), so a single
/// fixed namespace is used for the durable quality columns.
const QUALITY_STAT_TYPE: StatType = StatType::Sources;

pub struct Tracker {
    stats: RwLock<HashMap<(StatType, String), SuccessStat>>,
    quality: RwLock<HashMap<String, QualityStat>>,
    circuits: Arc<CircuitRegistry>,
    db: Db,
    flush_tx: mpsc::UnboundedSender<Mutation>,
}

impl Tracker {
    pub async fn new(db: Db, circuits: Arc<CircuitRegistry>) -> Arc<Self> {
        let mut stats = HashMap::new();
        for stat_type in [
            StatType::Sources,
            StatType::Itunes,
            StatType::Piped,
            StatType::Invidious,
            StatType::Ytdlp,
            StatType::Archive,
            StatType::Proxy,
        ] {
            match db.load_top_stats_by_type(stat_type, STAT_CAPACITY_PER_TYPE as i64).await {
                Ok(rows) => {
                    for row in rows {
                        stats.insert((stat_type, row.identifier.clone()), row);
                    }
                }
                Err(e) => warn!(?stat_type, error = %e, "failed to hydrate tracker stats"),
            }
        }
        info!(loaded = stats.len(), "hydrated success tracker from disk");

        let mut quality = HashMap::new();
        match db.load_quality_stats(QUALITY_STAT_TYPE).await {
            Ok(rows) => {
                for row in rows {
                    quality.insert(row.identifier.clone(), row);
                }
            }
            Err(e) => warn!(error = %e, "failed to hydrate tracker quality stats"),
        }
        info!(loaded = quality.len(), "hydrated quality tracker from disk");

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(Self {
            stats: RwLock::new(stats),
            quality: RwLock::new(quality),
            circuits,
            db,
            flush_tx,
        });
        spawn_flusher(tracker.db.clone(), flush_rx);
        tracker
    }

    pub async fn record_success(&self, stat_type: StatType, identifier: &str) {
        let stat = {
            let mut stats = self.stats.write().await;
            let entry = stats
                .entry((stat_type, identifier.to_string()))
                .or_insert_with(|| SuccessStat::new(stat_type, identifier));
            entry.record_success();
            let snapshot = entry.clone();
            trim_if_over_capacity(&mut stats, stat_type);
            snapshot
        };
        let _ = self.flush_tx.send(Mutation::Stat(stat));

        if is_replicated_instance_type(stat_type) {
            self.circuits.record_success(identifier).await;
        }
    }

    pub async fn record_failure(&self, stat_type: StatType, identifier: &str) {
        let stat = {
            let mut stats = self.stats.write().await;
            let entry = stats
                .entry((stat_type, identifier.to_string()))
                .or_insert_with(|| SuccessStat::new(stat_type, identifier));
            entry.record_failure();
            let snapshot = entry.clone();
            trim_if_over_capacity(&mut stats, stat_type);
            snapshot
        };
        let _ = self.flush_tx.send(Mutation::Stat(stat));

        if is_replicated_instance_type(stat_type) {
            self.circuits.record_failure(identifier).await;
        }
    }

    pub async fn record_quality(&self, identifier: &str, tier: QualityTier) {
        let snapshot = {
            let mut quality = self.quality.write().await;
            let entry = quality.entry(identifier.to_string()).or_insert_with(|| QualityStat::new(identifier));
            entry.record(tier);
            entry.clone()
        };
        let _ = self.flush_tx.send(Mutation::Quality(snapshot));
    }

    /// Learned success rate for `(stat_type, identifier)`, 0.5 if untried.
    /// Public so C10's post-race composite-score comparison can read it
    /// directly (§4.10), in addition to the internal ranking helpers below.
    pub async fn success_rate(&self, stat_type: StatType, identifier: &str) -> f64 {
        self.stats
            .read()
            .await
            .get(&(stat_type, identifier.to_string()))
            .map(SuccessStat::success_rate)
            .unwrap_or(0.5)
    }

    async fn avg_quality(&self, identifier: &str) -> f64 {
        self.quality
            .read()
            .await
            .get(identifier)
            .map(|q| q.avg_quality)
            .unwrap_or_else(|| quality_score(QualityTier::Unknown))
    }

    /// §4.3 `sort_by_success_rate`: filter the list through the circuit
    /// breaker, then sort by `success/total` descending, ties in insertion
    /// order (a stable sort over the original index preserves this).
    pub async fn sort_by_success_rate(&self, stat_type: StatType, candidates: Vec<String>) -> Vec<String> {
        let mut available = Vec::with_capacity(candidates.len());
        for (idx, id) in candidates.into_iter().enumerate() {
            if self.circuits.is_available(&id).await {
                let rate = self.success_rate(stat_type, &id).await;
                available.push((idx, id, rate));
            }
        }
        available.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap().then(a.0.cmp(&b.0)));
        available.into_iter().map(|(_, id, _)| id).collect()
    }

    /// §4.3/§4.10 `get_sorted_sources`: composite score
    /// `success_rate + priority_bonus + 0.15 * avg_quality`, descending.
    /// `source_names` double as the tracker identifier for `StatType::Sources`.
    pub async fn get_sorted_sources(&self, source_names: Vec<String>) -> Vec<String> {
        let mut scored = Vec::with_capacity(source_names.len());
        for (idx, name) in source_names.into_iter().enumerate() {
            let rate = self.success_rate(StatType::Sources, &name).await;
            let quality = self.avg_quality(&name).await;
            let score = rate + priority_bonus(&name) + 0.15 * quality;
            scored.push((idx, name, score));
        }
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap().then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(_, name, _)| name).collect()
    }

    /// A snapshot of every tracked stat, for the admin `/stats` endpoint.
    pub async fn snapshot(&self) -> Vec<SuccessStat> {
        self.stats.read().await.values().cloned().collect()
    }
}

fn trim_if_over_capacity(stats: &mut HashMap<(StatType, String), SuccessStat>, stat_type: StatType) {
    let count = stats.keys().filter(|(t, _)| *t == stat_type).count();
    if count <= STAT_CAPACITY_PER_TYPE {
        return;
    }
    let over = count - STAT_CAPACITY_PER_TYPE;
    let mut least_active: Vec<(StatType, String)> = stats
        .iter()
        .filter(|((t, _), _)| *t == stat_type)
        .map(|(k, v)| (k.clone(), v.total_count))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    least_active.sort_by_key(|k| stats.get(k).map(|s| s.total_count).unwrap_or(0));
    for key in least_active.into_iter().take(over) {
        stats.remove(&key);
    }
}

fn spawn_flusher(db: Db, mut rx: mpsc::UnboundedReceiver<Mutation>) {
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

async fn flush_batch(db: &Db, batch: Vec<Mutation>) {
    for mutation in batch {
        match mutation {
            Mutation::Stat(stat) => {
                if let Err(e) = db.upsert_stat(&stat).await {
                    if e.is_busy() {
                        debug!(identifier = %stat.identifier, "database busy, will retry on next mutation");
                    } else {
                        warn!(identifier = %stat.identifier, error = %e, "failed to persist stat row");
                    }
                }
            }
            Mutation::Quality(quality) => {
                if let Err(e) = db.upsert_quality(QUALITY_STAT_TYPE, &quality.identifier, quality.avg_quality, quality.sample_count).await {
                    if e.is_busy() {
                        debug!(identifier = %quality.identifier, "database busy, will retry on next mutation");
                    } else {
                        warn!(identifier = %quality.identifier, error = %e, "failed to persist quality row");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_tracker() -> Arc<Tracker> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker_test.db");
        std::mem::forget(dir);
        let db = Db::connect(path.to_str().unwrap()).await.unwrap();
        let circuits = CircuitRegistry::new();
        Tracker::new(db, circuits).await
    }

    #[tokio::test]
    async fn success_rate_defaults_to_half() {
        let tracker = fresh_tracker().await;
        assert_eq!(tracker.success_rate(StatType::Itunes, "us").await, 0.5);
    }

    #[tokio::test]
    async fn success_resets_circuit_for_replicated_types() {
        let tracker = fresh_tracker().await;
        for _ in 0..5 {
            tracker.record_failure(StatType::Proxy, "proxy-1").await;
        }
        assert!(!tracker.circuits.is_available("proxy-1").await);

        tracker.record_success(StatType::Proxy, "proxy-1").await;
        assert!(tracker.circuits.is_available("proxy-1").await);
    }

    #[tokio::test]
    async fn ytdlp_outranks_archive_in_source_ranking() {
        let tracker = fresh_tracker().await;
        let sorted = tracker
            .get_sorted_sources(vec!["archive".to_string(), "ytdlp".to_string()])
            .await;
        assert_eq!(sorted[0], "ytdlp");
    }

    #[tokio::test]
    async fn recorded_quality_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quality_test.db");
        std::mem::forget(dir);
        let path = path.to_str().unwrap().to_string();

        let db = Db::connect(&path).await.unwrap();
        let tracker = Tracker::new(db, CircuitRegistry::new()).await;
        tracker.record_quality("ytdlp", QualityTier::P1080).await;
        tokio::time::sleep(FLUSH_INTERVAL * 2).await;

        let db = Db::connect(&path).await.unwrap();
        let reloaded = Tracker::new(db, CircuitRegistry::new()).await;
        assert_eq!(reloaded.avg_quality("ytdlp").await, quality_score(QualityTier::P1080));
    }
}
