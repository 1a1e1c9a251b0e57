//! Background maintenance (C4.12): warms the cache for a fixed set of
//! popular titles at startup and every six hours, and sweeps expired cache
//! rows hourly. Stat-capacity trimming itself happens inline on every
//! tracker write (see `trailer_store::tracker::trim_if_over_capacity`), so
//! this module's eviction loop only needs to cover the cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use trailer_models::MediaType;
use trailer_store::Cache;

use crate::orchestrator::Orchestrator;

const WARMUP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const WARMUP_PACING: Duration = Duration::from_millis(500);
const EVICTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A fixed seed of well-known titles used to pre-populate the cache. There
/// is no popularity-ranked feed wired into the metadata resolver, so this
/// list stands in for it (see DESIGN.md).
const POPULAR_TITLES: &[(&str, MediaType)] = &[
    ("tt0111161", MediaType::Movie), // The Shawshank Redemption
    ("tt0068646", MediaType::Movie), // The Godfather
    ("tt0468569", MediaType::Movie), // The Dark Knight
    ("tt0071562", MediaType::Movie), // The Godfather Part II
    ("tt0050083", MediaType::Movie), // 12 Angry Men
    ("tt0108052", MediaType::Movie), // Schindler's List
    ("tt0167260", MediaType::Movie), // The Lord of the Rings: The Return of the King
    ("tt0110912", MediaType::Movie), // Pulp Fiction
    ("tt0060196", MediaType::Movie), // The Good, the Bad and the Ugly
    ("tt0137523", MediaType::Movie), // Fight Club
    ("tt0109830", MediaType::Movie), // Forrest Gump
    ("tt1375666", MediaType::Movie), // Inception
    ("tt0080684", MediaType::Movie), // The Empire Strikes Back
    ("tt0167261", MediaType::Movie), // The Lord of the Rings: The Two Towers
    ("tt0120737", MediaType::Movie), // The Lord of the Rings: The Fellowship of the Ring
    ("tt0073486", MediaType::Movie), // One Flew Over the Cuckoo's Nest
    ("tt0816692", MediaType::Movie), // Interstellar
    ("tt0099685", MediaType::Movie), // Goodfellas
    ("tt0038650", MediaType::Movie), // It's a Wonderful Life
    ("tt0103064", MediaType::Movie), // Terminator 2: Judgment Day
    ("tt0944947", MediaType::Tv),    // Game of Thrones
    ("tt0903747", MediaType::Tv),    // Breaking Bad
    ("tt0475784", MediaType::Tv),    // Westworld
    ("tt2861424", MediaType::Tv),    // Rick and Morty
    ("tt4574334", MediaType::Tv),    // Stranger Things
];

pub struct Warmup {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<Cache>,
}

impl Warmup {
    pub fn new(orchestrator: Arc<Orchestrator>, cache: Arc<Cache>) -> Self {
        Self { orchestrator, cache }
    }

    /// Spawns the two long-running maintenance loops and returns
    /// immediately; both loops run until the process exits.
    pub fn spawn(self: Arc<Self>) {
        let warm = self.clone();
        tokio::spawn(async move { warm.warmup_loop().await });

        let evict = self.clone();
        tokio::spawn(async move { evict.eviction_loop().await });
    }

    async fn warmup_loop(&self) {
        loop {
            self.warm_up_popular().await;
            tokio::time::sleep(WARMUP_INTERVAL).await;
        }
    }

    async fn warm_up_popular(&self) {
        info!(count = POPULAR_TITLES.len(), "starting cache warm-up sweep");
        for (id, media_type) in POPULAR_TITLES {
            self.orchestrator.resolve(id, *media_type).await;
            tokio::time::sleep(WARMUP_PACING).await;
        }
        debug!("cache warm-up sweep complete");
    }

    async fn eviction_loop(&self) {
        loop {
            tokio::time::sleep(EVICTION_INTERVAL).await;
            self.cache.evict_expired().await;
        }
    }
}
