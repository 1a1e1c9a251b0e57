//! Application state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use trailer_metadata::MetadataClient;
use trailer_resolver::{Orchestrator, RequestGate, ResolverConfig, Warmup};
use trailer_sources::{ArchiveClient, HttpUrlValidator, ItunesClient, ProxyPool, YtDlpExtractor};
use trailer_store::{Cache, CircuitRegistry, CookieJar, Db, Tracker};

use crate::config::ApiConfig;

/// Shared application state. Cheap to clone — everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub cache: Arc<Cache>,
    pub tracker: Arc<Tracker>,
    pub circuits: Arc<CircuitRegistry>,
    pub cookies: Arc<CookieJar>,
    pub gate: Arc<RequestGate>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub async fn new(
        config: ApiConfig,
        resolver_config: ResolverConfig,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Db::connect(&resolver_config.db_path).await?;

        let circuits = CircuitRegistry::new();
        let tracker = Tracker::new(db.clone(), circuits.clone()).await;
        let cache = Cache::new(db.clone()).await?;
        let cookies = Arc::new(CookieJar::new(db.clone()));
        if let Some(seed) = &resolver_config.archive_cookie {
            cookies.seed(seed.clone(), None).await;
        }

        let metadata = MetadataClient::new(resolver_config.metadata_api_key.clone());
        let itunes = ItunesClient::new();
        let ytdlp = YtDlpExtractor::new();
        let proxy_pool = ProxyPool::new(resolver_config.proxy_list.clone());
        let archive = ArchiveClient::new(Some(cookies.clone()));
        let validator = HttpUrlValidator::new();

        let orchestrator = Arc::new(Orchestrator::new(
            cache.clone(),
            tracker.clone(),
            circuits.clone(),
            metadata,
            itunes,
            ytdlp,
            proxy_pool,
            archive,
            validator,
        ));

        let gate = Arc::new(RequestGate::new(resolver_config.gate_capacity, resolver_config.request_deadline));

        Warmup::new(orchestrator.clone(), cache.clone()).spawn();

        Ok(Self {
            config,
            orchestrator,
            cache,
            tracker,
            circuits,
            cookies,
            gate,
            metrics_handle,
            started_at: chrono::Utc::now(),
        })
    }
}
