//! API routes (§6).

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{
    delete_all_cache, delete_cache_entry, health, list_archive_cookies, manifest, ready, seed_archive_cookie, stats, stream,
};
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let resolution_routes = Router::new().route("/stream/:media_type/:id", get(stream));

    let admin_routes = Router::new()
        .route("/cache/:imdb_id", delete(delete_cache_entry))
        .route("/cache", delete(delete_all_cache))
        .route("/admin/archive-cookie", post(seed_archive_cookie))
        .route("/admin/archive-cookies", get(list_archive_cookies))
        .route("/stats", get(stats));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let manifest_routes = Router::new().route("/manifest.json", get(manifest));

    let metrics_routes = if state.config.metrics_enabled {
        Router::new().route("/metrics", get(crate::metrics::render))
    } else {
        Router::new()
    };

    Router::new()
        .merge(resolution_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .merge(manifest_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(crate::metrics::metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
