//! Prometheus metrics for the API server. Trimmed from the teacher's wider
//! job/queue/websocket metric set down to the HTTP-request metrics this
//! service actually has traffic for.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "trailer_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "trailer_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "trailer_http_requests_in_flight";
}

/// Install the Prometheus recorder; the returned handle renders the
/// `/metrics` response.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("failed to install Prometheus recorder")
}

/// The route's template shape, not the concrete request path — keeps
/// cardinality bounded without pulling in a regex crate for a route set
/// this small and static.
fn route_template(path: &str) -> &'static str {
    let mut segments = path.trim_start_matches('/').split('/');
    match segments.next() {
        Some("stream") => "/stream/:type/:id",
        Some("cache") => "/cache/:id",
        Some("admin") => match segments.next() {
            Some("archive-cookie") => "/admin/archive-cookie",
            Some("archive-cookies") => "/admin/archive-cookies",
            _ => "/admin",
        },
        Some("manifest.json") => "/manifest.json",
        Some("health") | Some("healthz") => "/health",
        Some("ready") => "/ready",
        Some("stats") => "/stats",
        Some("metrics") => "/metrics",
        _ => "/other",
    }
}

fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [("method", method.to_string()), ("path", route_template(path).to_string()), ("status", status.to_string())];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub async fn render(axum::extract::State(state): axum::extract::State<crate::state::AppState>) -> String {
    state.metrics_handle.as_ref().map(|h| h.render()).unwrap_or_default()
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_the_stream_route() {
        assert_eq!(route_template("/stream/movie/tt0111161.json"), "/stream/:type/:id");
    }

    #[test]
    fn templates_admin_routes() {
        assert_eq!(route_template("/admin/archive-cookie"), "/admin/archive-cookie");
        assert_eq!(route_template("/cache/tt0111161"), "/cache/:id");
    }
}
