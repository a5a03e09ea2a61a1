use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::handlers;
use crate::chart::ChartController;

pub struct AppState {
    pub controller: Arc<ChartController>,
    /// Namespaces aggregated by the index and search endpoints.
    pub namespaces: Vec<String>,
}

impl AppState {
    #[must_use]
    pub fn new(controller: Arc<ChartController>, namespaces: Vec<String>) -> Self {
        Self {
            controller,
            namespaces,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

/// Proxied handlers forward the request URI unchanged, so every chart route is
/// registered with its full path.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chartrepo/index.yaml", get(handlers::get_index_file))
        .route(
            "/chartrepo/{repo}/index.yaml",
            get(handlers::get_index_by_namespace),
        )
        .route(
            "/chartrepo/{repo}/charts/{filename}",
            get(handlers::download_chart),
        )
        .route("/api/chartrepo/health", get(handlers::get_health))
        .route("/api/chartrepo/search", get(handlers::search_chart))
        .route("/api/chartrepo/charts", post(handlers::upload_chart_default))
        .route(
            "/api/chartrepo/{repo}/charts",
            get(handlers::list_charts).post(handlers::upload_chart),
        )
        .route("/api/chartrepo/{repo}/prov", post(handlers::upload_provenance))
        .route(
            "/api/chartrepo/{repo}/charts/{name}",
            get(handlers::get_chart).delete(handlers::delete_chart),
        )
        .route(
            "/api/chartrepo/{repo}/charts/{name}/{version}",
            get(handlers::get_chart_version_details).delete(handlers::delete_chart_version),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
