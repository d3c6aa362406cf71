use crate::api::insights;
use crate::ingest::handler::{record_hit, AppState};
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Permissive CORS for hit recording (tracking snippet runs on any origin)
    let hit_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    // Hit payloads carry a single site id; 4 KB is ample.
    let hit_routes = Router::new()
        .route("/hit", post(record_hit))
        .layer(DefaultBodyLimit::max(4096))
        .layer(hit_cors);

    let insight_routes = Router::new()
        .route("/insights/forecast", get(insights::get_forecast))
        .route("/insights/summary", get(insights::get_summary))
        .route("/insights/anomalies", get(insights::get_anomalies))
        .route("/insights/bots", get(insights::get_bots));

    let api_routes = Router::new().merge(hit_routes).merge(insight_routes);

    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .nest("/api", api_routes)
        .layer(axum::middleware::map_response(add_security_headers))
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            std::time::Duration::from_secs(30),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Inject OWASP-recommended security headers on every HTTP response.
async fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response
}

/// GET /health: Simple health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}

/// GET /health/detailed: Health check with the active analytics settings.
async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> axum::Json<serde_json::Value> {
    let outlier = state.insights.engine().config();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "geoip_loaded": state.geoip.is_loaded(),
        "forecast_days": state.forecast_days,
        "max_forecast_days": state.max_forecast_days,
        "outlier_seed": outlier.seed,
        "outlier_trees": outlier.n_trees,
    }))
}
