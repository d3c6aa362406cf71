use crate::api::errors::ApiError;
use crate::api::insights::validate_site_id;
use crate::ingest::geoip::GeoResolver;
use crate::ingest::hasher::IdentifierHasher;
use crate::ingest::useragent;
use crate::insights::Insights;
use crate::storage::store::{self, Hit};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Inbound hit payload from the tracking snippet.
#[derive(Debug, Deserialize)]
pub struct HitPayload {
    /// Site identifier (e.g., "example.com")
    #[serde(alias = "d")]
    pub site_id: String,
}

/// Shared application state.
pub struct AppState {
    pub insights: Insights,
    pub hasher: IdentifierHasher,
    pub geoip: GeoResolver,
    pub forecast_days: u32,
    pub max_forecast_days: u32,
}

/// POST /api/hit: Record one request for a site.
///
/// The client IP is hashed and resolved to a country here; neither the raw
/// IP nor the User-Agent string is stored.
pub async fn record_hit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<HitPayload>,
) -> Result<StatusCode, ApiError> {
    validate_site_id(&payload.site_id)?;

    let ip = extract_ip(&headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let hit = Hit {
        identifier_hash: state.hasher.hash(&ip),
        timestamp: Utc::now().naive_utc(),
        ua_score: useragent::ua_score(user_agent),
        country: state.geoip.resolve_country(&ip),
    };

    let site_id = payload.site_id;
    tokio::task::spawn_blocking(move || {
        let mut conn = state.insights.conn().lock();
        store::record_hit(&mut conn, &site_id, &hit)
    })
    .await??;

    Ok(StatusCode::ACCEPTED)
}

/// Extract client IP from headers, checking X-Forwarded-For first.
fn extract_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .unwrap_or("unknown")
        .to_string()
}
