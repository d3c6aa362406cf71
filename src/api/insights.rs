use crate::analytics::anomaly::AnomalyResult;
use crate::analytics::bots::BotResult;
use crate::analytics::forecast::ForecastResult;
use crate::analytics::summary::SummaryOutcome;
use crate::api::errors::ApiError;
use crate::ingest::handler::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters shared by the insight endpoints.
#[derive(Debug, Deserialize)]
pub struct SiteParams {
    pub site_id: String,
}

/// Query parameters for the forecast endpoint.
#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub site_id: String,
    pub days: Option<u32>,
}

/// Validate that a `site_id` parameter is safe for use in queries and storage.
///
/// - Must be non-empty and at most 256 bytes.
/// - Must contain only alphanumeric ASCII characters or `.`, `-`, `_`, `:`.
///
/// Shared with the hit handler so every recorded site is also queryable.
pub fn validate_site_id(site_id: &str) -> Result<(), ApiError> {
    if site_id.is_empty() {
        return Err(ApiError::BadRequest(
            "site_id must not be empty".to_string(),
        ));
    }
    if site_id.len() > 256 {
        return Err(ApiError::BadRequest(
            "site_id must be at most 256 characters".to_string(),
        ));
    }
    let valid = site_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    if !valid {
        return Err(ApiError::BadRequest(
            "site_id may only contain alphanumeric characters, '.', '-', '_', ':'".to_string(),
        ));
    }
    Ok(())
}

/// Resolve the forecast horizon, defaulting to the configured value.
fn forecast_days(requested: Option<u32>, default: u32, max: u32) -> Result<u32, ApiError> {
    let days = requested.unwrap_or(default);
    if days == 0 || days > max {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {max}"
        )));
    }
    Ok(days)
}

/// GET /api/insights/forecast: Linear trend forecast of daily visits.
pub async fn get_forecast(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ForecastParams>,
) -> Result<Json<ForecastResult>, ApiError> {
    validate_site_id(&params.site_id)?;
    let days = forecast_days(params.days, state.forecast_days, state.max_forecast_days)?;
    let site_id = params.site_id;
    let result =
        tokio::task::spawn_blocking(move || state.insights.forecast(&site_id, days)).await??;
    Ok(Json(result))
}

/// GET /api/insights/summary: Averages, busiest weekday and weekly growth.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SiteParams>,
) -> Result<Json<SummaryOutcome>, ApiError> {
    validate_site_id(&params.site_id)?;
    let site_id = params.site_id;
    let result = tokio::task::spawn_blocking(move || state.insights.summary(&site_id)).await??;
    Ok(Json(result))
}

/// GET /api/insights/anomalies: Days with spike or dip traffic.
pub async fn get_anomalies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SiteParams>,
) -> Result<Json<AnomalyResult>, ApiError> {
    validate_site_id(&params.site_id)?;
    let site_id = params.site_id;
    let result =
        tokio::task::spawn_blocking(move || state.insights.traffic_anomalies(&site_id)).await??;
    Ok(Json(result))
}

/// GET /api/insights/bots: Visitors whose request pattern looks automated.
pub async fn get_bots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SiteParams>,
) -> Result<Json<BotResult>, ApiError> {
    validate_site_id(&params.site_id)?;
    let site_id = params.site_id;
    let result = tokio::task::spawn_blocking(move || state.insights.bots(&site_id)).await??;
    Ok(Json(result))
}
