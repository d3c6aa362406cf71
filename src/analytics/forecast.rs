use crate::analytics::{mean, round_to, DailyStat};
use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

/// Minimum history needed to fit a trend line.
pub const MIN_FORECAST_DAYS: usize = 3;

/// Default forecast horizon in days.
pub const DEFAULT_HORIZON: u32 = 7;

/// Slope magnitude (visits/day) above which a trend is no longer "stable".
const TREND_THRESHOLD: f64 = 0.5;

/// Predictions this close to an integer are treated as that integer before
/// truncation, absorbing rounding error from inexact ordinal means.
const INTEGER_TOLERANCE: f64 = 1e-6;

/// Direction of the fitted trend line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    fn from_slope(slope: f64) -> Self {
        if slope > TREND_THRESHOLD {
            Self::Increasing
        } else if slope < -TREND_THRESHOLD {
            Self::Decreasing
        } else {
            Self::Stable
        }
    }
}

/// Predicted visits for one future day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted_visits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub can_forecast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Vec<ForecastPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
}

impl ForecastResult {
    fn insufficient() -> Self {
        Self {
            can_forecast: false,
            message: Some(format!(
                "Not enough data. Need at least {MIN_FORECAST_DAYS} days of history."
            )),
            forecast: None,
            trend: None,
            slope: None,
        }
    }
}

/// Least-squares line `visits = intercept + slope * ordinal_day`.
///
/// Ordinals are mean-centered before fitting; day numbers since the common
/// era are large enough to cost precision otherwise.
#[derive(Debug, Clone, Copy)]
struct TrendLine {
    slope: f64,
    mean_x: f64,
    mean_y: f64,
}

impl TrendLine {
    #[allow(clippy::cast_precision_loss)]
    fn fit(stats: &[DailyStat]) -> Self {
        let mean_x = mean(stats.iter().map(|s| ordinal(s.date)));
        let mean_y = mean(stats.iter().map(|s| s.total_visits as f64));

        let (sxy, sxx) = stats.iter().fold((0.0, 0.0), |(sxy, sxx), s| {
            let dx = ordinal(s.date) - mean_x;
            let dy = s.total_visits as f64 - mean_y;
            (dx.mul_add(dy, sxy), dx.mul_add(dx, sxx))
        });

        // All rows on one date: no slope can be estimated.
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        Self {
            slope,
            mean_x,
            mean_y,
        }
    }

    fn predict(&self, date: NaiveDate) -> f64 {
        let value = self.slope.mul_add(ordinal(date) - self.mean_x, self.mean_y);
        let nearest = value.round();
        if (value - nearest).abs() < INTEGER_TOLERANCE {
            nearest
        } else {
            value
        }
    }
}

fn ordinal(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

/// Project visits `days` calendar days past the last observed date.
///
/// `stats` must be ascending by date. Fewer than three rows yields a
/// `can_forecast: false` result rather than a fit.
pub fn generate_forecast(stats: &[DailyStat], days: u32) -> ForecastResult {
    let Some(last) = stats.last().filter(|_| stats.len() >= MIN_FORECAST_DAYS) else {
        return ForecastResult::insufficient();
    };

    let line = TrendLine::fit(stats);
    let forecast = (1..=u64::from(days))
        .filter_map(|offset| last.date.checked_add_days(Days::new(offset)))
        .map(|date| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let predicted_visits = line.predict(date).max(0.0) as u64;
            ForecastPoint {
                date,
                predicted_visits,
            }
        })
        .collect();

    ForecastResult {
        can_forecast: true,
        message: None,
        forecast: Some(forecast),
        trend: Some(Trend::from_slope(line.slope)),
        slope: Some(round_to(line.slope, 2)),
    }
}
