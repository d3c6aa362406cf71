pub mod anomaly;
pub mod bots;
pub mod forecast;
pub mod outlier;
pub mod summary;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Aggregated traffic for one site on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub total_visits: u64,
    pub unique_visitors: u64,
}

/// Activity of a single (hashed) visitor.
///
/// The identifier is always the salted hash; raw IPs never reach analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorSession {
    pub identifier_hash: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub request_count: u64,
    /// User-agent suspicion score in `[0, 1]`. `None` is scored as 0.
    pub ua_score: Option<f64>,
}

impl VisitorSession {
    /// Session length in seconds, with zero-length sessions counted as one second.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        let secs = (self.last_seen - self.first_seen).num_seconds();
        if secs <= 0 {
            1.0
        } else {
            secs as f64
        }
    }

    /// Requests per second over the session.
    #[allow(clippy::cast_precision_loss)]
    pub fn request_rate(&self) -> f64 {
        self.request_count as f64 / self.duration_secs()
    }
}

/// Arithmetic mean; 0.0 for an empty slice.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Round to a fixed number of decimal places, halves to even.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
