use crate::analytics::outlier::{OutlierEngine, ThresholdPolicy};
use crate::analytics::{mean, DailyStat};
use chrono::NaiveDate;
use serde::Serialize;

/// Minimum history for a daily traffic outlier scan.
pub const MIN_ANOMALY_DAYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyKind {
    Spike,
    Dip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyRecord {
    pub date: NaiveDate,
    pub visits: u64,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnomalyResult {
    pub has_anomalies: bool,
    pub anomalies: Vec<AnomalyRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Flag days whose visit count is an outlier, labelled spike or dip
/// relative to the mean.
pub fn detect_traffic_anomalies(engine: &OutlierEngine, stats: &[DailyStat]) -> AnomalyResult {
    if stats.len() < MIN_ANOMALY_DAYS {
        return AnomalyResult {
            has_anomalies: false,
            anomalies: Vec::new(),
            message: Some(format!(
                "Not enough data. Need at least {MIN_ANOMALY_DAYS} days of history."
            )),
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let features: Vec<Vec<f64>> = stats.iter().map(|s| vec![s.total_visits as f64]).collect();
    let report = engine.detect(&features, ThresholdPolicy::Auto);

    #[allow(clippy::cast_precision_loss)]
    let mean_visits = mean(stats.iter().map(|s| s.total_visits as f64));
    let anomalies: Vec<AnomalyRecord> = report
        .outlier_indices()
        .map(|i| {
            let stat = &stats[i];
            #[allow(clippy::cast_precision_loss)]
            let kind = if stat.total_visits as f64 > mean_visits {
                AnomalyKind::Spike
            } else {
                AnomalyKind::Dip
            };
            AnomalyRecord {
                date: stat.date,
                visits: stat.total_visits,
                kind,
            }
        })
        .collect();

    AnomalyResult {
        has_anomalies: !anomalies.is_empty(),
        anomalies,
        message: None,
    }
}
