//! The four public analytics operations for a site.
//!
//! Each operation locks the connection only long enough to fetch its rows,
//! then runs the pure computation from [`crate::analytics`] unlocked.

use crate::analytics::anomaly::{detect_traffic_anomalies, AnomalyResult};
use crate::analytics::bots::{detect_bots, BotResult};
use crate::analytics::forecast::{generate_forecast, ForecastResult};
use crate::analytics::outlier::OutlierEngine;
use crate::analytics::summary::{generate_summary, SummaryOutcome};
use crate::analytics::{DailyStat, VisitorSession};
use crate::storage::store;
use duckdb::Connection;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Insights {
    conn: Arc<Mutex<Connection>>,
    engine: OutlierEngine,
    bot_contamination: f64,
}

impl Insights {
    pub const fn new(
        conn: Arc<Mutex<Connection>>,
        engine: OutlierEngine,
        bot_contamination: f64,
    ) -> Self {
        Self {
            conn,
            engine,
            bot_contamination,
        }
    }

    /// Returns a reference to the DuckDB connection.
    pub const fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub const fn engine(&self) -> &OutlierEngine {
        &self.engine
    }

    fn daily_stats(&self, site_id: &str) -> Result<Vec<DailyStat>, duckdb::Error> {
        let conn = self.conn.lock();
        store::fetch_daily_stats(&conn, site_id)
    }

    fn visitor_activity(&self, site_id: &str) -> Result<Vec<VisitorSession>, duckdb::Error> {
        let conn = self.conn.lock();
        store::fetch_visitor_activity(&conn, site_id)
    }

    pub fn forecast(&self, site_id: &str, days: u32) -> Result<ForecastResult, duckdb::Error> {
        let stats = self.daily_stats(site_id)?;
        let result = generate_forecast(&stats, days);
        tracing::info!(
            site_id,
            rows = stats.len(),
            days,
            can_forecast = result.can_forecast,
            trend = ?result.trend,
            "Forecast generated"
        );
        Ok(result)
    }

    pub fn summary(&self, site_id: &str) -> Result<SummaryOutcome, duckdb::Error> {
        let stats = self.daily_stats(site_id)?;
        let outcome = generate_summary(&stats);
        tracing::info!(site_id, rows = stats.len(), "Summary generated");
        Ok(outcome)
    }

    pub fn traffic_anomalies(&self, site_id: &str) -> Result<AnomalyResult, duckdb::Error> {
        let stats = self.daily_stats(site_id)?;
        let result = detect_traffic_anomalies(&self.engine, &stats);
        tracing::info!(
            site_id,
            rows = stats.len(),
            anomalies = result.anomalies.len(),
            "Traffic anomaly scan complete"
        );
        Ok(result)
    }

    pub fn bots(&self, site_id: &str) -> Result<BotResult, duckdb::Error> {
        let sessions = self.visitor_activity(site_id)?;
        let result = detect_bots(&self.engine, &sessions, self.bot_contamination);
        tracing::info!(
            site_id,
            sessions = sessions.len(),
            bots = result.detected_bots_count,
            "Bot detection complete"
        );
        Ok(result)
    }
}
