use duckdb::Connection;

/// Daily traffic totals, one row per site and calendar day.
pub const CREATE_DAILY_STATS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS daily_stats (
    site_id         VARCHAR NOT NULL,
    date            DATE NOT NULL,
    total_visits    BIGINT NOT NULL DEFAULT 0,
    unique_visitors BIGINT NOT NULL DEFAULT 0
)
";

/// Per-visitor activity, keyed by the salted identifier hash.
pub const CREATE_VISITOR_ACTIVITY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS visitor_activity (
    site_id         VARCHAR NOT NULL,
    identifier_hash VARCHAR NOT NULL,
    first_seen      TIMESTAMP NOT NULL,
    last_seen       TIMESTAMP NOT NULL,
    request_count   BIGINT NOT NULL DEFAULT 1,
    ua_score        DOUBLE,
    country         VARCHAR
)
";

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_DAILY_STATS_TABLE)?;
    conn.execute_batch(CREATE_VISITOR_ACTIVITY_TABLE)?;
    Ok(())
}
