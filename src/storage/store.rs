//! Row access for the analytics pipeline.
//!
//! Every function takes a borrowed connection; callers hold the connection
//! lock only for the duration of the call.

use crate::analytics::{DailyStat, VisitorSession};
use chrono::{NaiveDate, NaiveDateTime};
use duckdb::types::Type;
use duckdb::Connection;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One tracked request, already stripped of the raw client identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub identifier_hash: String,
    pub timestamp: NaiveDateTime,
    pub ua_score: f64,
    pub country: String,
}

fn parse_date(idx: usize, value: &str) -> Result<NaiveDate, duckdb::Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(idx: usize, value: &str) -> Result<NaiveDateTime, duckdb::Error> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Daily stats for a site, ascending by date. An unknown site yields an empty list.
pub fn fetch_daily_stats(conn: &Connection, site_id: &str) -> Result<Vec<DailyStat>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT strftime(date, '%Y-%m-%d'), total_visits, unique_visitors
         FROM daily_stats
         WHERE site_id = ?
         ORDER BY date ASC",
    )?;
    let rows = stmt.query_map(duckdb::params![site_id], |row| {
        let date: String = row.get(0)?;
        Ok(DailyStat {
            date: parse_date(0, &date)?,
            total_visits: row.get(1)?,
            unique_visitors: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Visitor activity for a site, ordered by identifier hash.
pub fn fetch_visitor_activity(
    conn: &Connection,
    site_id: &str,
) -> Result<Vec<VisitorSession>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT identifier_hash,
                strftime(first_seen, '%Y-%m-%d %H:%M:%S'),
                strftime(last_seen, '%Y-%m-%d %H:%M:%S'),
                request_count,
                ua_score
         FROM visitor_activity
         WHERE site_id = ?
         ORDER BY identifier_hash",
    )?;
    let rows = stmt.query_map(duckdb::params![site_id], |row| {
        let first_seen: String = row.get(1)?;
        let last_seen: String = row.get(2)?;
        Ok(VisitorSession {
            identifier_hash: row.get(0)?,
            first_seen: parse_timestamp(1, &first_seen)?,
            last_seen: parse_timestamp(2, &last_seen)?,
            request_count: row.get(3)?,
            ua_score: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Insert a complete daily stat row.
pub fn insert_daily_stat(
    conn: &Connection,
    site_id: &str,
    stat: &DailyStat,
) -> Result<(), duckdb::Error> {
    conn.execute(
        "INSERT INTO daily_stats (site_id, date, total_visits, unique_visitors)
         VALUES (?, CAST(? AS DATE), ?, ?)",
        duckdb::params![
            site_id,
            stat.date.format(DATE_FORMAT).to_string(),
            stat.total_visits,
            stat.unique_visitors,
        ],
    )?;
    Ok(())
}

/// Insert a complete visitor activity row.
pub fn insert_session(
    conn: &Connection,
    site_id: &str,
    session: &VisitorSession,
    country: Option<&str>,
) -> Result<(), duckdb::Error> {
    conn.execute(
        "INSERT INTO visitor_activity (site_id, identifier_hash, first_seen, last_seen,
         request_count, ua_score, country)
         VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?)",
        duckdb::params![
            site_id,
            session.identifier_hash,
            session.first_seen.format(TIMESTAMP_FORMAT).to_string(),
            session.last_seen.format(TIMESTAMP_FORMAT).to_string(),
            session.request_count,
            session.ua_score,
            country,
        ],
    )?;
    Ok(())
}

/// Fold one hit into the visitor's activity row and the day's totals.
///
/// A visitor counts toward `unique_visitors` on their first hit of each
/// calendar day. Both writes commit together.
pub fn record_hit(conn: &mut Connection, site_id: &str, hit: &Hit) -> Result<(), duckdb::Error> {
    let tx = conn.transaction()?;

    let previous = {
        let mut stmt = tx.prepare(
            "SELECT strftime(last_seen, '%Y-%m-%d %H:%M:%S')
             FROM visitor_activity
             WHERE site_id = ? AND identifier_hash = ?",
        )?;
        let mut rows = stmt.query(duckdb::params![site_id, hit.identifier_hash])?;
        match rows.next()? {
            Some(row) => {
                let last_seen: String = row.get(0)?;
                Some(parse_timestamp(0, &last_seen)?)
            }
            None => None,
        }
    };

    let timestamp = hit.timestamp.format(TIMESTAMP_FORMAT).to_string();
    if previous.is_some() {
        tx.execute(
            "UPDATE visitor_activity
             SET last_seen = GREATEST(last_seen, CAST(? AS TIMESTAMP)),
                 request_count = request_count + 1,
                 ua_score = ?,
                 country = ?
             WHERE site_id = ? AND identifier_hash = ?",
            duckdb::params![
                timestamp,
                hit.ua_score,
                hit.country,
                site_id,
                hit.identifier_hash
            ],
        )?;
    } else {
        tx.execute(
            "INSERT INTO visitor_activity (site_id, identifier_hash, first_seen, last_seen,
             request_count, ua_score, country)
             VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), 1, ?, ?)",
            duckdb::params![
                site_id,
                hit.identifier_hash,
                timestamp,
                timestamp,
                hit.ua_score,
                hit.country
            ],
        )?;
    }

    let day = hit.timestamp.date();
    let new_today = previous.is_none_or(|seen| seen.date() < day);
    let unique = i64::from(new_today);
    let date = day.format(DATE_FORMAT).to_string();

    let updated = tx.execute(
        "UPDATE daily_stats
         SET total_visits = total_visits + 1,
             unique_visitors = unique_visitors + ?
         WHERE site_id = ? AND date = CAST(? AS DATE)",
        duckdb::params![unique, site_id, date],
    )?;
    if updated == 0 {
        tx.execute(
            "INSERT INTO daily_stats (site_id, date, total_visits, unique_visitors)
             VALUES (?, CAST(? AS DATE), 1, ?)",
            duckdb::params![site_id, date, unique],
        )?;
    }

    tx.commit()
}
