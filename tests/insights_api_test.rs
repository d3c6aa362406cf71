use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Days, NaiveDate};
use duckdb::Connection;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use site_insights::analytics::bots::DEFAULT_BOT_CONTAMINATION;
use site_insights::analytics::outlier::OutlierEngine;
use site_insights::analytics::{DailyStat, VisitorSession};
use site_insights::ingest::geoip::GeoResolver;
use site_insights::ingest::handler::AppState;
use site_insights::ingest::hasher::IdentifierHasher;
use site_insights::insights::Insights;
use site_insights::server::build_router;
use site_insights::storage::{migrations, store};
use std::sync::Arc;
use tower::ServiceExt;

fn make_test_state() -> (Arc<AppState>, tempfile::TempDir) {
    let conn = Connection::open_in_memory().unwrap();
    migrations::run_migrations(&conn).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let hasher = IdentifierHasher::from_secret_or_file(None, &dir.path().join(".salt")).unwrap();
    let state = Arc::new(AppState {
        insights: Insights::new(
            Arc::new(Mutex::new(conn)),
            OutlierEngine::default(),
            DEFAULT_BOT_CONTAMINATION,
        ),
        hasher,
        geoip: GeoResolver::open(None),
        forecast_days: 7,
        max_forecast_days: 90,
    });
    (state, dir)
}

fn seed_days(state: &AppState, site_id: &str, visits: &[u64]) {
    let conn = state.insights.conn().lock();
    // 2024-01-01 is a Monday
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for (i, &v) in visits.iter().enumerate() {
        let stat = DailyStat {
            date: start + Days::new(i as u64),
            total_visits: v,
            unique_visitors: v / 2,
        };
        store::insert_daily_stat(&conn, site_id, &stat).unwrap();
    }
}

fn seed_session(state: &AppState, site_id: &str, hash: &str, secs: i64, requests: u64, ua: f64) {
    let conn = state.insights.conn().lock();
    let first_seen = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let session = VisitorSession {
        identifier_hash: hash.to_string(),
        first_seen,
        last_seen: first_seen + chrono::Duration::seconds(secs),
        request_count: requests,
        ua_score: Some(ua),
    };
    store::insert_session(&conn, site_id, &session, Some("Unknown")).unwrap();
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_hit(app: Router, site_id: &str, ip: &str, ua: &str) -> StatusCode {
    let payload = serde_json::json!({ "site_id": site_id });
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/hit")
            .header("content-type", "application/json")
            .header("user-agent", ua)
            .header("x-forwarded-for", ip)
            .body(Body::from(serde_json::to_string(&payload).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
    .status()
}

#[tokio::test]
async fn test_hits_feed_daily_stats_and_sessions() {
    let (state, dir) = make_test_state();
    let chrome = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    for (ip, ua) in [
        ("1.2.3.4", chrome),
        ("1.2.3.4", chrome),
        ("5.6.7.8", "python-requests/2.31"),
    ] {
        let status = post_hit(build_router(Arc::clone(&state)), "pipeline.com", ip, ua).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    // The salt was persisted on first use
    assert!(dir.path().join(".salt").exists());

    {
        let conn = state.insights.conn().lock();
        let stats = store::fetch_daily_stats(&conn, "pipeline.com").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_visits, 3);
        assert_eq!(stats[0].unique_visitors, 2);

        let sessions = store::fetch_visitor_activity(&conn, "pipeline.com").unwrap();
        assert_eq!(sessions.len(), 2);
        let human = sessions
            .iter()
            .find(|s| s.identifier_hash == state.hasher.hash("1.2.3.4"))
            .unwrap();
        assert_eq!(human.request_count, 2);
        assert!(human.ua_score.unwrap() < 0.5);
    }

    // One day of history is not enough for a forecast
    let (status, json) = get_json(
        build_router(Arc::clone(&state)),
        "/api/insights/forecast?site_id=pipeline.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["can_forecast"], false);
    assert_eq!(
        json["message"],
        "Not enough data. Need at least 3 days of history."
    );

    // But it can be summarized
    let (status, json) = get_json(
        build_router(state),
        "/api/insights/summary?site_id=pipeline.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["average_daily_visits"], 3.0);
    assert_eq!(json["average_daily_unique"], 2.0);
    assert!(json["busiest_day_of_week"].is_string());
}

#[tokio::test]
async fn test_forecast_linear_growth() {
    let (state, _dir) = make_test_state();
    let visits: Vec<u64> = (0..10).map(|d| 100 + 10 * d).collect();
    seed_days(&state, "growth.com", &visits);

    let (status, json) = get_json(
        build_router(state),
        "/api/insights/forecast?site_id=growth.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["can_forecast"], true);
    assert_eq!(json["trend"], "increasing");
    assert_eq!(json["slope"], 10.0);

    let forecast = json["forecast"].as_array().unwrap();
    assert_eq!(forecast.len(), 7);
    assert_eq!(forecast[0]["date"], "2024-01-11");
    assert_eq!(forecast[0]["predicted_visits"], 200);
    assert_eq!(forecast[6]["date"], "2024-01-17");
    assert_eq!(forecast[6]["predicted_visits"], 260);
}

#[tokio::test]
async fn test_summary_two_weeks() {
    let (state, _dir) = make_test_state();
    let mut visits = vec![100; 7];
    visits.extend([150; 7]);
    seed_days(&state, "weekly.com", &visits);

    let (status, json) = get_json(
        build_router(state),
        "/api/insights/summary?site_id=weekly.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["average_daily_visits"], 125.0);
    assert_eq!(json["average_daily_unique"], 62.5);
    // Every weekday totals 250; ties resolve alphabetically
    assert_eq!(json["busiest_day_of_week"], "Friday");
    assert_eq!(json["weekly_growth"]["current_week_visits"], 1050);
    assert_eq!(json["weekly_growth"]["previous_week_visits"], 700);
    assert_eq!(json["weekly_growth"]["growth_rate_percent"], 50.0);
}

#[tokio::test]
async fn test_summary_no_data() {
    let (state, _dir) = make_test_state();
    let (status, json) = get_json(
        build_router(state),
        "/api/insights/summary?site_id=empty.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "error": "No data available" }));
}

#[tokio::test]
async fn test_anomalies_flag_spike() {
    let (state, _dir) = make_test_state();
    let mut visits = vec![100; 10];
    visits.push(1000);
    seed_days(&state, "spiky.com", &visits);

    let (status, json) = get_json(
        build_router(state),
        "/api/insights/anomalies?site_id=spiky.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["has_anomalies"], true);
    assert_eq!(
        json["anomalies"],
        serde_json::json!([{ "date": "2024-01-11", "visits": 1000, "type": "spike" }])
    );
    assert!(json.get("message").is_none());
}

#[tokio::test]
async fn test_anomalies_insufficient_history() {
    let (state, _dir) = make_test_state();
    seed_days(&state, "short.com", &[10, 20, 30, 40]);

    let (_, json) = get_json(
        build_router(state),
        "/api/insights/anomalies?site_id=short.com",
    )
    .await;
    assert_eq!(json["has_anomalies"], false);
    assert_eq!(json["anomalies"], serde_json::json!([]));
    assert_eq!(
        json["message"],
        "Not enough data. Need at least 5 days of history."
    );
}

#[tokio::test]
async fn test_bots_flag_crawler() {
    let (state, _dir) = make_test_state();
    for i in 0..19_i64 {
        let requests = 5 + u64::try_from(i % 5).unwrap();
        seed_session(
            &state,
            "crawled.com",
            &format!("human-{i:03}"),
            600 + (i % 7) * 30,
            requests,
            0.1,
        );
    }
    seed_session(&state, "crawled.com", "crawler", 10, 500, 0.9);

    let (status, json) = get_json(
        build_router(state),
        "/api/insights/bots?site_id=crawled.com",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detected_bots_count"], 1);
    assert_eq!(json["bots"][0]["identifier_hash"], "crawler");
    assert_eq!(json["bots"][0]["request_count"], 500);
    assert_eq!(
        json["bots"][0]["reason"],
        "High Request Volume, Abnormal Request Rate, Suspicious User Agent"
    );
}

#[tokio::test]
async fn test_bots_insufficient_visitors() {
    let (state, _dir) = make_test_state();
    for i in 0..9 {
        seed_session(&state, "quiet.com", &format!("v{i}"), 60, 3, 0.1);
    }

    let (_, json) = get_json(build_router(state), "/api/insights/bots?site_id=quiet.com").await;
    assert_eq!(json["detected_bots_count"], 0);
    assert_eq!(json["bots"], serde_json::json!([]));
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Not enough data"));
}

#[tokio::test]
async fn test_validation_errors() {
    let (state, _dir) = make_test_state();

    for uri in [
        "/api/insights/forecast?site_id=ok.com&days=0",
        "/api/insights/forecast?site_id=ok.com&days=91",
        "/api/insights/summary?site_id=",
        "/api/insights/anomalies?site_id=bad%27site",
    ] {
        let (status, json) = get_json(build_router(Arc::clone(&state)), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"].is_string(), "{uri}");
    }

    let status = post_hit(build_router(state), "bad site", "1.2.3.4", "curl/8").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_results_are_reproducible() {
    let (state, _dir) = make_test_state();
    let visits: Vec<u64> = (0..30).map(|d| 200 + (d * 37) % 90).collect();
    seed_days(&state, "stable.com", &visits);

    let (_, first) = get_json(
        build_router(Arc::clone(&state)),
        "/api/insights/anomalies?site_id=stable.com",
    )
    .await;
    let (_, second) = get_json(
        build_router(state),
        "/api/insights/anomalies?site_id=stable.com",
    )
    .await;
    assert_eq!(first, second);
}
