use duckdb::Connection;
use parking_lot::Mutex;
use site_insights::analytics::outlier::OutlierEngine;
use site_insights::config::Config;
use site_insights::ingest::geoip::GeoResolver;
use site_insights::ingest::handler::AppState;
use site_insights::ingest::hasher::IdentifierHasher;
use site_insights::insights::Insights;
use site_insights::{server, storage};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_insights=info,tower_http=info".into()),
        )
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(std::path::Path::new));

    tracing::info!(
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir.display(),
        seed = config.outlier.seed,
        trees = config.outlier.n_trees,
        "Starting Site Insights"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir).expect("Failed to create data directory");

    // Initialize DuckDB
    let conn = Connection::open(config.database_path()).expect("Failed to open DuckDB");
    storage::migrations::run_migrations(&conn).expect("Failed to run migrations");

    let secret = std::env::var("INSIGHTS_SECRET").ok();
    if secret.as_deref().is_none_or(str::is_empty) {
        tracing::info!(
            path = %config.salt_path().display(),
            "No INSIGHTS_SECRET set, using persisted salt file"
        );
    }
    let hasher = IdentifierHasher::from_secret_or_file(secret.as_deref(), &config.salt_path())
        .expect("Failed to load identifier salt");

    let geoip = GeoResolver::open(config.geoip_db_path.as_deref());

    let state = Arc::new(AppState {
        insights: Insights::new(
            Arc::new(Mutex::new(conn)),
            OutlierEngine::new(config.outlier),
            config.bot_contamination,
        ),
        hasher,
        geoip,
        forecast_days: config.forecast_days,
        max_forecast_days: config.max_forecast_days,
    });

    let app = server::build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(addr = %addr, "Listening");
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await
        .expect("Server error");

    tracing::info!("Shutdown complete");
}

/// Resolve on Ctrl+C or SIGTERM. In-flight requests then get
/// `timeout` to drain before the process exits regardless.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "Shutdown signal received, draining connections"
    );
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        tracing::warn!("Drain timeout elapsed, exiting");
        std::process::exit(0);
    });
}
