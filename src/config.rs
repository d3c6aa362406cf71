use crate::analytics::bots::DEFAULT_BOT_CONTAMINATION;
use crate::analytics::forecast::DEFAULT_HORIZON;
use crate::analytics::outlier::OutlierConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Path to a MaxMind GeoLite2 .mmdb file for IP geolocation.
    /// If not set or file is missing, every visitor resolves to "Unknown".
    #[serde(default)]
    pub geoip_db_path: Option<PathBuf>,
    /// Forecast horizon used when a request omits `days`.
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,
    /// Largest horizon a request may ask for.
    #[serde(default = "default_max_forecast_days")]
    pub max_forecast_days: u32,
    /// Share of visitors the bot detector flags.
    #[serde(default = "default_bot_contamination")]
    pub bot_contamination: f64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default)]
    pub outlier: OutlierConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_forecast_days() -> u32 {
    DEFAULT_HORIZON
}

const fn default_max_forecast_days() -> u32 {
    90
}

const fn default_bot_contamination() -> f64 {
    DEFAULT_BOT_CONTAMINATION
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            geoip_db_path: None,
            forecast_days: default_forecast_days(),
            max_forecast_days: default_max_forecast_days(),
            bot_contamination: default_bot_contamination(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            outlier: OutlierConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `INSIGHTS_HOST` → host
    /// - `INSIGHTS_PORT` → port
    /// - `INSIGHTS_DATA_DIR` → data_dir
    /// - `INSIGHTS_GEOIP_DB` → geoip_db_path
    /// - `INSIGHTS_FORECAST_DAYS` → forecast_days
    /// - `INSIGHTS_MAX_FORECAST_DAYS` → max_forecast_days
    /// - `INSIGHTS_BOT_CONTAMINATION` → bot_contamination
    /// - `INSIGHTS_SHUTDOWN_TIMEOUT` → shutdown_timeout_secs
    /// - `INSIGHTS_SEED` → outlier.seed
    /// - `INSIGHTS_TREES` → outlier.n_trees
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        // Environment variable overrides
        if let Ok(host) = std::env::var("INSIGHTS_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("INSIGHTS_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(data_dir) = std::env::var("INSIGHTS_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(geoip) = std::env::var("INSIGHTS_GEOIP_DB") {
            config.geoip_db_path = Some(PathBuf::from(geoip));
        }
        if let Ok(val) = std::env::var("INSIGHTS_FORECAST_DAYS") {
            if let Ok(d) = val.parse() {
                config.forecast_days = d;
            }
        }
        if let Ok(val) = std::env::var("INSIGHTS_MAX_FORECAST_DAYS") {
            if let Ok(d) = val.parse() {
                config.max_forecast_days = d;
            }
        }
        if let Ok(val) = std::env::var("INSIGHTS_BOT_CONTAMINATION") {
            if let Ok(c) = val.parse() {
                config.bot_contamination = c;
            }
        }
        if let Ok(val) = std::env::var("INSIGHTS_SHUTDOWN_TIMEOUT") {
            if let Ok(t) = val.parse() {
                config.shutdown_timeout_secs = t;
            }
        }
        if let Ok(val) = std::env::var("INSIGHTS_SEED") {
            if let Ok(s) = val.parse() {
                config.outlier.seed = s;
            }
        }
        if let Ok(val) = std::env::var("INSIGHTS_TREES") {
            if let Ok(t) = val.parse() {
                config.outlier.n_trees = t;
            }
        }

        config.sanitize();
        config
    }

    /// Clamp values that would make the analytics meaningless.
    fn sanitize(&mut self) {
        if !(0.0..=0.5).contains(&self.bot_contamination) {
            tracing::warn!(
                value = self.bot_contamination,
                "bot_contamination must be within [0, 0.5], using default"
            );
            self.bot_contamination = default_bot_contamination();
        }
        if self.max_forecast_days == 0 {
            self.max_forecast_days = default_max_forecast_days();
        }
        if self.forecast_days == 0 || self.forecast_days > self.max_forecast_days {
            tracing::warn!(
                value = self.forecast_days,
                max = self.max_forecast_days,
                "forecast_days out of range, using default"
            );
            self.forecast_days = default_forecast_days().min(self.max_forecast_days);
        }
        if self.outlier.n_trees == 0 {
            self.outlier.n_trees = OutlierConfig::default().n_trees;
        }
        if self.outlier.max_samples == 0 {
            self.outlier.max_samples = OutlierConfig::default().max_samples;
        }
    }

    /// Returns the path to the DuckDB database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("insights.duckdb")
    }

    /// Returns the path to the persisted identifier salt.
    pub fn salt_path(&self) -> PathBuf {
        self.data_dir.join(".salt")
    }
}
