pub mod analytics;
pub mod api;
pub mod config;
pub mod ingest;
pub mod insights;
pub mod server;
pub mod storage;
