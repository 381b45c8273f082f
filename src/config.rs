// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Suffix a source file must carry to be picked up by a sync.
pub const DEFAULT_QUIZ_SUFFIX: &str = ".quiz.md";

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Hard cap on the page size a caller may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Directory holding the fetched quiz tree.
    pub quiz_dir: Option<String>,
    pub quiz_suffix: String,
    /// Period of the background sync. Disabled when `None`.
    pub sync_interval_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let quiz_dir = env::var("QUIZ_DIR").ok().filter(|s| !s.is_empty());

        let quiz_suffix = env::var("QUIZ_SUFFIX")
            .unwrap_or_else(|_| DEFAULT_QUIZ_SUFFIX.to_string());

        let sync_interval_secs = env::var("SYNC_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            quiz_dir,
            quiz_suffix,
            sync_interval_secs,
        }
    }
}
