use std::env;

use crate::error::{CouponError, Result};

/// Runtime configuration, loaded from the environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_address: String,
    /// Postgres connection URL; storage falls back to in-memory when unset
    pub database_url: Option<String>,
    /// Maximum coupon requests per client per window
    pub rate_limit_max_requests: u32,
    /// Fixed rate-limit window length in seconds
    pub rate_limit_window_secs: u64,
    /// Upper bound on CSV upload size in bytes
    pub max_upload_bytes: usize,
    /// Seed the preset coupon codes when the pool is empty at startup
    pub seed_preset_codes: bool,
    /// Default log level for the service's own targets
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            database_url: None,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            max_upload_bytes: 5 * 1024 * 1024,
            seed_preset_codes: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(value) = env::var("BIND_ADDRESS") {
            config.bind_address = value;
        }
        config.database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if let Ok(value) = env::var("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit_max_requests = parse(&value, "RATE_LIMIT_MAX_REQUESTS")?;
        }
        if let Ok(value) = env::var("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit_window_secs = parse(&value, "RATE_LIMIT_WINDOW_SECS")?;
        }
        if let Ok(value) = env::var("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse(&value, "MAX_UPLOAD_BYTES")?;
        }
        if let Ok(value) = env::var("SEED_PRESET_CODES") {
            config.seed_preset_codes = parse(&value, "SEED_PRESET_CODES")?;
        }
        if let Ok(value) = env::var("LOG_LEVEL") {
            config.log_level = value;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CouponError::Config(format!("invalid value {value:?} for {name}")))
}
