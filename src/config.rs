//! Worker configuration, read from the environment once at startup.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryConfig;

/// Application-level constants
pub const APP_NAME: &str = "mapsheet-worker";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage bucket holding uploaded mapping-sheet scans.
pub const DEFAULT_BUCKET: &str = "mapping-sheet-scans";

/// Default extraction model when none is configured.
pub const DEFAULT_MODEL: &str = "sheetread-lite";

const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 120;

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,mapsheet_worker=debug".to_string()
}

/// Local data directory for the single-node job store.
/// ~/MapsheetWorker/ on all platforms.
pub fn data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("MapsheetWorker")
}

pub fn database_path() -> PathBuf {
    data_dir().join("worker.db")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

/// Everything a worker process needs to run the pipeline.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub storage_base_url: String,
    pub storage_bucket: String,
    pub storage_api_key: String,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub provider_model: String,
    pub extraction_timeout: Duration,
    /// Collector endpoint for the monitoring sink. Absent means the sink
    /// is inactive.
    pub monitor_endpoint: Option<String>,
    pub retry: RetryConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (testable without touching
    /// process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        let parse_u64 = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
            }
        };

        let mut retry = RetryConfig::default();
        if let Some(attempts) = parse_u64("MAPSHEET_RETRY_MAX_ATTEMPTS")? {
            retry.max_attempts = attempts as u32;
        }
        if let Some(ms) = parse_u64("MAPSHEET_RETRY_INITIAL_DELAY_MS")? {
            retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64("MAPSHEET_RETRY_MAX_DELAY_MS")? {
            retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64("MAPSHEET_RETRY_JITTER_MAX_MS")? {
            retry.jitter_max = Duration::from_millis(ms);
        }
        retry.validate().map_err(ConfigError::InvalidRetryPolicy)?;

        let extraction_timeout = Duration::from_secs(
            parse_u64("MAPSHEET_EXTRACTION_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_EXTRACTION_TIMEOUT_SECS),
        );

        Ok(Self {
            storage_base_url: required("MAPSHEET_STORAGE_URL")?,
            storage_bucket: lookup("MAPSHEET_STORAGE_BUCKET")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            storage_api_key: required("MAPSHEET_STORAGE_KEY")?,
            provider_base_url: required("MAPSHEET_PROVIDER_URL")?,
            provider_api_key: required("MAPSHEET_PROVIDER_KEY")?,
            provider_model: lookup("MAPSHEET_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            extraction_timeout,
            monitor_endpoint: lookup("MAPSHEET_MONITOR_ENDPOINT").filter(|v| !v.trim().is_empty()),
            retry,
        })
    }
}
