//! Pipeline Configuration Settings
//!
//! Configuration types for the ingest pipeline, loaded from environment
//! variables. Everything except the database URL has a default.

use std::time::Duration;

use crate::application::services::retry::CommitRetryPolicy;

/// Inbound source settings.
///
/// The feed connector and bus transport are external; these settings
/// are handed to whichever source adapter is wired in.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Bus endpoint(s), e.g. `localhost:9092`.
    pub endpoint: String,
    /// Inbound topic or channel name.
    pub topic: String,
    /// Capacity of each per-worker envelope channel.
    pub channel_capacity: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9092".to_string(),
            topic: "ohlcv.raw".to_string(),
            channel_capacity: 10_000,
        }
    }
}

/// Batch accumulation thresholds.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Flush when the batch reaches this many records.
    pub max_size: usize,
    /// Flush when the oldest buffered record is this old.
    pub max_age: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_size: 200,
            max_age: Duration::from_secs(2),
        }
    }
}

/// Sink commit settings.
#[derive(Debug, Clone)]
pub struct CommitSettings {
    /// Upper bound on one commit's store I/O wait.
    pub timeout: Duration,
    /// Retry bounds for failed commits.
    pub retry: CommitRetryPolicy,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: CommitRetryPolicy::default(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination store connection string.
    pub database_url: String,
    /// Inbound source settings.
    pub source: SourceSettings,
    /// Number of pipeline workers (symbol-partitioned).
    pub workers: usize,
    /// Batch accumulation thresholds.
    pub batch: BatchSettings,
    /// Commit timeout and retry bounds.
    pub commit: CommitSettings,
    /// How long fingerprints stay in each worker's dedup window.
    pub dedup_window: Duration,
    /// Server ports.
    pub server: ServerSettings,
}

impl PipelineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `OHLCV_DATABASE_URL` is missing or empty, or
    /// if a numeric option is set to zero where zero is meaningless.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("OHLCV_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("OHLCV_DATABASE_URL".to_string()))?;
        if database_url.is_empty() {
            return Err(ConfigError::EmptyValue("OHLCV_DATABASE_URL".to_string()));
        }

        let source = SourceSettings {
            endpoint: std::env::var("OHLCV_SOURCE_ENDPOINT")
                .unwrap_or_else(|_| SourceSettings::default().endpoint),
            topic: std::env::var("OHLCV_SOURCE_TOPIC")
                .unwrap_or_else(|_| SourceSettings::default().topic),
            channel_capacity: parse_env_usize(
                "OHLCV_CHANNEL_CAPACITY",
                SourceSettings::default().channel_capacity,
            ),
        };

        let workers = parse_env_usize("OHLCV_WORKERS", 1);
        if workers == 0 {
            return Err(ConfigError::InvalidValue("OHLCV_WORKERS".to_string()));
        }

        let batch = BatchSettings {
            max_size: parse_env_usize("OHLCV_BATCH_MAX_SIZE", BatchSettings::default().max_size),
            max_age: parse_env_duration_millis(
                "OHLCV_BATCH_MAX_AGE_MS",
                BatchSettings::default().max_age,
            ),
        };
        if batch.max_size == 0 {
            return Err(ConfigError::InvalidValue("OHLCV_BATCH_MAX_SIZE".to_string()));
        }

        let default_retry = CommitRetryPolicy::default();
        let retry = CommitRetryPolicy {
            max_attempts: parse_env_u32("OHLCV_COMMIT_MAX_ATTEMPTS", default_retry.max_attempts),
            initial_backoff: parse_env_duration_millis(
                "OHLCV_COMMIT_BACKOFF_INITIAL_MS",
                default_retry.initial_backoff,
            ),
            max_backoff: parse_env_duration_secs(
                "OHLCV_COMMIT_BACKOFF_MAX_SECS",
                default_retry.max_backoff,
            ),
            ..default_retry
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "OHLCV_COMMIT_MAX_ATTEMPTS".to_string(),
            ));
        }

        let commit = CommitSettings {
            timeout: parse_env_duration_secs(
                "OHLCV_COMMIT_TIMEOUT_SECS",
                CommitSettings::default().timeout,
            ),
            retry,
        };

        let dedup_window =
            parse_env_duration_secs("OHLCV_DEDUP_WINDOW_SECS", Duration::from_secs(3600));

        let server = ServerSettings {
            health_port: parse_env_u16("OHLCV_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            database_url,
            source,
            workers,
            batch,
            commit,
            dedup_window,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a meaningless value (e.g. zero).
    #[error("environment variable {0} has an invalid value")]
    InvalidValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
