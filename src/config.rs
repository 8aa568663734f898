use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub accrual: AccrualConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccrualConfig {
    /// Base URL of the external accrual calculation service
    pub base_url: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent reconciliation workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Interval between pool-wide dispatch starts (milliseconds).
    /// Also paces re-polls of the same order within a job.
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    /// Capacity of the dispatcher-to-worker hand-off channel
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
    /// Retry policy for transient transport/storage failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_concurrency() -> usize {
    3
}

fn default_dispatch_interval_ms() -> u64 {
    800
}

fn default_handoff_capacity() -> usize {
    10
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            handoff_capacity: default_handoff_capacity(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}

/// Retry policy for transient failures inside a job.
///
/// With `max_attempts = 0` a transport or storage failure is fatal for that
/// task and it is dropped after logging. HTTP 429 backoff is handled
/// separately and is not subject to this policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (0 = fail fast)
    #[serde(default)]
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("accrual.base_url", "http://localhost:8080")?
            .set_default("database.url", "postgres://localhost/accruald")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ACCRUALD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ACCRUALD_ACCRUAL__BASE_URL, etc.)
            .add_source(
                Environment::with_prefix("ACCRUALD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if Url::parse(&self.accrual.base_url).is_err() {
            errors.push(format!(
                "accrual.base_url is not a valid URL: {}",
                self.accrual.base_url
            ));
        }

        if self.pool.concurrency == 0 {
            errors.push("pool.concurrency must be at least 1".to_string());
        }

        if self.pool.dispatch_interval_ms == 0 {
            errors.push("pool.dispatch_interval_ms must be positive".to_string());
        }

        if self.pool.handoff_capacity == 0 {
            errors.push("pool.handoff_capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
