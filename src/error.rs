use thiserror::Error;

/// Main error type for the reconciliation daemon
#[derive(Error, Debug)]
pub enum AccrualError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid accrual service URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    // Storage errors that are not sqlx-level failures
    #[error("Storage update rejected: {0}")]
    Storage(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AccrualError
pub type Result<T> = std::result::Result<T, AccrualError>;
