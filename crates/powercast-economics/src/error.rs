//! Error types for forecasting operations

use thiserror::Error;

/// Result type alias for forecasting operations
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors raised while building, projecting or simulating the ledger
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Invalid constants or caller parameters (non-positive decay, zero ramp
    /// rate, negative power). Never silently defaulted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Required input data is missing and no documented fallback applies
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// An external collaborator failed to answer
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Config file could not be parsed
    #[error("Invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// Dataset or output could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    /// True for errors that a caller can recover from with a documented fallback
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DataUnavailable(_))
    }
}
