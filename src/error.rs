use thiserror::Error;

/// Bump detector error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BumpDetectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Sensor failed: {0}")]
    SensorFailed(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for detector operations
pub type BResult<T> = Result<T, BumpDetectorError>;

impl BumpDetectorError {
    pub(crate) fn lock_poisoned(what: &str) -> Self {
        BumpDetectorError::Internal(format!("Failed to acquire {} lock", what))
    }
}

impl From<serde_json::Error> for BumpDetectorError {
    fn from(err: serde_json::Error) -> Self {
        BumpDetectorError::ConfigParse(err.to_string())
    }
}

impl From<std::io::Error> for BumpDetectorError {
    fn from(err: std::io::Error) -> Self {
        BumpDetectorError::ConfigParse(err.to_string())
    }
}
