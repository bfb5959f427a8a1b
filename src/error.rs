use std::path::PathBuf;
use thiserror::Error;

/// EFIS error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EfisError {
    #[error("No I/O board connected")]
    NoIoBoard,

    #[error("No servo hardware connected")]
    NoServos,

    #[error("I/O driver failed: {0}")]
    BadIoDriver(String),

    #[error("AHRS data not valid")]
    NoAhrs,

    #[error("Airspeed data not valid")]
    NoAirspeed,

    #[error("Altitude data not valid")]
    NoAltitude,

    #[error("CDI data not valid")]
    NoCdi,

    #[error("Glideslope data not valid")]
    NoGlideslope,

    #[error("Cannot open {}: {reason}", .path.display())]
    NoSuchFile { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    BadConfig(String),
}

impl EfisError {
    /// Stale or invalid upstream data. The cycle is skipped and the next
    /// scheduled cycle retries; engagement and targets are left alone.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EfisError::NoAhrs
                | EfisError::NoAirspeed
                | EfisError::NoAltitude
                | EfisError::NoCdi
                | EfisError::NoGlideslope
        )
    }
}

/// Result type for EFIS operations
pub type Result<T> = std::result::Result<T, EfisError>;

/// A malformed line in a tunables file. Returned as data so the caller can
/// decide whether to continue with defaults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}
