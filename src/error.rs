use thiserror::Error;

/// Tracker error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// Malformed seed or filter configuration; fatal to session start
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Innovation covariance could not be inverted; the update is skipped
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Delivered fix is unusable; the tick is skipped
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// Errors that only affect the current tick
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrackerError::Numerical(_) | TrackerError::Input(_))
    }
}

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
