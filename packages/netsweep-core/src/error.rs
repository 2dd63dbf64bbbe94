//! Error types for the discovery engine.

use crate::scanner::JobState;
use thiserror::Error;

/// Result type alias using [`ScanError`].
pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    /// The input matched none of the accepted range grammars, or failed validation.
    #[error("invalid range format: {0}")]
    InvalidRangeFormat(String),

    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("scan job cannot move from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("result store error: {0:#}")]
    Store(anyhow::Error),

    #[error("scan worker failed: {0}")]
    Worker(String),
}

impl ScanError {
    pub(crate) fn invalid_range(input: &str) -> Self {
        ScanError::InvalidRangeFormat(input.to_string())
    }
}
