//! Error types for loading, annotating and exporting sprint events.

use thiserror::Error;

/// Errors surfaced by tracker operations.
///
/// `Format` and `Transport` abort a load and leave the previous event list in place.
/// `Recurrence` is raised per record and never aborts a load on its own.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Calendar format error: {0}")]
    Format(String),

    #[error("Failed to fetch calendar: {0}")]
    Transport(String),

    #[error("Invalid recurrence rule: {0}")]
    Recurrence(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Transport(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
