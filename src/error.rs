//! Error types for the study timer.

use thiserror::Error;

/// Rejected timer transition. The engine state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("Timer is already running")]
    AlreadyRunning,

    #[error("Timer is already paused")]
    AlreadyPaused,

    #[error("Cannot {action} while timer is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("No finished session awaiting confirmation")]
    NoSummary,

    #[error("Mutex poisoned: {0}")]
    Poisoned(String),
}

/// Persistence failures, shared by the local and the remote store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database corruption detected: {0}")]
    Corrupted(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network: {0}")]
    Network(String),

    #[error("Auth: {0}")]
    Auth(String),

    #[error("Parse payload: {0}")]
    Parse(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Parse(e.to_string())
    }
}

/// Errors surfaced by [`crate::tracker::StudyTracker`] operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("A save is already in progress")]
    SaveInProgress,

    #[error("Subject name must not be empty")]
    EmptySubjectName,
}

/// Startup and configuration errors of the application host.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type TrackerResult<T> = Result<T, TrackerError>;
