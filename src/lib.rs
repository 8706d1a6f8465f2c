pub mod app;
pub mod auth;
pub mod config;
pub mod day;
pub mod engine;
pub mod error;
pub mod format;
pub mod models;
pub mod presence;
pub mod stats;
pub mod store;
pub mod timeline;
pub mod tracker;

pub use app::StudyApp;
pub use config::{AppConfig, StorageMode};
pub use day::{study_day_start, DayBoundary};
pub use engine::{StopOutcome, TimerEngine, TimerSnapshot, TimerState};
pub use error::{AppError, StoreError, TimerError, TrackerError};
pub use models::{ActiveSessionState, NewStudySession, StudySession, Subject, SubjectTotal};
pub use store::{LocalStore, RemoteConfig, RemoteStore, SessionStore};
pub use tracker::{EditOutcome, StudyTracker, TrackerConfig};


/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}
