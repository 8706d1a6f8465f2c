use crate::error::TimerError;
use crate::models::Subject;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

mod core;
mod restore;

pub use self::core::StopOutcome;

/// Study timer - strict FSM.
/// Lock order is always state → accumulated_seconds → draft.
pub struct TimerEngine {
    /// Single source of truth for the FSM
    pub(crate) state: Arc<Mutex<TimerState>>,
    /// Seconds banked by finished run segments of the current session
    pub(crate) accumulated_seconds: Arc<Mutex<u64>>,
    /// What the current session is about; None while idle
    pub(crate) draft: Arc<Mutex<Option<SessionDraft>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    /// started_at is the start of the current run segment, not of the session
    Running { started_at: DateTime<Utc> },
    Paused,
    /// Stopped, waiting for save or discard
    Summary {
        elapsed_seconds: u64,
        ended_at: DateTime<Utc>,
    },
}

impl TimerState {
    pub fn name(&self) -> &'static str {
        match self {
            TimerState::Idle => "IDLE",
            TimerState::Running { .. } => "RUNNING",
            TimerState::Paused => "PAUSED",
            TimerState::Summary { .. } => "SUMMARY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SessionDraft {
    /// None for rest runs
    pub(crate) subject: Option<Subject>,
    pub(crate) session_start: DateTime<Utc>,
}

impl SessionDraft {
    pub(crate) fn is_rest(&self) -> bool {
        self.subject.is_none()
    }
}

/// Serializable view of the engine, published on every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSnapshot {
    #[serde(flatten)]
    pub state: TimerStateForApi,
    pub elapsed_seconds: u64,
    pub accumulated_seconds: u64,
    pub session_start: Option<DateTime<Utc>>,
    pub subject: Option<Subject>,
    pub rest: bool,
}

impl Default for TimerSnapshot {
    fn default() -> Self {
        Self {
            state: TimerStateForApi::Idle,
            elapsed_seconds: 0,
            accumulated_seconds: 0,
            session_start: None,
            subject: None,
            rest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "state")]
pub enum TimerStateForApi {
    Idle,
    Running { started_at: DateTime<Utc> },
    Paused,
    Summary { ended_at: DateTime<Utc> },
}

impl From<&TimerState> for TimerStateForApi {
    fn from(state: &TimerState) -> Self {
        match state {
            TimerState::Idle => TimerStateForApi::Idle,
            TimerState::Running { started_at } => TimerStateForApi::Running {
                started_at: *started_at,
            },
            TimerState::Paused => TimerStateForApi::Paused,
            TimerState::Summary { ended_at, .. } => TimerStateForApi::Summary {
                ended_at: *ended_at,
            },
        }
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState::Idle)),
            accumulated_seconds: Arc::new(Mutex::new(0)),
            draft: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, TimerState>, TimerError> {
        self.state
            .lock()
            .map_err(|e| TimerError::Poisoned(e.to_string()))
    }

    pub(crate) fn lock_accumulated(&self) -> Result<MutexGuard<'_, u64>, TimerError> {
        self.accumulated_seconds
            .lock()
            .map_err(|e| TimerError::Poisoned(e.to_string()))
    }

    pub(crate) fn lock_draft(&self) -> Result<MutexGuard<'_, Option<SessionDraft>>, TimerError> {
        self.draft
            .lock()
            .map_err(|e| TimerError::Poisoned(e.to_string()))
    }
}
