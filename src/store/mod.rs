//! Persistence of sessions, subjects and the resumable active-session record.
//!
//! One trait, two backends chosen once at startup: [`LocalStore`] for guest /
//! offline use and [`RemoteStore`] for signed-in users.

use crate::error::StoreResult;
use crate::models::{ActiveSessionState, NewStudySession, StudySession, Subject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod local;
pub(crate) mod remote;

pub use local::LocalStore;
pub use remote::{RemoteConfig, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Remote,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Local => "local",
            StoreKind::Remote => "remote",
        }
    }
}

/// Everything is keyed by user id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Persist a finished session; the store assigns the id.
    async fn create_session(&self, session: NewStudySession) -> StoreResult<StudySession>;

    /// Overwrite the duration of a session. Writing the same value twice is a no-op.
    async fn update_session_duration(
        &self,
        user_id: &str,
        session_id: &str,
        duration_seconds: u64,
    ) -> StoreResult<()>;

    async fn delete_session(&self, user_id: &str, session_id: &str) -> StoreResult<()>;

    /// Sessions with `start <= start_time < end`, oldest first.
    async fn sessions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<StudySession>>;

    /// Newest first. `None` returns everything.
    async fn history(&self, user_id: &str, limit: Option<usize>) -> StoreResult<Vec<StudySession>>;

    async fn load_active(&self, user_id: &str) -> StoreResult<Option<ActiveSessionState>>;

    async fn save_active(&self, user_id: &str, active: &ActiveSessionState) -> StoreResult<()>;

    /// Clearing an absent record is not an error.
    async fn clear_active(&self, user_id: &str) -> StoreResult<()>;

    /// In insertion order.
    async fn subjects(&self, user_id: &str) -> StoreResult<Vec<Subject>>;

    async fn add_subject(&self, user_id: &str, subject: &Subject) -> StoreResult<()>;
}
