use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished, confirmed study session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub subject_color: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Session record before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudySession {
    pub user_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub subject_color: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl NewStudySession {
    pub fn with_id(self, id: String) -> StudySession {
        StudySession {
            id,
            user_id: self.user_id,
            subject_id: self.subject_id,
            subject_name: self.subject_name,
            subject_color: self.subject_color,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_seconds: self.duration_seconds,
            memo: self.memo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// Persisted while a focus timer is running or paused, so a restart can resume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionState {
    /// Start of the current run segment
    pub start_time: DateTime<Utc>,
    pub subject: Subject,
    /// Seconds banked by earlier run segments (before a pause)
    #[serde(default)]
    pub accumulated_seconds: u64,
    /// Start of the whole session; equals start_time when never paused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start: Option<DateTime<Utc>>,
    /// Written on pause: start_time is not a running segment, restore counts from restore time
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
}

impl ActiveSessionState {
    pub fn new(start_time: DateTime<Utc>, subject: Subject) -> Self {
        Self {
            start_time,
            subject,
            accumulated_seconds: 0,
            session_start: None,
            paused: false,
        }
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start.unwrap_or(self.start_time)
    }
}

/// Per-subject total for the breakdown bars
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotal {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_color: String,
    pub seconds: u64,
    /// seconds / largest subject total in the set, in [0, 1]
    pub ratio: f64,
}

/// Status pushed to the room presence collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: String,
    pub is_studying: bool,
    pub current_subject: Option<String>,
}

/// Tokens returned by the refresh endpoint
#[derive(Debug)]
pub struct TokenRefreshResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
}
