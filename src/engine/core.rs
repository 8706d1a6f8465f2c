use crate::engine::{SessionDraft, TimerEngine, TimerSnapshot, TimerState, TimerStateForApi};
use crate::error::TimerError;
use crate::models::{ActiveSessionState, NewStudySession, Subject};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Result of a stop transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Focus run finished, engine waits in SUMMARY for save or discard
    Summary { elapsed_seconds: u64 },
    /// Rest run finished, engine is back to IDLE
    RestEnded { elapsed_seconds: u64 },
}

/// Seconds between `started_at` and `now`. Negative spans (clock moved back) count as 0.
pub(crate) fn segment_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = now.signed_duration_since(started_at).num_seconds();
    if delta < 0 {
        warn!(
            "[TIMER] Clock skew detected: now ({}) < started_at ({}). Counting 0s for this segment.",
            now, started_at
        );
        0
    } else {
        delta as u64
    }
}

impl TimerEngine {
    /// IDLE → RUNNING for a focus session.
    /// Returns the record to persist so the session survives a restart.
    pub fn start(&self, subject: Subject) -> Result<ActiveSessionState, TimerError> {
        self.start_at(subject, Utc::now())
    }

    pub fn start_at(
        &self,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> Result<ActiveSessionState, TimerError> {
        self.begin(Some(subject.clone()), now)?;
        info!("[TIMER] Started focus session on '{}'", subject.name);
        Ok(ActiveSessionState::new(now, subject))
    }

    /// IDLE → RUNNING for a rest run. Nothing is persisted for rest.
    pub fn start_rest(&self) -> Result<(), TimerError> {
        self.start_rest_at(Utc::now())
    }

    pub fn start_rest_at(&self, now: DateTime<Utc>) -> Result<(), TimerError> {
        self.begin(None, now)?;
        info!("[TIMER] Started rest");
        Ok(())
    }

    fn begin(&self, subject: Option<Subject>, now: DateTime<Utc>) -> Result<(), TimerError> {
        let mut state = self.lock_state()?;

        match &*state {
            TimerState::Idle => {
                *state = TimerState::Running { started_at: now };
                *self.lock_accumulated()? = 0;
                *self.lock_draft()? = Some(SessionDraft {
                    subject,
                    session_start: now,
                });
                Ok(())
            }
            TimerState::Running { .. } => {
                warn!("[FSM] Invalid transition: RUNNING → RUNNING (already running)");
                Err(TimerError::AlreadyRunning)
            }
            other => {
                warn!(
                    "[FSM] Invalid transition: {} → RUNNING via start",
                    other.name()
                );
                Err(TimerError::InvalidTransition {
                    action: "start",
                    state: other.name(),
                })
            }
        }
    }

    /// RUNNING → PAUSED. Banks the current segment and returns the new accumulated total.
    pub fn pause(&self) -> Result<u64, TimerError> {
        self.pause_at(Utc::now())
    }

    pub fn pause_at(&self, now: DateTime<Utc>) -> Result<u64, TimerError> {
        let mut state = self.lock_state()?;

        match &*state {
            TimerState::Running { started_at } => {
                let segment = segment_seconds(*started_at, now);
                let mut accumulated = self.lock_accumulated()?;
                *accumulated = accumulated.saturating_add(segment);
                *state = TimerState::Paused;
                info!(
                    "[TIMER] Paused after {}s segment, {}s accumulated",
                    segment, *accumulated
                );
                Ok(*accumulated)
            }
            TimerState::Paused => {
                warn!("[FSM] Invalid transition: PAUSED → PAUSED (already paused)");
                Err(TimerError::AlreadyPaused)
            }
            other => {
                warn!("[FSM] Invalid transition: {} → PAUSED", other.name());
                Err(TimerError::InvalidTransition {
                    action: "pause",
                    state: other.name(),
                })
            }
        }
    }

    /// PAUSED → RUNNING. A new segment starts at `now` on top of the banked seconds.
    /// For focus sessions, returns the rewritten active record (new start, banked seconds).
    pub fn resume(&self) -> Result<Option<ActiveSessionState>, TimerError> {
        self.resume_at(Utc::now())
    }

    pub fn resume_at(&self, now: DateTime<Utc>) -> Result<Option<ActiveSessionState>, TimerError> {
        let mut state = self.lock_state()?;

        match &*state {
            TimerState::Paused => {
                *state = TimerState::Running { started_at: now };
                let accumulated = *self.lock_accumulated()?;
                let draft = self.lock_draft()?;
                info!("[TIMER] Resumed with {}s accumulated", accumulated);

                let active = draft.as_ref().and_then(|d| {
                    d.subject.as_ref().map(|subject| ActiveSessionState {
                        start_time: now,
                        subject: subject.clone(),
                        accumulated_seconds: accumulated,
                        session_start: Some(d.session_start),
                        paused: false,
                    })
                });
                Ok(active)
            }
            TimerState::Running { .. } => {
                warn!("[FSM] Invalid transition: RUNNING → RUNNING (already running)");
                Err(TimerError::AlreadyRunning)
            }
            other => {
                warn!("[FSM] Invalid transition: {} → RUNNING via resume", other.name());
                Err(TimerError::InvalidTransition {
                    action: "resume",
                    state: other.name(),
                })
            }
        }
    }

    /// RUNNING/PAUSED → SUMMARY (focus) or → IDLE (rest).
    pub fn stop(&self) -> Result<StopOutcome, TimerError> {
        self.stop_at(Utc::now())
    }

    pub fn stop_at(&self, now: DateTime<Utc>) -> Result<StopOutcome, TimerError> {
        let mut state = self.lock_state()?;

        let segment = match &*state {
            TimerState::Running { started_at } => segment_seconds(*started_at, now),
            TimerState::Paused => 0,
            other => {
                warn!("[FSM] Invalid transition: {} → SUMMARY", other.name());
                return Err(TimerError::InvalidTransition {
                    action: "stop",
                    state: other.name(),
                });
            }
        };

        let mut accumulated = self.lock_accumulated()?;
        let elapsed_seconds = accumulated.saturating_add(segment);
        let mut draft = self.lock_draft()?;
        let rest = draft.as_ref().map(|d| d.is_rest()).unwrap_or(false);

        if rest {
            *state = TimerState::Idle;
            *accumulated = 0;
            *draft = None;
            info!("[TIMER] Rest ended after {}s", elapsed_seconds);
            Ok(StopOutcome::RestEnded { elapsed_seconds })
        } else {
            *accumulated = elapsed_seconds;
            *state = TimerState::Summary {
                elapsed_seconds,
                ended_at: now,
            };
            info!("[TIMER] Stopped, {}s awaiting confirmation", elapsed_seconds);
            Ok(StopOutcome::Summary { elapsed_seconds })
        }
    }

    /// SUMMARY → IDLE without recording anything.
    pub fn discard(&self) -> Result<(), TimerError> {
        let mut state = self.lock_state()?;

        match &*state {
            TimerState::Summary {
                elapsed_seconds, ..
            } => {
                info!("[TIMER] Discarded {}s session", elapsed_seconds);
                *state = TimerState::Idle;
                *self.lock_accumulated()? = 0;
                *self.lock_draft()? = None;
                Ok(())
            }
            other => {
                warn!("[FSM] Invalid transition: {} → IDLE via discard", other.name());
                Err(TimerError::InvalidTransition {
                    action: "discard",
                    state: other.name(),
                })
            }
        }
    }

    /// Record to save for the finished session. Does not change state; call
    /// [`TimerEngine::mark_saved`] once the store accepted it.
    pub fn pending_session(
        &self,
        user_id: &str,
        memo: Option<String>,
    ) -> Result<NewStudySession, TimerError> {
        let state = self.lock_state()?;

        let (elapsed_seconds, ended_at) = match &*state {
            TimerState::Summary {
                elapsed_seconds,
                ended_at,
            } => (*elapsed_seconds, *ended_at),
            _ => return Err(TimerError::NoSummary),
        };

        let draft = self.lock_draft()?;
        let (subject, session_start) = match draft.as_ref() {
            Some(SessionDraft {
                subject: Some(subject),
                session_start,
            }) => (subject.clone(), *session_start),
            _ => return Err(TimerError::NoSummary),
        };

        let memo = memo
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(NewStudySession {
            user_id: user_id.to_string(),
            subject_id: subject.id,
            subject_name: subject.name,
            subject_color: subject.color,
            start_time: session_start,
            end_time: Some(ended_at),
            duration_seconds: elapsed_seconds,
            memo,
        })
    }

    /// SUMMARY → IDLE after a successful save.
    pub fn mark_saved(&self) -> Result<(), TimerError> {
        let mut state = self.lock_state()?;

        match &*state {
            TimerState::Summary { .. } => {
                *state = TimerState::Idle;
                *self.lock_accumulated()? = 0;
                *self.lock_draft()? = None;
                Ok(())
            }
            _ => Err(TimerError::NoSummary),
        }
    }

    /// Record describing the current focus session for a restart, or None when
    /// idle, in summary or resting. A paused record carries `now` as its start.
    pub fn active_record_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveSessionState>, TimerError> {
        let state = self.lock_state()?;
        let accumulated = *self.lock_accumulated()?;
        let draft = self.lock_draft()?;

        let (start_time, paused) = match &*state {
            TimerState::Running { started_at } => (*started_at, false),
            TimerState::Paused => (now, true),
            _ => return Ok(None),
        };

        Ok(draft.as_ref().and_then(|d| {
            d.subject.as_ref().map(|subject| ActiveSessionState {
                start_time,
                subject: subject.clone(),
                accumulated_seconds: accumulated,
                session_start: Some(d.session_start),
                paused,
            })
        }))
    }

    pub fn state(&self) -> Result<TimerState, TimerError> {
        Ok(self.lock_state()?.clone())
    }

    pub fn elapsed(&self) -> Result<u64, TimerError> {
        self.elapsed_at(Utc::now())
    }

    /// Accumulated seconds plus the running segment, if any.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Result<u64, TimerError> {
        let state = self.lock_state()?;
        let accumulated = *self.lock_accumulated()?;

        Ok(match &*state {
            TimerState::Idle => 0,
            TimerState::Running { started_at } => {
                accumulated.saturating_add(segment_seconds(*started_at, now))
            }
            TimerState::Paused => accumulated,
            TimerState::Summary {
                elapsed_seconds, ..
            } => *elapsed_seconds,
        })
    }

    /// Subject of a running focus session; None when idle, paused, in rest or in summary.
    pub fn studying_subject(&self) -> Result<Option<Subject>, TimerError> {
        let state = self.lock_state()?;
        if !matches!(&*state, TimerState::Running { .. }) {
            return Ok(None);
        }
        let draft = self.lock_draft()?;
        Ok(draft.as_ref().and_then(|d| d.subject.clone()))
    }

    pub fn is_rest(&self) -> Result<bool, TimerError> {
        let _state = self.lock_state()?;
        let draft = self.lock_draft()?;
        Ok(draft.as_ref().map(|d| d.is_rest()).unwrap_or(false))
    }

    pub fn snapshot(&self) -> Result<TimerSnapshot, TimerError> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<TimerSnapshot, TimerError> {
        let state = self.lock_state()?;
        let accumulated = *self.lock_accumulated()?;
        let draft = self.lock_draft()?.clone();

        let elapsed_seconds = match &*state {
            TimerState::Idle => 0,
            TimerState::Running { started_at } => {
                accumulated.saturating_add(segment_seconds(*started_at, now))
            }
            TimerState::Paused => accumulated,
            TimerState::Summary {
                elapsed_seconds, ..
            } => *elapsed_seconds,
        };

        Ok(TimerSnapshot {
            state: TimerStateForApi::from(&*state),
            elapsed_seconds,
            accumulated_seconds: accumulated,
            session_start: draft.as_ref().map(|d| d.session_start),
            rest: draft.as_ref().map(|d| d.is_rest()).unwrap_or(false),
            subject: draft.and_then(|d| d.subject),
        })
    }
}
