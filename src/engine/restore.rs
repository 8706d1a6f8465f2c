use crate::engine::core::segment_seconds;
use crate::engine::{SessionDraft, TimerEngine, TimerState};
use crate::error::TimerError;
use crate::models::ActiveSessionState;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Gaps longer than this are still restored, but logged
const MAX_REASONABLE_ELAPSED: u64 = 24 * 60 * 60;

impl TimerEngine {
    /// Re-enter RUNNING from a persisted active record.
    /// Returns the elapsed seconds at restore time: accumulated + (now - start_time).
    /// A record written on pause re-enters RUNNING from `now` on top of its
    /// accumulated seconds.
    pub fn restore(&self, active: &ActiveSessionState) -> Result<u64, TimerError> {
        self.restore_at(active, Utc::now())
    }

    pub fn restore_at(
        &self,
        active: &ActiveSessionState,
        now: DateTime<Utc>,
    ) -> Result<u64, TimerError> {
        let mut state = self.lock_state()?;

        if !matches!(&*state, TimerState::Idle) {
            warn!(
                "[RECOVERY] Cannot restore into {} timer, keeping current state",
                state.name()
            );
            return Err(TimerError::InvalidTransition {
                action: "restore",
                state: state.name(),
            });
        }

        *self.lock_accumulated()? = active.accumulated_seconds;
        *self.lock_draft()? = Some(SessionDraft {
            subject: Some(active.subject.clone()),
            session_start: active.session_start(),
        });

        if active.paused {
            // The paused gap is not study time: a new segment starts now
            *state = TimerState::Running { started_at: now };
            info!(
                "[RECOVERY] Resumed paused session '{}' with {}s accumulated",
                active.subject.name, active.accumulated_seconds
            );
            return Ok(active.accumulated_seconds);
        }

        // GUARD: segment_seconds clamps a start time in the future to 0
        let since_start = segment_seconds(active.start_time, now);
        if since_start > MAX_REASONABLE_ELAPSED {
            warn!(
                "[RECOVERY] Restored session has been running for {}s ({} hours)",
                since_start,
                since_start / 3600
            );
        }

        *state = TimerState::Running {
            started_at: active.start_time,
        };

        let elapsed = active.accumulated_seconds.saturating_add(since_start);
        info!(
            "[RECOVERY] Resumed '{}': accumulated={}s, since_start={}s, elapsed={}s",
            active.subject.name, active.accumulated_seconds, since_start, elapsed
        );
        Ok(elapsed)
    }
}
