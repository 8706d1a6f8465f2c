//! Per-user study context: subjects, timer, store and background tasks.

use crate::day::DayBoundary;
use crate::engine::{StopOutcome, TimerEngine, TimerSnapshot};
use crate::error::{TrackerError, TrackerResult};
use crate::models::{StudySession, Subject, SubjectTotal};
use crate::presence::{PresenceHeartbeat, PresenceSink, DEFAULT_HEARTBEAT_SECS};
use crate::stats;
use crate::store::SessionStore;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use scopeguard::guard;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_interval: Duration,
    pub heartbeat_interval: Duration,
    pub day_cutoff_hour: u32,
    /// Cap for [`StudyTracker::history`]; None loads everything
    pub history_limit: Option<usize>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            day_cutoff_hour: crate::day::DEFAULT_CUTOFF_HOUR,
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
        }
    }
}

/// Result of a manual duration edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Input was not a non-negative number of minutes; nothing written
    Rejected,
    Updated { old: u64, new: u64 },
}

pub struct StudyTracker {
    user_id: String,
    store: Arc<dyn SessionStore>,
    engine: Arc<TimerEngine>,
    boundary: DayBoundary,
    heartbeat: Option<PresenceHeartbeat>,
    subjects: Mutex<Vec<Subject>>,
    snapshot_tx: Arc<watch::Sender<TimerSnapshot>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    /// Single-flight guard for save()
    pub(crate) is_saving: Arc<AtomicBool>,
    /// Set when stop could not clear the active-session record
    clear_pending: AtomicBool,
    config: TrackerConfig,
}

impl StudyTracker {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn SessionStore>,
        presence: Option<Arc<dyn PresenceSink>>,
        config: TrackerConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(TimerSnapshot::default());
        Self {
            user_id: user_id.into(),
            store,
            engine: Arc::new(TimerEngine::new()),
            boundary: DayBoundary::new(config.day_cutoff_hour),
            heartbeat: presence.map(|sink| PresenceHeartbeat::new(sink, config.heartbeat_interval)),
            subjects: Mutex::new(Vec::new()),
            snapshot_tx: Arc::new(snapshot_tx),
            ticker: Mutex::new(None),
            is_saving: Arc::new(AtomicBool::new(false)),
            clear_pending: AtomicBool::new(false),
            config,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn engine(&self) -> &Arc<TimerEngine> {
        &self.engine
    }

    pub fn boundary(&self) -> &DayBoundary {
        &self.boundary
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Load subjects, resume an interrupted session and start the ticker.
    /// Returns the elapsed seconds of a resumed session. Store failures are
    /// logged; the tracker still starts.
    pub async fn init(&self) -> TrackerResult<Option<u64>> {
        self.init_at(Utc::now()).await
    }

    pub async fn init_at(&self, now: DateTime<Utc>) -> TrackerResult<Option<u64>> {
        if let Err(e) = self.refresh_subjects().await {
            warn!("[TRACKER] Failed to load subjects: {}", e);
        }

        let resumed = match self.store.load_active(&self.user_id).await {
            Ok(Some(active)) => match self.engine.restore_at(&active, now) {
                Ok(elapsed) => {
                    self.start_heartbeat(&active.subject.name);
                    if active.paused {
                        // Rewrite as a running record so the next restart counts from here
                        self.persist_active(now).await;
                    }
                    Some(elapsed)
                }
                Err(e) => {
                    warn!("[RECOVERY] Ignoring saved active session: {}", e);
                    None
                }
            },
            Ok(None) => {
                info!("[RECOVERY] No active session saved, starting idle");
                None
            }
            Err(e) => {
                error!(
                    "[RECOVERY] Failed to load active session: {}. Starting idle.",
                    e
                );
                None
            }
        };

        self.spawn_ticker();
        self.publish();
        info!(
            "[TRACKER] Initialized for user {} ({} store)",
            self.user_id,
            self.store.kind().as_str()
        );
        Ok(resumed)
    }

    /// Stop background tasks. The active-session record is kept so the next
    /// init resumes the session.
    pub async fn shutdown(&self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(task) = ticker.take() {
                task.abort();
            }
        }
        if let Some(heartbeat) = &self.heartbeat {
            if heartbeat.is_running() {
                heartbeat.stop(&self.user_id).await;
            } else {
                heartbeat.abort();
            }
        }
        info!("[TRACKER] Shut down for user {}", self.user_id);
    }

    fn spawn_ticker(&self) {
        let engine = self.engine.clone();
        let tx = self.snapshot_tx.clone();
        let period = self.config.tick_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match engine.snapshot() {
                    Ok(snapshot) => {
                        tx.send_replace(snapshot);
                    }
                    Err(e) => warn!("[TIMER] Tick failed to read state: {}", e),
                }
            }
        });

        match self.ticker.lock() {
            Ok(mut ticker) => {
                if let Some(previous) = ticker.replace(task) {
                    previous.abort();
                }
            }
            Err(e) => {
                error!("[TRACKER] Ticker mutex poisoned: {}", e);
                task.abort();
            }
        }
    }

    fn publish(&self) {
        match self.engine.snapshot() {
            Ok(snapshot) => {
                self.snapshot_tx.send_replace(snapshot);
            }
            Err(e) => warn!("[TRACKER] Failed to read timer state: {}", e),
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn start_heartbeat(&self, subject_name: &str) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.start(&self.user_id, subject_name);
        }
    }

    async fn stop_heartbeat(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop(&self.user_id).await;
        }
    }

    async fn persist_active(&self, now: DateTime<Utc>) {
        let record = match self.engine.active_record_at(now) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                warn!("[TRACKER] Failed to build active session record: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.save_active(&self.user_id, &record).await {
            error!(
                "[TRACKER] Failed to persist active session: {}. Timer keeps running.",
                e
            );
        }
    }

    // ============================================
    // TIMER
    // ============================================

    pub async fn start(&self, subject: &Subject) -> TrackerResult<()> {
        self.start_at(subject, Utc::now()).await
    }

    pub async fn start_at(&self, subject: &Subject, now: DateTime<Utc>) -> TrackerResult<()> {
        let active = self.engine.start_at(subject.clone(), now)?;
        self.publish();

        match self.store.save_active(&self.user_id, &active).await {
            // Overwrites any record a failed clear left behind
            Ok(()) => self.clear_pending.store(false, Ordering::Release),
            Err(e) => error!(
                "[TRACKER] Failed to persist active session: {}. Timer keeps running.",
                e
            ),
        }
        self.start_heartbeat(&subject.name);
        Ok(())
    }

    pub async fn start_rest(&self) -> TrackerResult<()> {
        self.start_rest_at(Utc::now()).await
    }

    pub async fn start_rest_at(&self, now: DateTime<Utc>) -> TrackerResult<()> {
        self.engine.start_rest_at(now)?;
        self.publish();
        Ok(())
    }

    pub async fn pause(&self) -> TrackerResult<u64> {
        self.pause_at(Utc::now()).await
    }

    pub async fn pause_at(&self, now: DateTime<Utc>) -> TrackerResult<u64> {
        let rest = self.engine.is_rest()?;
        let accumulated = self.engine.pause_at(now)?;
        self.publish();

        if !rest {
            self.persist_active(now).await;
            self.stop_heartbeat().await;
        }
        Ok(accumulated)
    }

    pub async fn resume(&self) -> TrackerResult<()> {
        self.resume_at(Utc::now()).await
    }

    pub async fn resume_at(&self, now: DateTime<Utc>) -> TrackerResult<()> {
        let active = self.engine.resume_at(now)?;
        self.publish();

        if let Some(active) = active {
            if let Err(e) = self.store.save_active(&self.user_id, &active).await {
                error!(
                    "[TRACKER] Failed to persist resumed session: {}. Timer keeps running.",
                    e
                );
            }
            self.start_heartbeat(&active.subject.name);
        }
        Ok(())
    }

    pub async fn stop(&self) -> TrackerResult<StopOutcome> {
        self.stop_at(Utc::now()).await
    }

    pub async fn stop_at(&self, now: DateTime<Utc>) -> TrackerResult<StopOutcome> {
        let outcome = self.engine.stop_at(now)?;
        self.publish();

        if let StopOutcome::Summary { .. } = outcome {
            if let Err(e) = self.store.clear_active(&self.user_id).await {
                error!(
                    "[TRACKER] Failed to clear active session: {}. Retrying on save/discard.",
                    e
                );
                self.clear_pending.store(true, Ordering::Release);
            }
            self.stop_heartbeat().await;
        }
        Ok(outcome)
    }

    async fn retry_clear_active(&self) {
        if !self.clear_pending.load(Ordering::Acquire) {
            return;
        }
        match self.store.clear_active(&self.user_id).await {
            Ok(()) => {
                self.clear_pending.store(false, Ordering::Release);
                info!("[TRACKER] Cleared stale active session");
            }
            Err(e) => warn!(
                "[TRACKER] Active session still not cleared: {}. A restart may resume it.",
                e
            ),
        }
    }

    /// Persist the finished session. On failure the timer stays in SUMMARY
    /// so the save can be retried or the session discarded.
    pub async fn save(&self, memo: Option<String>) -> TrackerResult<StudySession> {
        if self
            .is_saving
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("[TRACKER] Save already in progress, skipping");
            return Err(TrackerError::SaveInProgress);
        }

        let _guard = guard((), |_| {
            self.is_saving.store(false, Ordering::Release);
        });

        let pending = self.engine.pending_session(&self.user_id, memo)?;
        let duration = pending.duration_seconds;
        let session = self.store.create_session(pending).await.map_err(|e| {
            error!("[TRACKER] Failed to save session: {}. Keeping summary.", e);
            e
        })?;

        self.engine.mark_saved()?;
        self.publish();
        self.retry_clear_active().await;
        info!(
            "[TRACKER] Saved session {} ({}s, {})",
            session.id, duration, session.subject_name
        );
        Ok(session)
    }

    /// Drop the finished session. Rejected while a save is in flight.
    pub async fn discard(&self) -> TrackerResult<()> {
        if self.is_saving.load(Ordering::Acquire) {
            warn!("[TRACKER] Discard ignored, save in progress");
            return Err(TrackerError::SaveInProgress);
        }
        self.engine.discard()?;
        self.publish();
        self.retry_clear_active().await;
        Ok(())
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Overwrite the duration of `session` with `input` minutes.
    pub async fn edit_duration(
        &self,
        session: &StudySession,
        input: &str,
    ) -> TrackerResult<EditOutcome> {
        let Some(new) = stats::parse_duration_minutes(input) else {
            warn!(
                "[TRACKER] Rejected duration edit for {}: {:?}",
                session.id, input
            );
            return Ok(EditOutcome::Rejected);
        };

        self.store
            .update_session_duration(&self.user_id, &session.id, new)
            .await?;
        info!(
            "[TRACKER] Session {} duration {}s -> {}s",
            session.id, session.duration_seconds, new
        );
        Ok(EditOutcome::Updated {
            old: session.duration_seconds,
            new,
        })
    }

    pub async fn delete_session(&self, session_id: &str) -> TrackerResult<()> {
        self.store.delete_session(&self.user_id, session_id).await?;
        info!("[TRACKER] Deleted session {}", session_id);
        Ok(())
    }

    pub async fn today_sessions(&self) -> TrackerResult<Vec<StudySession>> {
        self.today_sessions_at(&Local::now()).await
    }

    /// Sessions that started within the study day of `now`.
    pub async fn today_sessions_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> TrackerResult<Vec<StudySession>> {
        let (start, end) = self.boundary.range_of(now);
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        Ok(self
            .store
            .sessions_between(&self.user_id, start, end)
            .await?)
    }

    pub async fn today_total(&self) -> TrackerResult<u64> {
        self.today_total_at(&Local::now()).await
    }

    pub async fn today_total_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> TrackerResult<u64> {
        let (start, end) = self.boundary.range_of(now);
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        let sessions = self
            .store
            .sessions_between(&self.user_id, start, end)
            .await?;
        Ok(stats::total_for_day(&self.boundary, &sessions, now))
    }

    /// Recent sessions, newest first, capped by the configured history limit.
    pub async fn history(&self) -> TrackerResult<Vec<StudySession>> {
        Ok(self
            .store
            .history(&self.user_id, self.config.history_limit)
            .await?)
    }

    pub async fn all_time_total(&self) -> TrackerResult<u64> {
        let sessions = self.store.history(&self.user_id, None).await?;
        Ok(stats::total_all_time(&sessions))
    }

    pub async fn subject_breakdown(&self) -> TrackerResult<Vec<SubjectTotal>> {
        let sessions = self.store.history(&self.user_id, None).await?;
        Ok(stats::total_by_subject(&sessions))
    }

    pub async fn week_totals_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> TrackerResult<[(NaiveDate, u64); 7]> {
        let (week, _) = self.boundary.week_of(now);
        let tz = now.timezone();
        let start = self.boundary.start_of_date(&tz, week[0]).with_timezone(&Utc);
        let end = match week[6].succ_opt() {
            Some(next) => self.boundary.start_of_date(&tz, next).with_timezone(&Utc),
            None => start + chrono::Duration::days(7),
        };
        let sessions = self
            .store
            .sessions_between(&self.user_id, start, end)
            .await?;
        Ok(stats::week_totals(&self.boundary, &sessions, now))
    }

    // ============================================
    // SUBJECTS
    // ============================================

    pub fn subjects(&self) -> Vec<Subject> {
        self.subjects
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub async fn refresh_subjects(&self) -> TrackerResult<Vec<Subject>> {
        let subjects = self.store.subjects(&self.user_id).await?;
        if let Ok(mut cached) = self.subjects.lock() {
            *cached = subjects.clone();
        }
        debug!("[TRACKER] Loaded {} subjects", subjects.len());
        Ok(subjects)
    }

    /// Append a subject. Without a color, a random `hsl(h, 70%, 50%)` is picked.
    pub async fn add_subject(&self, name: &str, color: Option<String>) -> TrackerResult<Subject> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::EmptySubjectName);
        }
        let subject = Subject {
            id: format!(
                "sub_{}_{:04x}",
                Utc::now().timestamp_millis(),
                rand::random::<u16>()
            ),
            name: name.to_string(),
            color: color.unwrap_or_else(random_color),
        };

        self.store.add_subject(&self.user_id, &subject).await?;
        if let Ok(mut cached) = self.subjects.lock() {
            cached.push(subject.clone());
        }
        info!("[TRACKER] Added subject '{}' ({})", subject.name, subject.id);
        Ok(subject)
    }
}

fn random_color() -> String {
    let hue = rand::random::<u16>() % 360;
    format!("hsl({}, 70%, 50%)", hue)
}
