use crate::error::{StoreError, StoreResult};
use crate::models::{ActiveSessionState, NewStudySession, StudySession, Subject};
use crate::store::{SessionStore, StoreKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!("[DB] {}: Disk full. Free space or move the data directory.", context);
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check the data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<StudySession> {
    Ok(StudySession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        subject_name: row.get(3)?,
        subject_color: row.get(4)?,
        start_time: millis_to_utc(row.get(5)?),
        end_time: row.get::<_, Option<i64>>(6)?.map(millis_to_utc),
        duration_seconds: row.get::<_, i64>(7)?.max(0) as u64,
        memo: row.get(8)?,
    })
}

const SESSION_COLUMNS: &str = "id, user_id, subject_id, subject_name, subject_color, \
     start_ms, end_ms, duration_seconds, memo";

/// Guest / offline store backed by a single SQLite file
pub struct LocalStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(format!("Database mutex poisoned: {}", e)))
    }

    /// Open (or create) the database file. A file that fails the integrity
    /// check is reported as [`StoreError::Corrupted`] so the caller can move it aside.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: integrity check on startup, before touching the schema
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| StoreError::Corrupted(format!("Integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(StoreError::Corrupted(integrity));
        }

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        info!("[DB] Opened local store at {}", db_path.display());
        Ok(store)
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 2;

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                subject_name TEXT NOT NULL,
                subject_color TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER,
                duration_seconds INTEGER NOT NULL DEFAULT 0
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS subjects (
                user_id TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                color TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (user_id, id)
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS active_session (
                user_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_sessions_user_start ON sessions(user_id, start_ms)",
                [],
            )?;
        }

        // Migration 2: memo (idempotent ALTER)
        if current < 2 {
            let _ = conn.execute("ALTER TABLE sessions ADD COLUMN memo TEXT", []);
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    /// Run `f` inside BEGIN IMMEDIATE / COMMIT, rolling back on any error.
    fn in_transaction<T>(
        conn: &Connection,
        context: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any(context, &e);
            error!("[DB] {}: failed to begin transaction: {}", context, e);
            e
        })?;

        match f(conn) {
            Ok(value) => {
                conn.execute("COMMIT", []).map_err(|e| {
                    log_io_error_if_any(context, &e);
                    error!("[DB] {}: failed to commit transaction: {}", context, e);
                    let _ = conn.execute("ROLLBACK", []);
                    e
                })?;
                Ok(value)
            }
            Err(e) => {
                log_io_error_if_any(context, &e);
                error!("[DB] {}: {}. Rolling back transaction.", context, e);
                let _ = conn.execute("ROLLBACK", []);
                Err(e.into())
            }
        }
    }

    fn new_session_id() -> String {
        format!(
            "local_{}_{:04x}",
            Utc::now().timestamp_millis(),
            rand::random::<u16>()
        )
    }
}

/// SQLite integers are signed 64-bit; larger durations are refused.
fn stored_duration(duration_seconds: u64) -> StoreResult<i64> {
    i64::try_from(duration_seconds).map_err(|_| {
        StoreError::Parse(format!(
            "Duration {}s does not fit the sessions table",
            duration_seconds
        ))
    })
}

#[async_trait]
impl SessionStore for LocalStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    async fn create_session(&self, session: NewStudySession) -> StoreResult<StudySession> {
        let duration = stored_duration(session.duration_seconds)?;
        let session = session.with_id(Self::new_session_id());
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, subject_id, subject_name, subject_color,
                start_ms, end_ms, duration_seconds, memo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.user_id,
                session.subject_id,
                session.subject_name,
                session.subject_color,
                session.start_time.timestamp_millis(),
                session.end_time.map(|t| t.timestamp_millis()),
                duration,
                session.memo,
            ],
        )
        .map_err(|e| {
            log_io_error_if_any("create_session", &e);
            e
        })?;
        Ok(session)
    }

    async fn update_session_duration(
        &self,
        user_id: &str,
        session_id: &str,
        duration_seconds: u64,
    ) -> StoreResult<()> {
        let duration = stored_duration(duration_seconds)?;
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE sessions SET duration_seconds = ?1 WHERE id = ?2 AND user_id = ?3",
            params![duration, session_id, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "DELETE FROM sessions WHERE id = ?1 AND user_id = ?2",
            params![session_id, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn sessions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<StudySession>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions
             WHERE user_id = ?1 AND start_ms >= ?2 AND start_ms < ?3
             ORDER BY start_ms ASC",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![user_id, start.timestamp_millis(), end.timestamp_millis()],
            row_to_session,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn history(&self, user_id: &str, limit: Option<usize>) -> StoreResult<Vec<StudySession>> {
        let conn = self.lock_conn()?;
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions WHERE user_id = ?1 ORDER BY start_ms DESC LIMIT ?2",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, limit], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn load_active(&self, user_id: &str) -> StoreResult<Option<ActiveSessionState>> {
        let payload: Option<String> = {
            let conn = self.lock_conn()?;
            conn.query_row(
                "SELECT payload FROM active_session WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
        };

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_active(&self, user_id: &str, active: &ActiveSessionState) -> StoreResult<()> {
        let payload = serde_json::to_string(active)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO active_session (user_id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET payload = ?2, updated_at = ?3",
            params![user_id, payload, Utc::now().timestamp()],
        )
        .map_err(|e| {
            log_io_error_if_any("save_active", &e);
            e
        })?;
        Ok(())
    }

    async fn clear_active(&self, user_id: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM active_session WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    async fn subjects(&self, user_id: &str) -> StoreResult<Vec<Subject>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, color FROM subjects WHERE user_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Subject {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn add_subject(&self, user_id: &str, subject: &Subject) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        Self::in_transaction(&conn, "add_subject", |conn| {
            let position: i64 = conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM subjects WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO subjects (user_id, id, name, color, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, subject.id, subject.name, subject.color, position],
            )?;
            Ok(())
        })
    }
}
