use crate::config::{AppConfig, StorageMode};
use crate::error::{AppError, StoreError};
use crate::presence::{HttpPresence, PresenceSink};
use crate::store::{LocalStore, RemoteStore, SessionStore};
use crate::tracker::StudyTracker;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub const DB_FILE_NAME: &str = "studytimer.db";

/// Host of one tracker: logging, store selection and lifecycle
pub struct StudyApp {
    config: AppConfig,
    tracker: Arc<StudyTracker>,
}

impl StudyApp {
    pub async fn init(config: AppConfig) -> Result<Self, AppError> {
        crate::init_tracing(&config.log_filter);
        config.validate()?;

        let (store, presence): (Arc<dyn SessionStore>, Option<Arc<dyn PresenceSink>>) =
            match config.mode {
                StorageMode::Local => {
                    if config.room_id.is_some() {
                        warn!("[APP] Room presence needs remote mode, ignoring STUDYTIMER_ROOM_ID");
                    }
                    let store = open_local_store(&config.data_dir)?;
                    (Arc::new(store) as Arc<dyn SessionStore>, None)
                }
                StorageMode::Remote => {
                    let store = RemoteStore::new(config.remote_config());
                    store
                        .auth()
                        .set_tokens(config.access_token.clone(), config.refresh_token.clone())
                        .await;
                    let presence = config.room_id.clone().map(|room_id| {
                        Arc::new(HttpPresence::new(
                            config.api_base_url.clone(),
                            room_id,
                            store.auth().clone(),
                            config.http_timeout_secs,
                        )) as Arc<dyn PresenceSink>
                    });
                    (Arc::new(store) as Arc<dyn SessionStore>, presence)
                }
            };

        let tracker = Arc::new(StudyTracker::new(
            config.user_id.clone(),
            store,
            presence,
            config.tracker_config(),
        ));
        if let Some(elapsed) = tracker.init().await? {
            info!("[APP] Resumed interrupted session at {}s", elapsed);
        }

        info!(
            "[APP] Started in {:?} mode for user {}",
            config.mode, config.user_id
        );
        Ok(Self { config, tracker })
    }

    pub fn tracker(&self) -> &Arc<StudyTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
        info!("[APP] Shutdown complete");
    }
}

/// Open the SQLite store in `data_dir`, creating the directory. A corrupted
/// file is moved to `studytimer.db.corrupted.<unix>` and a fresh one is created.
pub fn open_local_store(data_dir: &Path) -> Result<LocalStore, AppError> {
    std::fs::create_dir_all(data_dir).map_err(|e| {
        let kind = e.kind();
        let msg = match kind {
            std::io::ErrorKind::PermissionDenied => {
                "Permission denied. Check the data directory is writable."
            }
            _ => "Failed to create data directory.",
        };
        AppError::Io(std::io::Error::new(
            kind,
            format!("{} Path: {}: {}", msg, data_dir.display(), e),
        ))
    })?;

    let db_path = data_dir.join(DB_FILE_NAME);
    match LocalStore::open(&db_path) {
        Ok(store) => Ok(store),
        Err(StoreError::Corrupted(reason)) if db_path.exists() => {
            let backup_path = data_dir.join(format!(
                "{}.corrupted.{}",
                DB_FILE_NAME,
                chrono::Utc::now().timestamp()
            ));
            std::fs::rename(&db_path, &backup_path).map_err(|rename_e| {
                warn!(
                    "[DB] Failed to rename corrupted DB to {:?}: {}",
                    backup_path, rename_e
                );
                StoreError::Corrupted(format!("{} (backup failed: {})", reason, rename_e))
            })?;
            info!(
                "[DB] Corrupted DB ({}) backed up to {:?}, starting fresh",
                reason, backup_path
            );
            Ok(LocalStore::open(&db_path)?)
        }
        Err(e) => Err(e.into()),
    }
}
