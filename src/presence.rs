//! Room presence: who is studying right now, and on what.

use crate::auth::AuthManager;
use crate::error::{StoreError, StoreResult};
use crate::models::PresenceUpdate;
use crate::store::remote::endpoint;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn publish(&self, update: &PresenceUpdate) -> StoreResult<()>;
}

/// PUT /rooms/{room}/presence/{uid}
pub struct HttpPresence {
    api_base_url: String,
    room_id: String,
    auth_manager: Arc<AuthManager>,
    client: reqwest::Client,
    app_version: String,
}

impl HttpPresence {
    pub fn new(
        api_base_url: String,
        room_id: String,
        auth_manager: Arc<AuthManager>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            room_id,
            auth_manager,
            client,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[async_trait]
impl PresenceSink for HttpPresence {
    async fn publish(&self, update: &PresenceUpdate) -> StoreResult<()> {
        let access_token = self.auth_manager.get_access_token().await?;
        let url = endpoint(
            &self.api_base_url,
            &["rooms", &self.room_id, "presence", &update.user_id],
        )?;
        let response = self
            .client
            .put(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("X-App-Version", &self.app_version)
            .json(update)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }
}

/// Repeats the "studying" update while a focus session runs.
/// Failures are logged and never interrupt the timer.
pub struct PresenceHeartbeat {
    sink: Arc<dyn PresenceSink>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceHeartbeat {
    pub fn new(sink: Arc<dyn PresenceSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the heartbeat; the first update goes out immediately.
    /// A heartbeat that is already running is replaced.
    pub fn start(&self, user_id: &str, subject_name: &str) {
        let update = PresenceUpdate {
            user_id: user_id.to_string(),
            is_studying: true,
            current_subject: Some(subject_name.to_string()),
        };
        let sink = self.sink.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match sink.publish(&update).await {
                    Ok(()) => debug!("[PRESENCE] Heartbeat sent for {}", update.user_id),
                    Err(e) => warn!("[PRESENCE] Heartbeat failed: {}", e),
                }
            }
        });

        match self.handle.lock() {
            Ok(mut handle) => {
                if let Some(previous) = handle.replace(task) {
                    previous.abort();
                }
            }
            Err(e) => {
                warn!("[PRESENCE] Handle mutex poisoned: {}. Stopping heartbeat.", e);
                task.abort();
            }
        }
    }

    /// Abort the heartbeat without telling the room.
    pub fn abort(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(task) = handle.take() {
                task.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().map(|t| !t.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Abort the heartbeat and publish `isStudying = false`.
    pub async fn stop(&self, user_id: &str) {
        self.abort();
        let update = PresenceUpdate {
            user_id: user_id.to_string(),
            is_studying: false,
            current_subject: None,
        };
        if let Err(e) = self.sink.publish(&update).await {
            warn!("[PRESENCE] Failed to clear presence: {}", e);
        }
    }
}

impl Drop for PresenceHeartbeat {
    fn drop(&mut self) {
        self.abort();
    }
}
