use crate::auth::AuthManager;
use crate::error::{StoreError, StoreResult};
use crate::models::{ActiveSessionState, NewStudySession, StudySession, Subject};
use crate::store::{SessionStore, StoreKind};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `base` plus `segments`, each percent-encoded as a single path segment.
pub(crate) fn endpoint(base: &str, segments: &[&str]) -> StoreResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| StoreError::Parse(format!("API url {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Parse(format!("API url {} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Remote document API settings (base url, timeout, app version)
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub http_timeout_secs: u64,
    /// Sent in X-App-Version for debugging version skew
    pub app_version: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            http_timeout_secs: 30,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Signed-in store: JSON over HTTPS with bearer tokens
#[derive(Clone)]
pub struct RemoteStore {
    pub(crate) api_base_url: String,
    pub(crate) auth_manager: Arc<AuthManager>,
    pub(crate) client: reqwest::Client,
    pub(crate) app_version: String,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let api_base_url = config.api_base_url.trim_end_matches('/').to_string();
        Self {
            auth_manager: Arc::new(AuthManager::new(
                api_base_url.clone(),
                config.http_timeout_secs,
            )),
            api_base_url,
            client,
            app_version: config.app_version,
        }
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth_manager
    }

    /// Send one request. On HTTP 401 the token is refreshed once and the
    /// request repeated. Any other status is handed back to the caller.
    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> StoreResult<Response> {
        let url = endpoint(&self.api_base_url, segments)?;
        let path = url.path().to_string();
        let mut access_token = self.auth_manager.get_access_token().await?;
        let mut refresh_token = self.auth_manager.get_refresh_token().await;
        let mut retry_with_refresh = true;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header("Authorization", format!("Bearer {}", access_token))
                .header("X-App-Version", &self.app_version);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StoreError::Network(e.to_string()))?;
            debug!("[REMOTE] {} {} -> {}", method, path, response.status());

            if response.status() == StatusCode::UNAUTHORIZED && retry_with_refresh {
                let Some(refresh) = refresh_token.as_ref() else {
                    let err =
                        StoreError::Auth("Token expired (401) but no refresh token available".into());
                    warn!("[REMOTE] {} for {} {}", err, method, path);
                    return Err(err);
                };

                info!("[REMOTE] Token expired (401), refreshing");
                let token_result = self.auth_manager.refresh_token(refresh).await.map_err(|e| {
                    warn!("[REMOTE] Failed to refresh token: {}", e);
                    e
                })?;

                access_token = token_result.access_token;
                if let Some(new_refresh) = token_result.refresh_token {
                    refresh_token = Some(new_refresh);
                }
                self.auth_manager
                    .set_tokens(Some(access_token.clone()), refresh_token.clone())
                    .await;

                retry_with_refresh = false;
                continue;
            }

            return Ok(response);
        }
    }

    async fn error_for_status(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").into()
        } else {
            body
        };
        Err(StoreError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        let response = Self::error_for_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    fn rfc3339(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[async_trait]
impl SessionStore for RemoteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }

    async fn create_session(&self, session: NewStudySession) -> StoreResult<StudySession> {
        let body = serde_json::to_value(&session)?;
        let response = self.send(Method::POST, &["sessions"], &[], Some(&body)).await?;
        Self::read_json(response).await
    }

    async fn update_session_duration(
        &self,
        _user_id: &str,
        session_id: &str,
        duration_seconds: u64,
    ) -> StoreResult<()> {
        let body = serde_json::json!({ "durationSeconds": duration_seconds });
        let response = self
            .send(Method::PATCH, &["sessions", session_id], &[], Some(&body))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn delete_session(&self, _user_id: &str, session_id: &str) -> StoreResult<()> {
        let response = self
            .send(Method::DELETE, &["sessions", session_id], &[], None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn sessions_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<StudySession>> {
        let path = ["users", user_id, "sessions"];
        let query = [("from", Self::rfc3339(start)), ("to", Self::rfc3339(end))];
        let response = self.send(Method::GET, &path, &query, None).await?;
        let mut sessions: Vec<StudySession> = Self::read_json(response).await?;
        // Server filters too; keep the half-open contract regardless
        sessions.retain(|s| s.start_time >= start && s.start_time < end);
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    async fn history(&self, user_id: &str, limit: Option<usize>) -> StoreResult<Vec<StudySession>> {
        let path = ["users", user_id, "sessions"];
        let query: Vec<(&str, String)> = limit
            .map(|l| vec![("limit", l.to_string())])
            .unwrap_or_default();
        let response = self.send(Method::GET, &path, &query, None).await?;
        let mut sessions: Vec<StudySession> = Self::read_json(response).await?;
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    async fn load_active(&self, user_id: &str) -> StoreResult<Option<ActiveSessionState>> {
        let path = ["users", user_id, "active-session"];
        let response = self.send(Method::GET, &path, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::read_json(response).await?))
    }

    async fn save_active(&self, user_id: &str, active: &ActiveSessionState) -> StoreResult<()> {
        let path = ["users", user_id, "active-session"];
        let body = serde_json::to_value(active)?;
        let response = self.send(Method::PUT, &path, &[], Some(&body)).await?;
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn clear_active(&self, user_id: &str) -> StoreResult<()> {
        let path = ["users", user_id, "active-session"];
        let response = self.send(Method::DELETE, &path, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::error_for_status(response).await?;
        Ok(())
    }

    async fn subjects(&self, user_id: &str) -> StoreResult<Vec<Subject>> {
        let path = ["users", user_id, "subjects"];
        let response = self.send(Method::GET, &path, &[], None).await?;
        Self::read_json(response).await
    }

    async fn add_subject(&self, user_id: &str, subject: &Subject) -> StoreResult<()> {
        let path = ["users", user_id, "subjects"];
        let body = serde_json::to_value(subject)?;
        let response = self.send(Method::POST, &path, &[], Some(&body)).await?;
        Self::error_for_status(response).await?;
        Ok(())
    }
}
