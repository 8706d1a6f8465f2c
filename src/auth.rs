use crate::error::{StoreError, StoreResult};
use crate::models::TokenRefreshResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Holds the bearer tokens of the remote store and refreshes them on demand.
pub struct AuthManager {
    api_base_url: String,
    client: reqwest::Client,
    pub access_token: Arc<RwLock<Option<String>>>,
    pub refresh_token: Arc<RwLock<Option<String>>>,
}

impl AuthManager {
    pub fn new(api_base_url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base_url,
            client,
            access_token: Arc::new(RwLock::new(None)),
            refresh_token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_tokens(&self, access_token: Option<String>, refresh_token: Option<String>) {
        *self.access_token.write().await = access_token;
        *self.refresh_token.write().await = refresh_token;
    }

    pub async fn get_access_token(&self) -> StoreResult<String> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Auth("Access token not set".to_string()))
    }

    pub async fn get_refresh_token(&self) -> Option<String> {
        self.refresh_token.read().await.clone()
    }

    /// POST /auth/refresh. Does not store the result; the caller decides.
    pub async fn refresh_token(&self, refresh_token: &str) -> StoreResult<TokenRefreshResult> {
        let url = format!("{}/auth/refresh", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "refresh_token": refresh_token
            }))
            .send()
            .await
            .map_err(|e| StoreError::Network(format!("Token refresh: {}", e)))?;

        if !response.status().is_success() {
            return Err(StoreError::Auth(format!(
                "Token refresh failed with status: {}",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(format!("Refresh response: {}", e)))?;

        let access_token = json["access_token"]
            .as_str()
            .ok_or_else(|| StoreError::Auth("Missing access_token in refresh response".into()))?
            .to_string();

        let refresh_token = json["refresh_token"].as_str().map(|s| s.to_string());

        Ok(TokenRefreshResult {
            access_token,
            refresh_token,
        })
    }
}
