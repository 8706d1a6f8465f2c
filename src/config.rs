use crate::error::AppError;
use crate::presence::DEFAULT_HEARTBEAT_SECS;
use crate::store::RemoteConfig;
use crate::tracker::{TrackerConfig, DEFAULT_HISTORY_LIMIT};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const GUEST_USER_ID: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Guest / offline: SQLite file in the data directory
    Local,
    /// Signed in: remote document API
    Remote,
}

impl FromStr for StorageMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "guest" => Ok(StorageMode::Local),
            "remote" => Ok(StorageMode::Remote),
            other => Err(AppError::Config(format!(
                "STUDYTIMER_MODE must be 'local' or 'remote', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: StorageMode,
    pub data_dir: PathBuf,
    pub api_base_url: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: String,
    /// Presence is published only when a room is set
    pub room_id: Option<String>,
    pub heartbeat_secs: u64,
    pub tick_ms: u64,
    pub day_cutoff_hour: u32,
    /// None loads the whole history
    pub history_limit: Option<usize>,
    pub http_timeout_secs: u64,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let remote = RemoteConfig::default();
        Self {
            mode: StorageMode::Local,
            data_dir: default_data_dir(),
            api_base_url: remote.api_base_url,
            access_token: None,
            refresh_token: None,
            user_id: GUEST_USER_ID.to_string(),
            room_id: None,
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            tick_ms: 1000,
            day_cutoff_hour: crate::day::DEFAULT_CUTOFF_HOUR,
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            http_timeout_secs: remote.http_timeout_secs,
            log_filter: "info".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("studytimer")
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, AppError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{}='{}': {}", name, raw, e))),
        _ => Ok(None),
    }
}

fn string_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Read `STUDYTIMER_*` variables on top of the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(mode) = string_var(&lookup, "STUDYTIMER_MODE") {
            config.mode = mode.parse()?;
        }
        if let Some(dir) = string_var(&lookup, "STUDYTIMER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = string_var(&lookup, "STUDYTIMER_API_URL") {
            config.api_base_url = url;
        }
        config.access_token = string_var(&lookup, "STUDYTIMER_ACCESS_TOKEN");
        config.refresh_token = string_var(&lookup, "STUDYTIMER_REFRESH_TOKEN");
        if let Some(user_id) = string_var(&lookup, "STUDYTIMER_USER_ID") {
            config.user_id = user_id;
        }
        config.room_id = string_var(&lookup, "STUDYTIMER_ROOM_ID");
        if let Some(secs) = parse_var(&lookup, "STUDYTIMER_HEARTBEAT_SECS")? {
            config.heartbeat_secs = secs;
        }
        if let Some(ms) = parse_var(&lookup, "STUDYTIMER_TICK_MS")? {
            config.tick_ms = ms;
        }
        if let Some(hour) = parse_var(&lookup, "STUDYTIMER_DAY_CUTOFF_HOUR")? {
            config.day_cutoff_hour = hour;
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "STUDYTIMER_HISTORY_LIMIT")? {
            // 0 means unlimited
            config.history_limit = if limit == 0 { None } else { Some(limit) };
        }
        if let Some(secs) = parse_var(&lookup, "STUDYTIMER_HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = secs;
        }
        if let Some(filter) = string_var(&lookup, "STUDYTIMER_LOG") {
            config.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.day_cutoff_hour > 23 {
            return Err(AppError::Config(format!(
                "Day cutoff hour must be 0-23, got {}",
                self.day_cutoff_hour
            )));
        }
        if self.tick_ms == 0 {
            return Err(AppError::Config("Tick interval must be positive".into()));
        }
        if self.heartbeat_secs == 0 {
            return Err(AppError::Config("Heartbeat interval must be positive".into()));
        }
        if self.mode == StorageMode::Remote && self.user_id == GUEST_USER_ID {
            return Err(AppError::Config(
                "Remote mode needs STUDYTIMER_USER_ID".into(),
            ));
        }
        Ok(())
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            tick_interval: Duration::from_millis(self.tick_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            day_cutoff_hour: self.day_cutoff_hour,
            history_limit: self.history_limit,
        }
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            api_base_url: self.api_base_url.clone(),
            http_timeout_secs: self.http_timeout_secs,
            ..RemoteConfig::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(crate::app::DB_FILE_NAME)
    }
}
