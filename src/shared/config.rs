use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Longest wait between retries of one queue entry (one week).
pub const MAX_BACKOFF_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub settings: SettingsDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub api_endpoint: String,
    pub request_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval_secs: u64,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub backoff_jitter: bool,
}

/// Values used until the user persists their own settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsDefaults {
    pub offline_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
            },
            remote: RemoteConfig {
                api_endpoint: "http://localhost:3000/api".to_string(),
                request_timeout_secs: 15,
                probe_interval_secs: 10,
            },
            sync: SyncConfig::default(),
            settings: SettingsDefaults { offline_mode: true },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_secs: 30,
            max_retries: 5,
            backoff_base_secs: 5,
            backoff_max_secs: 300, // 5 minutes
            backoff_jitter: true,
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("VERISYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("VERISYNC_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u32::MAX as u64) as u32;
        }

        if let Ok(v) = std::env::var("VERISYNC_API_ENDPOINT") {
            if !v.trim().is_empty() {
                cfg.remote.api_endpoint = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("VERISYNC_REQUEST_TIMEOUT_SECS") {
            cfg.remote.request_timeout_secs = value.max(1);
        }
        if let Some(value) = env_u64("VERISYNC_PROBE_INTERVAL_SECS") {
            cfg.remote.probe_interval_secs = value.max(1);
        }

        if let Ok(v) = std::env::var("VERISYNC_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("VERISYNC_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("VERISYNC_MAX_RETRIES") {
            cfg.sync.max_retries = value.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("VERISYNC_BACKOFF_BASE_SECS") {
            cfg.sync.backoff_base_secs = value;
        }
        if let Some(value) = env_u64("VERISYNC_BACKOFF_MAX_SECS") {
            cfg.sync.backoff_max_secs = value;
        }
        if let Ok(v) = std::env::var("VERISYNC_BACKOFF_JITTER") {
            cfg.sync.backoff_jitter = parse_bool(&v, cfg.sync.backoff_jitter);
        }

        if let Ok(v) = std::env::var("VERISYNC_OFFLINE_MODE") {
            cfg.settings.offline_mode = parse_bool(&v, cfg.settings.offline_mode);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.remote.api_endpoint.trim().is_empty() {
            return Err("Remote api_endpoint must not be empty".to_string());
        }
        if self.sync.sync_interval_secs == 0 {
            return Err("Sync sync_interval_secs must be greater than 0".to_string());
        }
        if self.sync.max_retries == 0 {
            return Err("Sync max_retries must be greater than 0".to_string());
        }
        if self.sync.backoff_max_secs < self.sync.backoff_base_secs {
            return Err("Sync backoff_max_secs must not be below backoff_base_secs".to_string());
        }
        if self.sync.backoff_max_secs > MAX_BACKOFF_SECS {
            return Err(format!(
                "Sync backoff_max_secs must not exceed {MAX_BACKOFF_SECS}"
            ));
        }
        Ok(())
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|dir| dir.join("verisync"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    format!("sqlite://{}", dir.join("local.db").display())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
