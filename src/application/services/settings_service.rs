use crate::application::ports::LocalStore;
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const OFFLINE_MODE_KEY: &str = "offline_mode";
pub const API_ENDPOINT_KEY: &str = "api_endpoint";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub offline_mode: bool,
    pub api_endpoint: String,
}

/// User preferences persisted in the local store, with config-provided defaults.
pub struct SettingsService {
    store: Arc<dyn LocalStore>,
    defaults: Settings,
}

impl SettingsService {
    pub fn new(store: Arc<dyn LocalStore>, defaults: Settings) -> Self {
        Self { store, defaults }
    }

    pub async fn offline_mode(&self) -> Result<bool, AppError> {
        let Some(raw) = self.store.get_setting(OFFLINE_MODE_KEY).await? else {
            return Ok(self.defaults.offline_mode);
        };

        match raw.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => {
                warn!(value = other, "ignoring unreadable offline_mode setting");
                Ok(self.defaults.offline_mode)
            }
        }
    }

    pub async fn set_offline_mode(&self, enabled: bool) -> Result<(), AppError> {
        self.store
            .put_setting(OFFLINE_MODE_KEY, if enabled { "true" } else { "false" })
            .await?;
        info!(enabled, "offline mode updated");
        Ok(())
    }

    pub async fn api_endpoint(&self) -> Result<String, AppError> {
        Ok(self
            .store
            .get_setting(API_ENDPOINT_KEY)
            .await?
            .unwrap_or_else(|| self.defaults.api_endpoint.clone()))
    }

    pub async fn set_api_endpoint(&self, endpoint: &str) -> Result<String, AppError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(AppError::ValidationError(
                "API endpoint must not be empty".to_string(),
            ));
        }

        self.store.put_setting(API_ENDPOINT_KEY, endpoint).await?;
        info!(endpoint, "api endpoint updated");
        Ok(endpoint.to_string())
    }

    pub async fn current(&self) -> Result<Settings, AppError> {
        Ok(Settings {
            offline_mode: self.offline_mode().await?,
            api_endpoint: self.api_endpoint().await?,
        })
    }
}
