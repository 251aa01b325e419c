use crate::application::ports::{LocalStore, RemoteApi};
use crate::application::services::{
    Settings, SettingsService, SyncManager, SyncManagerConfig, VerificationService,
};
use crate::infrastructure::network::{ConnectivityMonitor, ProbeHandle};
use crate::infrastructure::offline::SqliteLocalStore;
use crate::infrastructure::remote::HttpRemoteApi;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wires every long-lived component together. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<SqliteLocalStore>,
    pub remote: Arc<HttpRemoteApi>,
    pub connectivity: ConnectivityMonitor,
    pub settings_service: Arc<SettingsService>,
    pub sync_manager: Arc<SyncManager>,
    pub verification_service: Arc<VerificationService>,
}

impl AppState {
    pub async fn initialize(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let store = Arc::new(SqliteLocalStore::new(
            config.database.url.clone(),
            config.database.max_connections,
        ));
        store.init().await?;
        let store_port: Arc<dyn LocalStore> = store.clone();

        let settings_service = Arc::new(SettingsService::new(
            Arc::clone(&store_port),
            Settings {
                offline_mode: config.settings.offline_mode,
                api_endpoint: config.remote.api_endpoint.clone(),
            },
        ));

        let endpoint = settings_service.api_endpoint().await?;
        let remote = Arc::new(HttpRemoteApi::new(
            &endpoint,
            Duration::from_secs(config.remote.request_timeout_secs),
        )?);
        let remote_port: Arc<dyn RemoteApi> = remote.clone();

        // optimistic until the first probe says otherwise
        let connectivity = ConnectivityMonitor::new(true);

        let sync_manager = Arc::new(SyncManager::new(
            Arc::clone(&store_port),
            Arc::clone(&remote_port),
            connectivity.clone(),
            SyncManagerConfig::from_config(&config.sync),
        ));

        let verification_service = Arc::new(VerificationService::new(
            store_port,
            remote_port,
            Arc::clone(&settings_service),
            connectivity.clone(),
            Arc::clone(&sync_manager),
        ));

        info!(
            database_url = %store.database_url(),
            api_endpoint = %endpoint,
            "application state initialized"
        );

        Ok(Self {
            config,
            store,
            remote,
            connectivity,
            settings_service,
            sync_manager,
            verification_service,
        })
    }

    /// Points the remote client at a new base address and persists it.
    pub async fn set_api_endpoint(&self, endpoint: &str) -> Result<String, AppError> {
        self.remote.set_base_url(endpoint).await?;
        let normalized = self.remote.base_url().await;
        self.settings_service.set_api_endpoint(&normalized).await
    }

    pub fn spawn_connectivity_probe(&self) -> ProbeHandle {
        let remote: Arc<dyn RemoteApi> = self.remote.clone();
        self.connectivity.spawn_probe(
            remote,
            Duration::from_secs(self.config.remote.probe_interval_secs),
        )
    }

    pub async fn shutdown(&self) {
        self.sync_manager.stop_auto_sync().await;
        self.store.close().await;
        info!("application state shut down");
    }
}
