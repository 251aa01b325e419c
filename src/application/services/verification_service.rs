use crate::application::ports::{LocalStore, RemoteAcceptance, RemoteApi, RemoteOutcome};
use crate::application::services::settings_service::SettingsService;
use crate::application::services::sync_manager::SyncManager;
use crate::domain::entities::{NewVerification, VerificationRecord};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// The authority accepted the submission directly.
    Verified(RemoteAcceptance),
    Rejected { reason: String },
    /// Stored locally; the sync manager will deliver it.
    QueuedOffline(VerificationRecord),
}

pub struct VerificationService {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApi>,
    settings: Arc<SettingsService>,
    connectivity: ConnectivityMonitor,
    sync_manager: Arc<SyncManager>,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApi>,
        settings: Arc<SettingsService>,
        connectivity: ConnectivityMonitor,
        sync_manager: Arc<SyncManager>,
    ) -> Self {
        Self {
            store,
            remote,
            settings,
            connectivity,
            sync_manager,
        }
    }

    pub async fn submit(&self, submission: NewVerification) -> Result<SubmissionOutcome, AppError> {
        let submission = submission
            .normalized()
            .map_err(AppError::ValidationError)?;
        let offline_mode = self.settings.offline_mode().await?;

        if !offline_mode || self.connectivity.is_online() {
            match self.remote.submit_verification(&submission).await {
                RemoteOutcome::Accepted(acceptance) => {
                    return Ok(SubmissionOutcome::Verified(acceptance));
                }
                RemoteOutcome::PermanentRejection(reason) => {
                    return Ok(SubmissionOutcome::Rejected { reason });
                }
                RemoteOutcome::TransientFailure(reason) if !offline_mode => {
                    return Err(AppError::Network(reason));
                }
                RemoteOutcome::TransientFailure(reason) => {
                    warn!(reason = %reason, "remote unavailable, storing verification locally");
                }
            }
        }

        let record = self.store.add_verification(submission).await?;
        info!(email = %record.email, "verification queued for sync");

        if self.connectivity.is_online() {
            let manager = Arc::clone(&self.sync_manager);
            tokio::spawn(async move {
                if let Err(err) = manager.force_sync_now().await {
                    warn!(error = %err, "background sync after submission failed");
                }
            });
        }

        Ok(SubmissionOutcome::QueuedOffline(record))
    }

    /// Replaces the local code cache with the authority's current snapshot.
    pub async fn refresh_code_cache(&self) -> Result<usize, AppError> {
        let snapshot = self.remote.fetch_reference_codes().await?;
        let cached = self.store.cache_reference_codes(&snapshot).await?;
        debug!(cached, "reference code cache refreshed");
        Ok(cached)
    }
}
