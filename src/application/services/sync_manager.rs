use crate::application::ports::{LocalStore, RemoteApi, RemoteOutcome};
use crate::application::services::retry_policy::RetryPolicy;
use crate::domain::entities::{CodeUsagePayload, StoreStats, SyncQueueItem, VerificationRecord};
use crate::domain::value_objects::{SyncActionType, SyncQueueId};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

mod metrics;

pub use metrics::{SyncMetrics, SyncMetricsSnapshot};

#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    pub sync_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncManagerConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            sync_interval: config.sync_interval(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Entry the authority refused outright. It has been dropped from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRejection {
    pub queue_id: SyncQueueId,
    pub action_type: SyncActionType,
    pub reason: String,
}

/// What a single drain pass did with each queue entry it looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Entries sent to the remote (or decoded and found unusable).
    pub processed: usize,
    pub synced: usize,
    pub retried: usize,
    /// Entries moved to the terminal `failed` status during this pass.
    pub failed: usize,
    pub rejected: Vec<SyncRejection>,
    /// Entries already `failed` before the pass started.
    pub skipped: usize,
    /// Entries still inside their backoff window.
    pub deferred: usize,
    /// Entries with no remote counterpart, removed without a call.
    pub discarded: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub is_online: bool,
    pub is_syncing: bool,
    pub auto_sync_active: bool,
    #[serde(flatten)]
    pub stats: StoreStats,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub sync_errors: u32,
    pub metrics: SyncMetricsSnapshot,
}

#[derive(Debug, Clone, Default)]
struct RuntimeStatus {
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    sync_errors: u32,
}

struct AutoSyncHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the local sync queue against the remote authority, one pass at a time.
pub struct SyncManager {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteApi>,
    connectivity: ConnectivityMonitor,
    config: SyncManagerConfig,
    syncing: AtomicBool,
    status: RwLock<RuntimeStatus>,
    metrics: SyncMetrics,
    auto_sync: Mutex<Option<AutoSyncHandle>>,
}

impl SyncManager {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteApi>,
        connectivity: ConnectivityMonitor,
        config: SyncManagerConfig,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            config,
            syncing: AtomicBool::new(false),
            status: RwLock::new(RuntimeStatus::default()),
            metrics: SyncMetrics::default(),
            auto_sync: Mutex::new(None),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs one drain pass. Returns `None` without touching the queue when offline or
    /// when another pass is already running.
    pub async fn sync_all(&self) -> Result<Option<DrainReport>, AppError> {
        if !self.connectivity.is_online() {
            debug!("offline, skipping sync pass");
            return Ok(None);
        }

        let Some(_guard) = SyncingGuard::acquire(&self.syncing) else {
            debug!("sync already in progress");
            return Ok(None);
        };

        info!("starting sync pass");
        let result = self.drain().await;

        let mut status = self.status.write().await;
        match &result {
            Ok(report) => {
                status.last_sync_at = Some(Utc::now());
                status.last_error = None;
                self.metrics.record_pass();
                info!(
                    processed = report.processed,
                    synced = report.synced,
                    retried = report.retried,
                    failed = report.failed,
                    rejected = report.rejected.len(),
                    deferred = report.deferred,
                    "sync pass completed"
                );
            }
            Err(err) => {
                status.last_error = Some(err.to_string());
                status.sync_errors += 1;
                error!(error = %err, storage = err.is_storage(), "sync pass aborted");
            }
        }

        result.map(Some)
    }

    /// User-triggered pass. Does nothing while a pass is in flight.
    pub async fn force_sync_now(&self) -> Result<Option<DrainReport>, AppError> {
        if self.is_syncing() {
            info!("sync already in progress");
            return Ok(None);
        }
        self.sync_all().await
    }

    async fn drain(&self) -> Result<DrainReport, AppError> {
        let queue = self.store.get_sync_queue().await?;
        info!(count = queue.len(), "found queue entries to sync");

        let mut report = DrainReport::default();
        for item in queue {
            if item.is_failed() {
                report.skipped += 1;
                continue;
            }
            if self.config.retry.is_exhausted(item.retry_count) {
                self.exhaust(&item, "retry ceiling reached", &mut report)
                    .await?;
                continue;
            }
            if !item.is_due(Utc::now()) {
                report.deferred += 1;
                continue;
            }
            self.process_item(&item, &mut report).await?;
        }

        Ok(report)
    }

    async fn process_item(
        &self,
        item: &SyncQueueItem,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        let outcome = match &item.action_type {
            SyncActionType::Verification => {
                let record = match item.decode_payload::<VerificationRecord>() {
                    Ok(record) => record,
                    Err(reason) => return self.reject_malformed(item, &reason, report).await,
                };
                report.processed += 1;

                let outcome = self.remote.submit_verification(&record.submission()).await;
                if outcome.is_accepted() {
                    self.store.remove_sync_queue_item(item.id).await?;
                    self.mark_origin_synced(&record).await?;
                }
                outcome
            }
            SyncActionType::CodeUsage => {
                let payload = match item.decode_payload::<CodeUsagePayload>() {
                    Ok(payload) => payload,
                    Err(reason) => return self.reject_malformed(item, &reason, report).await,
                };
                report.processed += 1;

                let outcome = self.remote.submit_code_usage(&payload.code).await;
                if outcome.is_accepted() {
                    self.store.remove_sync_queue_item(item.id).await?;
                }
                outcome
            }
            SyncActionType::CodeGeneration => {
                // codes are issued by the authority; nothing to push
                self.store.remove_sync_queue_item(item.id).await?;
                report.discarded += 1;
                debug!(queue_id = %item.id, "discarded code_generation entry");
                return Ok(());
            }
            SyncActionType::Unknown(kind) => {
                self.store.remove_sync_queue_item(item.id).await?;
                report.discarded += 1;
                warn!(queue_id = %item.id, action_type = %kind, "discarded entry with unknown action type");
                return Ok(());
            }
        };

        match outcome {
            RemoteOutcome::Accepted(_) => {
                report.synced += 1;
                self.metrics.record_accepted();
                info!(queue_id = %item.id, action_type = %item.action_type, "synced queue entry");
            }
            RemoteOutcome::TransientFailure(reason) => {
                self.record_transient(item, &reason, report).await?;
            }
            RemoteOutcome::PermanentRejection(reason) => {
                self.store.remove_sync_queue_item(item.id).await?;
                self.metrics.record_rejected(&reason);
                warn!(
                    queue_id = %item.id,
                    action_type = %item.action_type,
                    reason = %reason,
                    "remote rejected queue entry"
                );
                report.rejected.push(SyncRejection {
                    queue_id: item.id,
                    action_type: item.action_type.clone(),
                    reason,
                });
            }
        }

        Ok(())
    }

    /// The record may have been overwritten by a newer submission for the same email
    /// since this entry was queued. Only the exact record that was sent is marked.
    async fn mark_origin_synced(&self, sent: &VerificationRecord) -> Result<(), AppError> {
        match self.store.get_verification(&sent.email).await? {
            Some(current) if current.id == sent.id => {
                self.store.mark_verification_synced(&sent.email).await
            }
            Some(_) => {
                debug!(email = %sent.email, "verification replaced locally, leaving it unsynced");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn record_transient(
        &self,
        item: &SyncQueueItem,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        self.metrics.record_transient();

        let attempts = item.retry_count.saturating_add(1);
        let next_attempt_at = self.config.retry.next_attempt_at(Utc::now(), attempts);
        let retry_count = self
            .store
            .increment_sync_retry(item.id, reason, Some(next_attempt_at))
            .await?;

        match retry_count {
            Some(count) if self.config.retry.is_exhausted(count) => {
                let message = format!("retry ceiling reached after {count} attempts: {reason}");
                self.exhaust(item, &message, report).await?;
            }
            Some(count) => {
                report.retried += 1;
                warn!(
                    queue_id = %item.id,
                    retry_count = count,
                    next_attempt_at = %next_attempt_at,
                    reason = %reason,
                    "sync attempt failed, will retry"
                );
            }
            // removed concurrently, e.g. by clear_all
            None => {}
        }
        Ok(())
    }

    async fn exhaust(
        &self,
        item: &SyncQueueItem,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        self.store.mark_sync_failed(item.id, reason).await?;
        self.metrics.record_exhausted();
        report.failed += 1;
        warn!(queue_id = %item.id, action_type = %item.action_type, reason = %reason, "queue entry marked failed");
        Ok(())
    }

    async fn reject_malformed(
        &self,
        item: &SyncQueueItem,
        reason: &str,
        report: &mut DrainReport,
    ) -> Result<(), AppError> {
        report.processed += 1;
        error!(queue_id = %item.id, reason = %reason, "queue entry payload cannot be decoded");
        self.exhaust(item, reason, report).await
    }

    /// Starts the periodic timer and the connectivity subscription. Returns `false` if
    /// auto-sync was already running.
    pub async fn start_auto_sync(self: &Arc<Self>) -> bool {
        let mut slot = self.auto_sync.lock().await;
        match slot.take() {
            Some(handle) if !handle.task.is_finished() => {
                *slot = Some(handle);
                debug!("auto sync already running");
                return false;
            }
            Some(_) => warn!("replacing auto sync task that ended unexpectedly"),
            None => {}
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.run_auto_sync(shutdown_rx).await });
        *slot = Some(AutoSyncHandle { shutdown, task });

        info!(
            interval_secs = self.config.sync_interval.as_secs(),
            "auto sync started"
        );
        true
    }

    /// Cancels the timer and the subscription. A pass already in flight runs to
    /// completion before this returns.
    pub async fn stop_auto_sync(&self) -> bool {
        let handle = self.auto_sync.lock().await.take();
        let Some(handle) = handle else {
            return false;
        };

        let _ = handle.shutdown.send(());
        if let Err(err) = handle.task.await {
            warn!(error = %err, "auto sync task ended abnormally");
        }
        info!("auto sync stopped");
        true
    }

    pub async fn is_auto_sync_running(&self) -> bool {
        self.auto_sync
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    async fn run_auto_sync(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut connectivity = self.connectivity.subscribe();
        connectivity.borrow_and_update();
        let mut watching = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.run_triggered_pass("timer").await,
                changed = connectivity.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    // watch only signals real transitions, so seeing `true` here means
                    // the flag went offline and came back, possibly coalesced
                    let online = *connectivity.borrow_and_update();
                    if online {
                        info!("network online, syncing queued work");
                        self.run_triggered_pass("reconnect").await;
                    }
                }
            }
        }

        debug!("auto sync loop exited");
    }

    async fn run_triggered_pass(&self, trigger: &'static str) {
        match self.sync_all().await {
            Ok(Some(report)) => debug!(trigger, synced = report.synced, "triggered sync finished"),
            Ok(None) => debug!(trigger, "triggered sync skipped"),
            Err(err) => error!(trigger, error = %err, "triggered sync failed"),
        }
    }

    pub async fn get_status(&self) -> Result<SyncStatusSnapshot, AppError> {
        let stats = self.store.get_stats().await?;
        let status = self.status.read().await.clone();

        Ok(SyncStatusSnapshot {
            is_online: self.connectivity.is_online(),
            is_syncing: self.is_syncing(),
            auto_sync_active: self.is_auto_sync_running().await,
            stats,
            last_sync_at: status.last_sync_at,
            last_error: status.last_error,
            sync_errors: status.sync_errors,
            metrics: self.metrics.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests;
