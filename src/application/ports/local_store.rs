use crate::domain::entities::{
    CodeRecord, NewVerification, ServerReferenceCode, StoreStats, SyncQueueItem,
    VerificationRecord,
};
use crate::domain::value_objects::{Email, SyncActionType, SyncQueueId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Durable partitions backing the offline client: verifications, cached codes, the sync
/// queue and persisted settings. The only component allowed to touch disk.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Opens the store on first use. Safe to call repeatedly and concurrently.
    async fn init(&self) -> Result<(), AppError>;

    /// Inserts (or overwrites by email) a verification and appends its `verification`
    /// queue entry in one transaction.
    async fn add_verification(
        &self,
        submission: NewVerification,
    ) -> Result<VerificationRecord, AppError>;
    async fn get_verification(&self, email: &Email)
        -> Result<Option<VerificationRecord>, AppError>;
    async fn mark_verification_synced(&self, email: &Email) -> Result<(), AppError>;
    async fn get_unsynced_verifications(&self) -> Result<Vec<VerificationRecord>, AppError>;

    async fn add_code(&self, code: &str, index_number: &str) -> Result<CodeRecord, AppError>;
    async fn get_code(&self, code: &str) -> Result<Option<CodeRecord>, AppError>;
    /// No-op for unknown codes; otherwise marks the code used and queues a `code_usage` entry.
    async fn mark_code_used(&self, code: &str) -> Result<(), AppError>;
    async fn cache_reference_codes(
        &self,
        snapshot: &[ServerReferenceCode],
    ) -> Result<usize, AppError>;
    async fn get_all_codes(&self) -> Result<Vec<CodeRecord>, AppError>;

    async fn enqueue_sync(
        &self,
        action_type: SyncActionType,
        payload: Value,
    ) -> Result<SyncQueueId, AppError>;
    /// Every queue entry, pending and failed, in insertion order.
    async fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>, AppError>;
    async fn list_failed_sync_items(&self) -> Result<Vec<SyncQueueItem>, AppError>;
    async fn remove_sync_queue_item(&self, id: SyncQueueId) -> Result<(), AppError>;
    /// Deletes a `failed` entry. `NotFound` when no failed entry has that id.
    async fn discard_failed_sync_item(&self, id: SyncQueueId) -> Result<(), AppError>;
    /// Bumps the retry counter, returning the new value. `None` when the entry is gone.
    async fn increment_sync_retry(
        &self,
        id: SyncQueueId,
        error_message: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<Option<u32>, AppError>;
    async fn mark_sync_failed(&self, id: SyncQueueId, reason: &str) -> Result<(), AppError>;

    async fn get_stats(&self) -> Result<StoreStats, AppError>;
    /// Empties every partition except settings. Destroys unsynced work.
    async fn clear_all(&self) -> Result<(), AppError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn put_setting(&self, key: &str, value: &str) -> Result<(), AppError>;
}
