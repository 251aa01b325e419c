use super::rows::{CodeRow, SyncQueueItemRow, VerificationRow};
use crate::domain::entities::{CodeRecord, SyncQueueItem, VerificationRecord};
use crate::domain::value_objects::{Email, SyncActionType, SyncQueueId, SyncQueueStatus};
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};

pub(super) fn millis_to_datetime(value: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(value).single().ok_or_else(|| {
        AppError::DeserializationError(format!("Invalid timestamp in local store: {value}"))
    })
}

fn count_to_u32(value: i64) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| {
        AppError::DeserializationError(format!("Invalid retry count in local store: {value}"))
    })
}

pub(super) fn verification_from_row(row: VerificationRow) -> Result<VerificationRecord, AppError> {
    Ok(VerificationRecord {
        id: row.id,
        full_name: row.full_name,
        email: Email::new(row.email).map_err(AppError::DeserializationError)?,
        index_number: row.index_number,
        reference_code: row.reference_code,
        timestamp: millis_to_datetime(row.created_at)?,
        synced: row.synced,
        retry_count: count_to_u32(row.retry_count)?,
    })
}

pub(super) fn code_from_row(row: CodeRow) -> Result<CodeRecord, AppError> {
    Ok(CodeRecord {
        status: row.status.parse().map_err(AppError::DeserializationError)?,
        code: row.code,
        index_number: row.index_number,
        generated_at: millis_to_datetime(row.generated_at)?,
        synced: row.synced,
    })
}

pub(super) fn sync_queue_item_from_row(row: SyncQueueItemRow) -> Result<SyncQueueItem, AppError> {
    // unparseable text is kept verbatim so the drain can mark the entry failed
    let payload = serde_json::from_str(&row.payload)
        .unwrap_or_else(|_| serde_json::Value::String(row.payload.clone()));
    Ok(SyncQueueItem {
        id: SyncQueueId::new(row.id).map_err(AppError::DeserializationError)?,
        action_type: SyncActionType::from(row.action_type.as_str()),
        payload,
        status: SyncQueueStatus::from(row.status.as_str()),
        retry_count: count_to_u32(row.retry_count)?,
        created_at: millis_to_datetime(row.created_at)?,
        updated_at: millis_to_datetime(row.updated_at)?,
        next_attempt_at: row.next_attempt_at.map(millis_to_datetime).transpose()?,
        error_message: row.error_message,
    })
}
