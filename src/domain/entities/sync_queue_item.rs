use crate::domain::value_objects::{SyncActionType, SyncQueueId, SyncQueueStatus};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: SyncQueueId,
    pub action_type: SyncActionType,
    pub payload: Value,
    pub status: SyncQueueStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncQueueItem {
    pub fn is_failed(&self) -> bool {
        self.status == SyncQueueStatus::Failed
    }

    /// Whether the backoff window, if any, has elapsed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            format!(
                "Malformed {} payload for queue item {}: {}",
                self.action_type, self.id, err
            )
        })
    }
}
