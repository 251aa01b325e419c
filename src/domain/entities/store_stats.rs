use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_verifications: u64,
    pub total_codes: u64,
    pub sync_queue_size: u64,
    pub unsynced_count: u64,
    pub failed_queue_size: u64,
}
