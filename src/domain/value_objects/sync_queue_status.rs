use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a queue entry. `Failed` is terminal: the entry is kept for an operator
/// to inspect or discard but never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncQueueStatus {
    Pending,
    Failed,
    Unknown(String),
}

impl SyncQueueStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncQueueStatus::Pending => "pending",
            SyncQueueStatus::Failed => "failed",
            SyncQueueStatus::Unknown(value) => value.as_str(),
        }
    }
}

impl From<&str> for SyncQueueStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => SyncQueueStatus::Pending,
            "failed" => SyncQueueStatus::Failed,
            other => SyncQueueStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SyncQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
