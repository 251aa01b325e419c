use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of remote side effect a queue entry stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncActionType {
    Verification,
    CodeGeneration,
    CodeUsage,
    Unknown(String),
}

impl SyncActionType {
    pub fn as_str(&self) -> &str {
        match self {
            SyncActionType::Verification => "verification",
            SyncActionType::CodeGeneration => "code_generation",
            SyncActionType::CodeUsage => "code_usage",
            SyncActionType::Unknown(value) => value.as_str(),
        }
    }
}

impl From<&str> for SyncActionType {
    fn from(value: &str) -> Self {
        match value {
            "verification" => SyncActionType::Verification,
            "code_generation" => SyncActionType::CodeGeneration,
            "code_usage" => SyncActionType::CodeUsage,
            other => SyncActionType::Unknown(other.to_string()),
        }
    }
}

impl From<String> for SyncActionType {
    fn from(value: String) -> Self {
        SyncActionType::from(value.as_str())
    }
}

impl From<SyncActionType> for String {
    fn from(kind: SyncActionType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SyncActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
