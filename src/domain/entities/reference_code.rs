use crate::domain::value_objects::CodeStatus;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local cache entry for a reference code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    pub code: String,
    pub index_number: String,
    pub status: CodeStatus,
    pub generated_at: DateTime<Utc>,
    pub synced: bool,
}

/// Row shape returned by the remote reference-code listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReferenceCode {
    pub code: String,
    pub index_number: String,
    pub status: String,
    pub created_at: String,
}

impl ServerReferenceCode {
    pub fn parsed_status(&self) -> Result<CodeStatus, String> {
        self.status.parse()
    }

    /// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC) or a bare date.
    pub fn created_at_utc(&self) -> Result<DateTime<Utc>, String> {
        let raw = self.created_at.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(parsed.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(midnight.and_utc());
            }
        }
        Err(format!(
            "Reference code `{}` has an unreadable created_at `{}`",
            self.code, raw
        ))
    }
}

/// Queue payload for a `code_usage` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUsagePayload {
    pub code: String,
}
