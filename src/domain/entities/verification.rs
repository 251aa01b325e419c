use crate::domain::value_objects::Email;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields a caller submits for verification. Also the request body sent to the remote
/// verification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVerification {
    pub full_name: String,
    pub email: String,
    pub index_number: String,
    pub reference_code: String,
}

impl NewVerification {
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        index_number: impl Into<String>,
        reference_code: impl Into<String>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            index_number: index_number.into(),
            reference_code: reference_code.into(),
        }
    }

    /// Trimmed copy of the submission, or the first missing field.
    pub fn normalized(&self) -> Result<Self, String> {
        let full_name = required(&self.full_name, "Full name")?;
        let email = Email::parse(&self.email)?;
        let index_number = required(&self.index_number, "Index number")?;
        let reference_code = required(&self.reference_code, "Reference code")?;

        Ok(Self {
            full_name,
            email: email.into(),
            index_number,
            reference_code,
        })
    }
}

fn required(value: &str, label: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{label} is required"));
    }
    Ok(trimmed.to_string())
}

/// One offline-submitted verification attempt, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: String,
    pub full_name: String,
    pub email: Email,
    pub index_number: String,
    pub reference_code: String,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
    pub retry_count: u32,
}

impl VerificationRecord {
    /// Fresh unsynced record for an already validated submission.
    pub fn create(submission: NewVerification, email: Email, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            full_name: submission.full_name,
            email,
            index_number: submission.index_number,
            reference_code: submission.reference_code,
            timestamp: now,
            synced: false,
            retry_count: 0,
        }
    }

    pub fn submission(&self) -> NewVerification {
        NewVerification {
            full_name: self.full_name.clone(),
            email: self.email.to_string(),
            index_number: self.index_number.clone(),
            reference_code: self.reference_code.clone(),
        }
    }
}
