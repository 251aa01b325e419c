use crate::domain::entities::{NewVerification, ServerReferenceCode};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAcceptance {
    pub message: Option<String>,
    pub redirect_url: Option<String>,
}

/// Classified result of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Accepted(RemoteAcceptance),
    /// Worth retrying later: unreachable host, timeout, 5xx.
    TransientFailure(String),
    /// The authority refused the request on its merits; retrying cannot help.
    PermanentRejection(String),
}

impl RemoteOutcome {
    pub fn accepted() -> Self {
        RemoteOutcome::Accepted(RemoteAcceptance::default())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RemoteOutcome::Accepted(_))
    }
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn submit_verification(&self, submission: &NewVerification) -> RemoteOutcome;
    async fn submit_code_usage(&self, code: &str) -> RemoteOutcome;
    async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError>;
    /// Cheap reachability check used to drive the connectivity flag.
    async fn probe(&self) -> bool;
}
