use crate::application::ports::remote_api::{RemoteAcceptance, RemoteApi, RemoteOutcome};
use crate::domain::entities::{NewVerification, ServerReferenceCode};
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RemoteApiError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Remote returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Unreadable response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl RemoteApiError {
    /// Timeouts, throttling and server faults are retried; any other client error is a
    /// decision by the authority and is not.
    pub fn into_outcome(self) -> RemoteOutcome {
        match self {
            RemoteApiError::Transport { .. } | RemoteApiError::Decode { .. } => {
                RemoteOutcome::TransientFailure(self.to_string())
            }
            RemoteApiError::Status { status, message } => {
                if is_retryable(status) {
                    RemoteOutcome::TransientFailure(format!("{status}: {message}"))
                } else {
                    RemoteOutcome::PermanentRejection(message)
                }
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || !status.is_client_error()
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Client for the verification backend (`/verify`, `/sync/code-usage`,
/// `/admin/reference-codes`).
pub struct HttpRemoteApi {
    base_url: RwLock<String>,
    http: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AppError::ConfigurationError(err.to_string()))?;

        Ok(Self {
            base_url: RwLock::new(normalize_base_url(base_url)?),
            http,
        })
    }

    pub async fn base_url(&self) -> String {
        self.base_url.read().await.clone()
    }

    pub async fn set_base_url(&self, base_url: &str) -> Result<(), AppError> {
        let normalized = normalize_base_url(base_url)?;
        *self.base_url.write().await = normalized;
        Ok(())
    }

    async fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.read().await, path)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, RemoteApiError> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| RemoteApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        debug!(%url, %status, "remote call finished");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let message = body
            .error
            .or(body.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(RemoteApiError::Status { status, message })
    }

    async fn post_for_outcome(&self, path: &str, body: serde_json::Value) -> RemoteOutcome {
        let url = self.url(path).await;
        match self.send(Method::POST, &url, Some(body)).await {
            Ok(response) => {
                let acceptance = response
                    .json::<RemoteAcceptance>()
                    .await
                    .unwrap_or_default();
                RemoteOutcome::Accepted(acceptance)
            }
            Err(err) => err.into_outcome(),
        }
    }
}

fn normalize_base_url(base_url: &str) -> Result<String, AppError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::ConfigurationError(
            "API endpoint is empty".to_string(),
        ));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(AppError::ConfigurationError(format!(
            "API endpoint `{trimmed}` must start with http:// or https://"
        )));
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn submit_verification(&self, submission: &NewVerification) -> RemoteOutcome {
        let body = match serde_json::to_value(submission) {
            Ok(body) => body,
            Err(err) => return RemoteOutcome::PermanentRejection(err.to_string()),
        };
        self.post_for_outcome("/verify", body).await
    }

    async fn submit_code_usage(&self, code: &str) -> RemoteOutcome {
        self.post_for_outcome("/sync/code-usage", json!({ "code": code }))
            .await
    }

    async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError> {
        let url = self.url("/admin/reference-codes").await;
        let response = self
            .send(Method::GET, &url, None)
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;

        response
            .json::<Vec<ServerReferenceCode>>()
            .await
            .map_err(|source| {
                AppError::DeserializationError(RemoteApiError::Decode { url, source }.to_string())
            })
    }

    async fn probe(&self) -> bool {
        let url = self.base_url().await;
        // any HTTP answer, even 404, proves the host is reachable
        self.http.get(&url).send().await.is_ok()
    }
}
