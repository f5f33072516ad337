//! Async HTTP client for delivering webhooks downstream.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

/// Longest slice of a downstream error body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors from a single downstream delivery.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("downstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Shared webhook sender.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .user_agent(concat!("teams-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ForwardError::Request)?;

        Ok(Self { client, timeout })
    }

    /// Serialize `payload` and POST it to `url`.
    pub async fn forward_json(&self, url: &str, payload: &Value) -> Result<String, ForwardError> {
        let body = serde_json::to_vec(payload)?;
        self.post_raw(url, body).await
    }

    /// POST `body` to `url` unchanged as `application/json`.
    ///
    /// Returns the downstream response body on a 2xx status. Neither logs
    /// nor errors carry the URL path or query, which may hold a credential.
    pub async fn post_raw(
        &self,
        url: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<String, ForwardError> {
        let host = target_host(url);

        info!(
            host = %host,
            timeout_ms = self.timeout.as_millis() as u64,
            "webhook_send_starting"
        );

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(&host, e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(&host, e))?;

        if !status.is_success() {
            error!(
                host = %host,
                status_code = status.as_u16(),
                response_length = text.len(),
                "webhook_send_rejected"
            );
            return Err(ForwardError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        info!(
            host = %host,
            status_code = status.as_u16(),
            response_length = text.len(),
            "webhook_send_complete"
        );

        Ok(text)
    }

    fn classify(&self, host: &str, e: reqwest::Error) -> ForwardError {
        let e = e.without_url();
        if e.is_timeout() {
            error!(
                host = host,
                timeout_ms = self.timeout.as_millis() as u64,
                error = %e,
                "webhook_send_timeout"
            );
            ForwardError::Timeout(self.timeout)
        } else {
            error!(host = host, error = %e, "webhook_send_error");
            ForwardError::Request(e)
        }
    }
}

/// Host part of `url` for logging.
fn target_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid>".to_string())
}
