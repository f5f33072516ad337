//! Teams endpoint handlers.
//!
//! POST routes run the same short-circuiting checks in order:
//! 1. Target URL configured (before the body is read)
//! 2. Body non-empty
//! 3. Signature valid
//! 4. Body is JSON
//! 5. Downstream delivery succeeds
//!
//! The first failing check produces the response.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::{keys, Config, EchoMode, Environment, SecretSlot};
use crate::forward::Forwarder;
use crate::web::response::{json_response, MessageReply, RelayError, StatusBody};
use crate::web::signature::{verify_request, Verification};

/// Reply text after a successful forward.
pub const FORWARD_SUCCESS_TEXT: &str = "Webhook受信・転送に成功しました";

/// Reply text in echo reply mode when the signature check fails.
pub const HMAC_FAILURE_TEXT: &str = "HMAC認証に失敗しました";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: Config, forwarder: Forwarder) -> Self {
        Self {
            config: Arc::new(config),
            forwarder,
        }
    }
}

// =============================================================================
// Shared checks
// =============================================================================

fn auth_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Read the raw body, rejecting empty or oversized payloads.
async fn read_body(route: &'static str, body: Body, limit: usize) -> Result<Bytes, RelayError> {
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let too_large = e
                .into_inner()
                .is::<http_body_util::LengthLimitError>();
            if too_large {
                warn!(route = route, limit = limit, "request_body_too_large");
                return Err(RelayError::BodyTooLarge(limit));
            }
            warn!(route = route, "request_body_read_failed");
            return Err(RelayError::BodyRead);
        }
    };

    if bytes.is_empty() {
        warn!(route = route, "request_body_empty");
        return Err(RelayError::EmptyBody);
    }

    Ok(bytes)
}

fn parse_json(route: &'static str, body: &[u8]) -> Result<Value, RelayError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(route = route, error = %e, "request_json_invalid");
        RelayError::MalformedJson(e)
    })
}

/// Read the body and verify its signature.
async fn read_signed_body(
    route: &'static str,
    state: &AppState,
    slot: SecretSlot,
    headers: &HeaderMap,
    body: Body,
) -> Result<Bytes, RelayError> {
    let bytes = read_body(route, body, state.config.max_body_bytes).await?;

    info!(
        route = route,
        body_length = bytes.len(),
        has_auth_header = auth_header(headers).is_some(),
        "teams_request_received"
    );

    match verify_request(&state.config, slot, &bytes, auth_header(headers)) {
        Verification::Verified { .. } => Ok(bytes),
        Verification::Rejected(reason) => {
            error!(route = route, reason = %reason, "teams_signature_invalid");
            Err(RelayError::InvalidSignature)
        }
    }
}

// =============================================================================
// Forward
// =============================================================================

/// `POST /teams/webhook`: forward the verified payload to `FORWARD_URL`.
pub async fn teams_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, RelayError> {
    const ROUTE: &str = "webhook";

    let Some(url) = state.config.forward_url.clone() else {
        error!(key = keys::FORWARD_URL, "forward_url_not_configured");
        return Err(RelayError::ConfigMissing("Forward URL"));
    };

    let bytes = read_signed_body(ROUTE, &state, SecretSlot::Forward, &headers, body).await?;
    let payload = parse_json(ROUTE, &bytes)?;

    if let Err(e) = state.forwarder.forward_json(&url, &payload).await {
        error!(error = %e, "webhook_forward_failed");
        return Err(RelayError::Downstream {
            action: "forward",
            detail: e.to_string(),
        });
    }

    info!(body_length = bytes.len(), "webhook_forwarded");

    Ok(json_response(StatusCode::OK, MessageReply::new(FORWARD_SUCCESS_TEXT)))
}

// =============================================================================
// Echo
// =============================================================================

/// `POST /teams/echo`: send the message back to the channel.
///
/// In relay mode the unchanged payload is posted to `TEAMS_WORKFLOW_URL`.
/// In reply mode the inbound `text` is returned directly as the webhook
/// reply, and a failed signature check is answered with a 200 notice.
pub async fn teams_echo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, RelayError> {
    match state.config.echo_mode {
        EchoMode::Relay => echo_relay(&state, &headers, body).await,
        EchoMode::Reply => echo_reply(&state, &headers, body).await,
    }
}

async fn echo_relay(state: &AppState, headers: &HeaderMap, body: Body) -> Result<Response, RelayError> {
    const ROUTE: &str = "echo";

    let Some(url) = state.config.teams_workflow_url.clone() else {
        error!(key = keys::TEAMS_WORKFLOW_URL, "teams_workflow_url_not_configured");
        return Err(RelayError::ConfigMissing("Teams Workflow URL"));
    };

    let bytes = read_signed_body(ROUTE, state, SecretSlot::Echo, headers, body).await?;
    parse_json(ROUTE, &bytes)?;

    // Bytes are sent as received
    if let Err(e) = state.forwarder.post_raw(&url, bytes.clone()).await {
        error!(error = %e, "echo_send_failed");
        return Err(RelayError::Downstream {
            action: "echo",
            detail: e.to_string(),
        });
    }

    info!(body_length = bytes.len(), "echo_relayed");

    Ok(json_response(
        StatusCode::OK,
        StatusBody {
            status: "success",
            message: "Webhook echoed successfully",
        },
    ))
}

async fn echo_reply(state: &AppState, headers: &HeaderMap, body: Body) -> Result<Response, RelayError> {
    const ROUTE: &str = "echo";

    let bytes = match read_signed_body(ROUTE, state, SecretSlot::Echo, headers, body).await {
        Ok(bytes) => bytes,
        Err(RelayError::InvalidSignature) => {
            return Ok(json_response(StatusCode::OK, MessageReply::new(HMAC_FAILURE_TEXT)));
        }
        Err(e) => return Err(e),
    };

    let payload = parse_json(ROUTE, &bytes)?;
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    info!(text_length = text.len(), "echo_replied");

    Ok(json_response(StatusCode::OK, MessageReply::new(text)))
}

// =============================================================================
// Health Check
// =============================================================================

/// Which settings are present.
#[derive(Debug, Serialize)]
pub struct ConfigStatus {
    pub teams_workflow_url: bool,
    pub teams_outgoing_token: bool,
    pub teams_outgoing_token_echo: bool,
    pub forward_url: bool,
    pub skip_verification: bool,
    pub verification_bypass_active: bool,
}

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub version: &'static str,
    pub server_software: &'static str,
    pub server_time: String,
    pub timezone: String,
    pub environment: Environment,
    pub config_file_exists: bool,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub config_status: ConfigStatus,
    pub server_info: ServerInfo,
}

/// `GET /teams/health`. Never authenticated.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = &state.config;
    let now = chrono::Local::now();

    Json(HealthResponse {
        status: "ok",
        message: "Service is running",
        config_status: ConfigStatus {
            teams_workflow_url: config.teams_workflow_url.is_some(),
            teams_outgoing_token: config.secret(SecretSlot::Forward).is_some(),
            teams_outgoing_token_echo: config.secret(SecretSlot::Echo).is_some(),
            forward_url: config.forward_url.is_some(),
            skip_verification: config.skip_verification,
            verification_bypass_active: config.verification_bypass_active(),
        },
        server_info: ServerInfo {
            version: env!("CARGO_PKG_VERSION"),
            server_software: concat!("teams-relay/", env!("CARGO_PKG_VERSION")),
            server_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            timezone: now.format("%:z").to_string(),
            environment: config.environment,
            config_file_exists: config.source.as_ref().is_some_and(|p| p.exists()),
        },
    })
}

// =============================================================================
// Fallbacks
// =============================================================================

/// Non-POST request on a POST route.
pub async fn post_only() -> RelayError {
    warn!("teams_method_not_allowed");
    RelayError::PostOnly
}

/// Non-GET request on the health route.
pub async fn health_method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "GET")],
        "Method Not Allowed",
    )
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
