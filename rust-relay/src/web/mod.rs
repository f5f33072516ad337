//! Web server module for the Teams endpoints.
//!
//! Routes:
//! - `POST /teams/webhook`: verify, then forward to `FORWARD_URL`
//! - `POST /teams/echo`: verify, then echo the message
//! - `GET /teams/health`: unauthenticated status
//!
//! Trailing slashes are stripped before routing.

pub mod handlers;
pub mod response;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{normalize_path::NormalizePath, trace::TraceLayer};

pub use handlers::{
    health, health_method_not_allowed, not_found, post_only, teams_echo, teams_webhook, AppState,
    HealthResponse, FORWARD_SUCCESS_TEXT, HMAC_FAILURE_TEXT,
};
pub use response::{MessageReply, RelayError};
pub use signature::{
    compute_signature, parse_authorization, verify_request, verify_signature, AuthScheme,
    RejectReason, Verification,
};

/// Build the route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/teams/webhook", post(teams_webhook).fallback(post_only))
        .route("/teams/echo", post(teams_echo).fallback(post_only))
        .route(
            "/teams/health",
            get(health).fallback(health_method_not_allowed),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The full service: [`router`] behind trailing-slash normalization.
pub fn app(state: AppState) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(router(state))
}
