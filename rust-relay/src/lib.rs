//! Teams Relay - signed outgoing-webhook receiver.
//!
//! Receives Microsoft Teams outgoing-webhook callbacks, verifies their
//! HMAC-SHA256 signature, and either echoes the message or forwards it to
//! another webhook endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Teams → /teams/webhook → verify → FORWARD_URL
//! Teams → /teams/echo    → verify → TEAMS_WORKFLOW_URL (or inline reply)
//! ```

pub mod config;
pub mod forward;
pub mod logging;
pub mod web;

// Re-export commonly used types
pub use config::{Config, Environment, SecretSlot, Settings};
pub use forward::{ForwardError, Forwarder};
pub use web::{app, router, AppState};
