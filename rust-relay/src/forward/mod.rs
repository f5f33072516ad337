//! Outbound webhook delivery.
//!
//! The relay posts JSON to two downstream endpoints:
//!
//! ```text
//! /teams/webhook → FORWARD_URL
//! /teams/echo    → TEAMS_WORKFLOW_URL
//! ```
//!
//! Failures are returned as values; the caller picks the HTTP status.

pub mod forwarder;

pub use forwarder::{ForwardError, Forwarder};
