//! Teams outgoing-webhook signature verification.
//!
//! Teams signs each request with HMAC-SHA256 over the raw request body, keyed
//! by the base64-decoded security token shown when the outgoing webhook was
//! created. The digest is base64 encoded and sent as `Authorization: HMAC <digest>`.
//! `Bearer <digest>` is accepted as well.
//!
//! The body must be the exact bytes received; re-serialized JSON will not
//! match.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::{Config, SecretSlot};

type HmacSha256 = Hmac<Sha256>;

/// Authorization header scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Hmac,
}

impl AuthScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthScheme::Bearer => "bearer",
            AuthScheme::Hmac => "hmac",
        }
    }
}

/// Why a request failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Secret absent, empty, or not valid base64.
    SecretNotConfigured,
    MissingHeader,
    UnrecognizedScheme,
    SignatureMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::SecretNotConfigured => "secret not configured",
            RejectReason::MissingHeader => "missing header",
            RejectReason::UnrecognizedScheme => "unrecognized scheme",
            RejectReason::SignatureMismatch => "signature mismatch",
        };
        f.write_str(reason)
    }
}

/// Outcome of verifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// `scheme` is `None` when the debug bypass let the request through.
    Verified { scheme: Option<AuthScheme> },
    Rejected(RejectReason),
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified { .. })
    }
}

/// Split an `Authorization` header into scheme and token.
///
/// Returns `None` for anything other than `Bearer <token>` or
/// `HMAC <token>` with a non-empty token.
pub fn parse_authorization(header: &str) -> Option<(AuthScheme, &str)> {
    let (scheme, token) = if let Some(token) = header.strip_prefix("Bearer ") {
        (AuthScheme::Bearer, token)
    } else if let Some(token) = header.strip_prefix("HMAC ") {
        (AuthScheme::Hmac, token)
    } else {
        return None;
    };

    if token.is_empty() {
        return None;
    }
    Some((scheme, token))
}

/// Base64 HMAC-SHA256 of `body` keyed by the raw `secret` bytes.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify `body` against a base64-encoded shared secret.
///
/// This is the pure check without the configuration lookup or the debug
/// bypass.
pub fn verify_signature(secret_b64: &str, body: &[u8], auth_header: &str) -> Verification {
    if secret_b64.trim().is_empty() {
        return Verification::Rejected(RejectReason::SecretNotConfigured);
    }

    if auth_header.is_empty() {
        return Verification::Rejected(RejectReason::MissingHeader);
    }

    let Some((scheme, provided)) = parse_authorization(auth_header) else {
        return Verification::Rejected(RejectReason::UnrecognizedScheme);
    };

    let secret = match BASE64.decode(secret_b64.trim()) {
        Ok(secret) => secret,
        Err(_) => return Verification::Rejected(RejectReason::SecretNotConfigured),
    };

    let expected = compute_signature(&secret, body);

    // Constant-time comparison to prevent timing attacks
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Verification::Verified {
            scheme: Some(scheme),
        }
    } else {
        Verification::Rejected(RejectReason::SignatureMismatch)
    }
}

/// Verify an inbound request against the secret configured for `slot`.
pub fn verify_request(
    config: &Config,
    slot: SecretSlot,
    body: &[u8],
    auth_header: Option<&str>,
) -> Verification {
    if config.verification_bypass_active() {
        debug!(
            secret_key = slot.config_key(),
            "signature_verification_skipped_debug_mode"
        );
        return Verification::Verified { scheme: None };
    }

    let Some(secret) = config.secret(slot) else {
        warn!(secret_key = slot.config_key(), "signature_secret_not_configured");
        return Verification::Rejected(RejectReason::SecretNotConfigured);
    };

    let auth_header = auth_header.unwrap_or_default();
    let outcome = verify_signature(secret.expose_secret(), body, auth_header);

    match outcome {
        Verification::Verified { scheme } => {
            debug!(
                secret_key = slot.config_key(),
                scheme = scheme.map(AuthScheme::as_str),
                body_length = body.len(),
                "signature_verified"
            );
        }
        Verification::Rejected(reason) => {
            warn!(
                secret_key = slot.config_key(),
                reason = %reason,
                has_auth_header = !auth_header.is_empty(),
                body_length = body.len(),
                "signature_rejected"
            );
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    // base64("secret")
    const SECRET_B64: &str = "c2VjcmV0";

    fn sign(body: &[u8]) -> String {
        compute_signature(b"secret", body)
    }

    fn config_with(raw: &str, environment: Environment) -> Config {
        Config::from_json_str(raw, environment).unwrap()
    }

    #[test]
    fn test_compute_signature_matches_reference() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(br#"{"a":1}"#);
        let expected = BASE64.encode(mac.finalize().into_bytes());

        assert_eq!(sign(br#"{"a":1}"#), expected);
    }

    #[test]
    fn test_verify_hmac_header() {
        let body = br#"{"a":1}"#;
        let header = format!("HMAC {}", sign(body));
        assert_eq!(
            verify_signature(SECRET_B64, body, &header),
            Verification::Verified {
                scheme: Some(AuthScheme::Hmac)
            }
        );
    }

    #[test]
    fn test_verify_bearer_header() {
        let body = br#"{"text":"hello"}"#;
        let header = format!("Bearer {}", sign(body));
        assert_eq!(
            verify_signature(SECRET_B64, body, &header),
            Verification::Verified {
                scheme: Some(AuthScheme::Bearer)
            }
        );
    }

    #[test]
    fn test_body_bytes_are_significant() {
        let header = format!("HMAC {}", sign(br#"{"a":1}"#));
        assert_eq!(
            verify_signature(SECRET_B64, br#"{"a": 1}"#, &header),
            Verification::Rejected(RejectReason::SignatureMismatch)
        );
    }

    #[test]
    fn test_any_flipped_byte_rejected() {
        let body = br#"{"type":"message","text":"ping"}"#;
        let token = sign(body);

        for i in 0..token.len() {
            let mut flipped = token.clone().into_bytes();
            flipped[i] ^= 0x01;
            let flipped = String::from_utf8_lossy(&flipped).into_owned();
            let header = format!("HMAC {flipped}");
            assert!(
                !verify_signature(SECRET_B64, body, &header).is_verified(),
                "flipping byte {i} should reject"
            );
        }
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            verify_signature(SECRET_B64, b"{}", ""),
            Verification::Rejected(RejectReason::MissingHeader)
        );
    }

    #[test]
    fn test_unrecognized_scheme() {
        let token = sign(b"{}");
        for header in [
            format!("Basic {token}"),
            format!("hmac {token}"),
            token.clone(),
            "HMAC ".to_string(),
            "Bearer ".to_string(),
        ] {
            assert_eq!(
                verify_signature(SECRET_B64, b"{}", &header),
                Verification::Rejected(RejectReason::UnrecognizedScheme),
                "{header:?}"
            );
        }
    }

    #[test]
    fn test_secret_not_configured() {
        assert_eq!(
            verify_signature("", b"{}", "HMAC abc"),
            Verification::Rejected(RejectReason::SecretNotConfigured)
        );
    }

    #[test]
    fn test_undecodable_secret_treated_as_not_configured() {
        assert_eq!(
            verify_signature("not base64!!", b"{}", "HMAC abc"),
            Verification::Rejected(RejectReason::SecretNotConfigured)
        );
    }

    #[test]
    fn test_parse_authorization() {
        assert_eq!(
            parse_authorization("HMAC abc="),
            Some((AuthScheme::Hmac, "abc="))
        );
        assert_eq!(
            parse_authorization("Bearer xyz"),
            Some((AuthScheme::Bearer, "xyz"))
        );
        assert_eq!(parse_authorization("Token xyz"), None);
        assert_eq!(parse_authorization("HMAC"), None);
    }

    #[test]
    fn test_verify_request_uses_slot_secret() {
        let config = config_with(
            r#"{"TEAMS_OUTGOING_TOKEN": "c2VjcmV0", "TEAMS_OUTGOING_TOKEN_ECHO": "ZWNobw=="}"#,
            Environment::Production,
        );
        let body = br#"{"a":1}"#;
        let header = format!("HMAC {}", sign(body));

        assert!(verify_request(&config, SecretSlot::Forward, body, Some(&header)).is_verified());
        assert_eq!(
            verify_request(&config, SecretSlot::Echo, body, Some(&header)),
            Verification::Rejected(RejectReason::SignatureMismatch)
        );
    }

    #[test]
    fn test_verify_request_without_secret() {
        let config = config_with("{}", Environment::Production);
        assert_eq!(
            verify_request(&config, SecretSlot::Echo, b"{}", Some("HMAC abc")),
            Verification::Rejected(RejectReason::SecretNotConfigured)
        );
    }

    #[test]
    fn test_verify_request_missing_header() {
        let config = config_with(r#"{"TEAMS_OUTGOING_TOKEN": "c2VjcmV0"}"#, Environment::Production);
        assert_eq!(
            verify_request(&config, SecretSlot::Forward, b"{}", None),
            Verification::Rejected(RejectReason::MissingHeader)
        );
    }

    #[test]
    fn test_skip_verification_in_development() {
        let config = config_with(r#"{"SKIP_VERIFICATION": 1}"#, Environment::Development);
        for header in [None, Some(""), Some("garbage"), Some("HMAC wrong")] {
            assert_eq!(
                verify_request(&config, SecretSlot::Forward, b"{}", header),
                Verification::Verified { scheme: None }
            );
        }
    }

    #[test]
    fn test_skip_verification_ignored_in_production() {
        let config = config_with(
            r#"{"SKIP_VERIFICATION": 1, "TEAMS_OUTGOING_TOKEN": "c2VjcmV0"}"#,
            Environment::Production,
        );
        assert_eq!(
            verify_request(&config, SecretSlot::Forward, b"{}", Some("HMAC wrong")),
            Verification::Rejected(RejectReason::SignatureMismatch)
        );
    }
}
