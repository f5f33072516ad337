//! Configuration module.
//!
//! Relay settings are read once at startup from a JSON file and handed to the
//! handlers as an immutable value. Process-level settings (listen port, config
//! path, deployment environment) come from environment variables.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Config file used when `RELAY_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Log file used when `LOG_FILE` is not set.
pub const DEFAULT_LOG_FILE: &str = "webhook.log";

pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Recognized config file keys.
pub mod keys {
    pub const TEAMS_WORKFLOW_URL: &str = "TEAMS_WORKFLOW_URL";
    pub const TEAMS_OUTGOING_TOKEN: &str = "TEAMS_OUTGOING_TOKEN";
    pub const TEAMS_OUTGOING_TOKEN_ECHO: &str = "TEAMS_OUTGOING_TOKEN_ECHO";
    pub const FORWARD_URL: &str = "FORWARD_URL";
    pub const SKIP_VERIFICATION: &str = "SKIP_VERIFICATION";
    pub const LOG_ENABLED: &str = "LOG_ENABLED";
    pub const LOG_FILE: &str = "LOG_FILE";
    pub const FORWARD_TIMEOUT_MS: &str = "FORWARD_TIMEOUT_MS";
    pub const MAX_BODY_BYTES: &str = "MAX_BODY_BYTES";
    pub const ECHO_MODE: &str = "ECHO_MODE";
}

/// Errors raised while loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config is not a valid JSON object: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{key} has an unsupported value: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Deployment environment, taken from `RELAY_ENV`.
///
/// Anything other than an explicit development marker counts as production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Environment::Development,
            _ => Environment::Production,
        }
    }

    /// Whether `SKIP_VERIFICATION` may take effect.
    pub fn allows_verification_bypass(self) -> bool {
        self == Environment::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

/// Process settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Port for the web server to listen on
    pub port: u16,

    /// Path of the JSON config file
    pub config_path: PathBuf,

    /// Deployment environment
    pub environment: Environment,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        Settings {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            config_path: env::var("RELAY_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),

            environment: env::var("RELAY_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or_default(),
        }
    }
}

/// Which shared secret a route is verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSlot {
    /// `/teams/webhook`
    Forward,
    /// `/teams/echo`
    Echo,
}

impl SecretSlot {
    /// Config key holding the base64 secret for this slot.
    pub fn config_key(self) -> &'static str {
        match self {
            SecretSlot::Forward => keys::TEAMS_OUTGOING_TOKEN,
            SecretSlot::Echo => keys::TEAMS_OUTGOING_TOKEN_ECHO,
        }
    }
}

/// How `/teams/echo` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoMode {
    /// Post the payload unchanged to `TEAMS_WORKFLOW_URL`.
    #[default]
    Relay,
    /// Reply inline with the inbound `text` field.
    Reply,
}

/// Raw key/value view over the config file.
///
/// Lookups never fail: absent keys and values of the wrong shape resolve to
/// the caller's default.
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    values: Map<String, Value>,
}

impl ConfigValues {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Non-blank string value.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    /// Loose truthiness: `false`, `0`, `""`, `"0"` and `"false"` are off.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
            Some(Value::String(s)) => {
                let s = s.trim();
                !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
            }
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Null) => default,
        }
    }

    /// True only for `1`, `"1"` or `true`.
    pub fn is_one(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64() == Some(1.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok() == Some(1.0),
            _ => false,
        }
    }

    pub fn uint(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// Relay configuration.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug)]
pub struct Config {
    /// Target of the echo relay
    pub teams_workflow_url: Option<String>,

    /// Target of `/teams/webhook` forwarding
    pub forward_url: Option<String>,

    /// Base64 secret for `/teams/webhook`
    teams_outgoing_token: Option<SecretString>,

    /// Base64 secret for `/teams/echo`
    teams_outgoing_token_echo: Option<SecretString>,

    /// Raw `SKIP_VERIFICATION` flag; see [`Config::verification_bypass_active`]
    pub skip_verification: bool,

    /// Whether the file log is written
    pub log_enabled: bool,

    pub log_file: PathBuf,

    /// Deadline for outbound webhook requests
    pub forward_timeout: Duration,

    /// Largest accepted inbound body
    pub max_body_bytes: usize,

    pub echo_mode: EchoMode,

    pub environment: Environment,

    /// File the config was read from, `None` when it did not exist
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load the config file at `path`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is
    /// an error.
    pub fn load(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Self::from_values(ConfigValues::default(), environment);
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json_str(&raw, environment)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config from a JSON object document.
    pub fn from_json_str(raw: &str, environment: Environment) -> Result<Self, ConfigError> {
        let values: Map<String, Value> = serde_json::from_str(raw)?;
        Self::from_values(ConfigValues::new(values), environment)
    }

    pub fn from_values(values: ConfigValues, environment: Environment) -> Result<Self, ConfigError> {
        let teams_workflow_url = parse_url(&values, keys::TEAMS_WORKFLOW_URL)?;
        let forward_url = parse_url(&values, keys::FORWARD_URL)?;

        let echo_mode = match values.string(keys::ECHO_MODE) {
            None => EchoMode::default(),
            Some(raw) => serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
                .map_err(|_| ConfigError::InvalidValue {
                    key: keys::ECHO_MODE,
                    value: raw,
                })?,
        };

        Ok(Config {
            teams_workflow_url,
            forward_url,
            teams_outgoing_token: values
                .string(keys::TEAMS_OUTGOING_TOKEN)
                .map(SecretString::from),
            teams_outgoing_token_echo: values
                .string(keys::TEAMS_OUTGOING_TOKEN_ECHO)
                .map(SecretString::from),
            skip_verification: values.is_one(keys::SKIP_VERIFICATION),
            log_enabled: values.flag(keys::LOG_ENABLED, true),
            log_file: values
                .string(keys::LOG_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            forward_timeout: Duration::from_millis(
                values.uint(keys::FORWARD_TIMEOUT_MS, DEFAULT_FORWARD_TIMEOUT_MS),
            ),
            max_body_bytes: usize::try_from(
                values.uint(keys::MAX_BODY_BYTES, DEFAULT_MAX_BODY_BYTES),
            )
            .unwrap_or(usize::MAX),
            echo_mode,
            environment,
            source: None,
        })
    }

    /// Secret for the given slot, if configured.
    pub fn secret(&self, slot: SecretSlot) -> Option<&SecretString> {
        match slot {
            SecretSlot::Forward => self.teams_outgoing_token.as_ref(),
            SecretSlot::Echo => self.teams_outgoing_token_echo.as_ref(),
        }
    }

    /// Whether signature checks are skipped.
    ///
    /// Requires both `SKIP_VERIFICATION` and a development environment.
    pub fn verification_bypass_active(&self) -> bool {
        self.skip_verification && self.environment.allows_verification_bypass()
    }
}

fn parse_url(values: &ConfigValues, key: &'static str) -> Result<Option<String>, ConfigError> {
    match values.string(key) {
        None => Ok(None),
        Some(raw) => {
            url::Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key, source })?;
            Ok(Some(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn config(raw: &str) -> Config {
        Config::from_json_str(raw, Environment::Production).unwrap()
    }

    #[test]
    fn test_defaults_for_empty_object() {
        let config = config("{}");
        assert!(config.teams_workflow_url.is_none());
        assert!(config.forward_url.is_none());
        assert!(config.secret(SecretSlot::Forward).is_none());
        assert!(config.secret(SecretSlot::Echo).is_none());
        assert!(!config.skip_verification);
        assert!(config.log_enabled);
        assert_eq!(config.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(config.forward_timeout, Duration::from_millis(10_000));
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.echo_mode, EchoMode::Relay);
    }

    #[test]
    fn test_reads_recognized_keys() {
        let config = config(
            r#"{
                "TEAMS_WORKFLOW_URL": "https://workflow.example.com/hook",
                "TEAMS_OUTGOING_TOKEN": "c2VjcmV0",
                "TEAMS_OUTGOING_TOKEN_ECHO": "ZWNobw==",
                "FORWARD_URL": "https://forward.example.com/in",
                "LOG_ENABLED": false,
                "LOG_FILE": "/tmp/relay.log",
                "FORWARD_TIMEOUT_MS": 2500,
                "MAX_BODY_BYTES": "4096",
                "ECHO_MODE": "Reply"
            }"#,
        );

        assert_eq!(
            config.teams_workflow_url.as_deref(),
            Some("https://workflow.example.com/hook")
        );
        assert_eq!(
            config.forward_url.as_deref(),
            Some("https://forward.example.com/in")
        );
        assert_eq!(
            config.secret(SecretSlot::Forward).unwrap().expose_secret(),
            "c2VjcmV0"
        );
        assert_eq!(
            config.secret(SecretSlot::Echo).unwrap().expose_secret(),
            "ZWNobw=="
        );
        assert!(!config.log_enabled);
        assert_eq!(config.log_file, PathBuf::from("/tmp/relay.log"));
        assert_eq!(config.forward_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_body_bytes, 4096);
        assert_eq!(config.echo_mode, EchoMode::Reply);
    }

    #[test]
    fn test_blank_strings_are_absent() {
        let config = config(r#"{"FORWARD_URL": "  ", "TEAMS_OUTGOING_TOKEN": ""}"#);
        assert!(config.forward_url.is_none());
        assert!(config.secret(SecretSlot::Forward).is_none());
    }

    #[test]
    fn test_skip_verification_only_for_one() {
        for raw in [r#"1"#, r#""1""#, r#"true"#] {
            let config = config(&format!(r#"{{"SKIP_VERIFICATION": {raw}}}"#));
            assert!(config.skip_verification, "{raw} should enable the flag");
        }
        for raw in [r#"0"#, r#""yes""#, r#"false"#, r#"2"#, r#"null"#] {
            let config = config(&format!(r#"{{"SKIP_VERIFICATION": {raw}}}"#));
            assert!(!config.skip_verification, "{raw} should not enable the flag");
        }
    }

    #[test]
    fn test_bypass_requires_development() {
        let raw = r#"{"SKIP_VERIFICATION": 1}"#;
        let prod = Config::from_json_str(raw, Environment::Production).unwrap();
        assert!(!prod.verification_bypass_active());

        let dev = Config::from_json_str(raw, Environment::Development).unwrap();
        assert!(dev.verification_bypass_active());
    }

    #[test]
    fn test_log_enabled_truthiness() {
        assert!(!config(r#"{"LOG_ENABLED": 0}"#).log_enabled);
        assert!(!config(r#"{"LOG_ENABLED": "0"}"#).log_enabled);
        assert!(!config(r#"{"LOG_ENABLED": ""}"#).log_enabled);
        assert!(config(r#"{"LOG_ENABLED": "yes"}"#).log_enabled);
        assert!(config(r#"{"LOG_ENABLED": null}"#).log_enabled);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = Config::from_json_str(r#"{"FORWARD_URL": "not a url"}"#, Environment::Production)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { key: "FORWARD_URL", .. }));
    }

    #[test]
    fn test_invalid_echo_mode_rejected() {
        let err = Config::from_json_str(r#"{"ECHO_MODE": "shout"}"#, Environment::Production)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "ECHO_MODE", .. }));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(matches!(
            Config::from_json_str("[1, 2]", Environment::Production),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(
            Path::new("/nonexistent/teams-relay/config.json"),
            Environment::Production,
        )
        .unwrap();
        assert!(config.source.is_none());
        assert!(config.log_enabled);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = config(r#"{"TEAMS_OUTGOING_TOKEN": "c2VjcmV0"}"#);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse(" DEV "), Environment::Development);
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Production);
    }
}
