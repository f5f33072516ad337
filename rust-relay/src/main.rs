//! Teams Relay web server.
//!
//! This binary:
//! - Loads the JSON config once at startup
//! - Receives Teams outgoing-webhook callbacks
//! - Verifies their HMAC signature
//! - Forwards or echoes the message downstream

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{extract::Request, ServiceExt};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use teams_relay::config::keys;
use teams_relay::{app, logging, AppState, Config, Forwarder, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env();

    let config = Config::load(&settings.config_path, settings.environment)
        .with_context(|| format!("Failed to load config {}", settings.config_path.display()))?;

    // Held until shutdown so buffered file log lines are flushed
    let _log_guard = logging::init(&config)?;

    info!("web_server_starting");

    if config.source.is_none() {
        warn!(path = %settings.config_path.display(), "config_file_missing_using_defaults");
    }

    if config.skip_verification && !config.verification_bypass_active() {
        warn!(
            key = keys::SKIP_VERIFICATION,
            environment = config.environment.as_str(),
            "verification_bypass_ignored_outside_development"
        );
    } else if config.verification_bypass_active() {
        warn!(
            key = keys::SKIP_VERIFICATION,
            "verification_bypass_enabled_signatures_not_checked"
        );
    }

    info!(
        port = settings.port,
        environment = config.environment.as_str(),
        forward_url_configured = config.forward_url.is_some(),
        teams_workflow_url_configured = config.teams_workflow_url.is_some(),
        echo_mode = ?config.echo_mode,
        forward_timeout_ms = config.forward_timeout.as_millis() as u64,
        log_enabled = config.log_enabled,
        "config_loaded"
    );

    let forwarder =
        Forwarder::new(config.forward_timeout).context("Failed to build HTTP client")?;
    let state = AppState::new(config, forwarder);

    let app = app(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_install_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_install_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
