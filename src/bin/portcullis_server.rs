//! Demo server for the portcullis auth routes
//!
//! Configuration comes from the environment (see [`portcullis::AuthConfig::from_env`]),
//! plus:
//!
//! - `BIND_ADDR`: listen address (default: "127.0.0.1:3000")
//! - `SESSION_SWEEP_INTERVAL`: how often expired sessions and stale login
//!   attempt records are purged (default: "5m")
//!
//! Any configuration error aborts startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use portcullis::http::{router, AppState};
use portcullis::login::spawn_lockout_sweeper;
use portcullis::observability::{self, ObservabilityConfig, SecurityEvent};
use portcullis::session::spawn_session_sweeper;
use portcullis::{parse_duration, AuthConfig, AuthService, OriginPolicy, SecureAuthRouter};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    observability::init(ObservabilityConfig::from_env()).context("initializing logging")?;

    let config = AuthConfig::from_env().context("loading configuration")?;
    config.validate().context("invalid configuration")?;

    let policy = Arc::new(OriginPolicy::from_config(&config)?);
    let auth = Arc::new(AuthService::in_memory(&config)?);

    let sweep_interval = match std::env::var("SESSION_SWEEP_INTERVAL") {
        Ok(v) => parse_duration(&v)
            .filter(|d| !d.is_zero())
            .with_context(|| format!("invalid SESSION_SWEEP_INTERVAL {:?}", v))?,
        Err(_) => DEFAULT_SWEEP_INTERVAL,
    };
    let mut sweepers = vec![spawn_session_sweeper(auth.sessions(), sweep_interval)];
    if let Some(tracker) = auth.login_tracker() {
        sweepers.push(spawn_lockout_sweeper(tracker.clone(), sweep_interval));
    }

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .context("invalid BIND_ADDR")?;

    let app = router(AppState::new(auth, config.cookie.clone())).with_auth_layers(&config, policy);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    portcullis::security_event!(
        SecurityEvent::SystemStartup,
        addr = %addr,
        origins = ?config.cors_origins,
        credentialed = config.cors_allow_credentials,
        session_ttl_secs = config.session_ttl.as_secs(),
        lockout = config.lockout.is_some(),
        "Auth server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for sweeper in sweepers {
        sweeper.abort();
    }
    portcullis::security_event!(SecurityEvent::SystemShutdown, "Auth server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
