//! Waqu relay server.
//!
//! This binary:
//! - Loads configuration from the environment
//! - Connects to the configured queue backend and checks the destination exists
//! - Serves `POST /waqu`, acknowledging each webhook only after it is enqueued
//!
//! Any startup failure exits non-zero before the listener is bound.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waqu::web::{router, AppState};
use waqu::{queue, Config, Enqueuer, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("waqu_starting");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(reason = %e, "config_invalid");
            return Err(e).context("Failed to read configuration from environment");
        }
    };
    info!(
        port = config.port,
        ignore_status = config.ignore_status,
        backend = config.backend.kind(),
        "config_loaded"
    );

    let enqueuer = match queue::connect(&config.backend).await {
        Ok(enqueuer) => enqueuer,
        Err(e) => {
            error!(reason = %e, backend = config.backend.kind(), "queue_backend_unavailable");
            return Err(e).context("Failed to connect to queue backend");
        }
    };

    let state = AppState::new(Relay::new(&config, enqueuer.clone()));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "waqu_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    enqueuer.close().await;

    info!("waqu_shutdown_complete");

    Ok(())
}

/// Completes on the first SIGINT or SIGTERM.
///
/// A listener that cannot be installed is logged and never fires; the other
/// one still stops the relay.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(reason = %e, "sigint_listener_unavailable");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(reason = %e, "sigterm_listener_unavailable");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };

    info!(signal = received, "waqu_draining");
}
