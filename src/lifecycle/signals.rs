//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT/SIGTERM close the process-wide shutdown signal
//! - SIGHUP reloads the configuration file
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A repeated SIGTERM/SIGINT is harmless: the shutdown signal closes once
//! - SIGHUP triggers config reload, not shutdown

use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::lifecycle::shutdown::ShutdownSignal;

/// Spawn the signal handling task. It exits once shutdown has fired.
pub fn spawn_signal_handler(
    shutdown: ShutdownSignal,
    store: ConfigStore,
    config_path: PathBuf,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle_signals(&shutdown, &store, &config_path).await {
            tracing::error!(error = %e, "Signal handling failed, shutting down");
            shutdown.close_once();
        }
    })
}

#[cfg(unix)]
async fn handle_signals(
    shutdown: &ShutdownSignal,
    store: &ConfigStore,
    config_path: &std::path::Path,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("SIGINT received, shutting down");
                shutdown.close_once();
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                shutdown.close_once();
            }
            _ = hangup.recv() => {
                tracing::info!(path = ?config_path, "SIGHUP received, reloading configuration");
                match store.reload_from_path(config_path) {
                    Ok(changed) => tracing::info!(sections = ?changed, "Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Configuration reload failed, keeping current configuration"),
                }
            }
            _ = shutdown.done() => return Ok(()),
        }
    }
}

#[cfg(not(unix))]
async fn handle_signals(
    shutdown: &ShutdownSignal,
    _store: &ConfigStore,
    _config_path: &std::path::Path,
) -> std::io::Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Ctrl-C received, shutting down");
            shutdown.close_once();
        }
        _ = shutdown.done() => {}
    }
    Ok(())
}
