//! Charging engine service orchestrator.
//!
//! # Architecture Overview
//!
//! ```text
//!   engine.toml ──▶ ConfigStore ──(changed sections)──▶ ReloadRegistry
//!        ▲              │                                     │
//!   watcher / SIGHUP    │                        one listener per section
//!                       ▼                                     ▼
//!               ┌─────────────────────── ServiceManager ──────────────────┐
//!               │                                                          │
//!               │   DataDbService ──DataDbHandle──▶ AttributeService       │
//!               │        │                   └───▶ LoaderService          │
//!               │        ▼                          AnalyzerService        │
//!               │   Connector / DataStore                                  │
//!               │                                                          │
//!               │   DependencyGates: "DataDB", precache partitions, ...    │
//!               └──────────────────────────────────────────────────────────┘
//!                                       ▲
//!                     SIGINT / SIGTERM ─┘ ShutdownSignal
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;

use charging_engine::config::{load_config, ConfigStore, ConfigWatcher};
use charging_engine::lifecycle::signals::spawn_signal_handler;
use charging_engine::lifecycle::{Engine, ReloadRegistry};
use charging_engine::observability::{logging, metrics};
use charging_engine::services::partitions;
use charging_engine::storage::MemoryConnector;

#[derive(Parser, Debug)]
#[command(name = "charging-engine", version, about = "Charging engine service orchestrator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/charging-engine/engine.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,

    /// Override observability.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Do not watch the configuration file for changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    if cli.check_config {
        println!("{}: configuration is valid", cli.config.display());
        return Ok(());
    }

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    logging::init_logging(&level)?;

    tracing::info!(
        node_id = %config.general.node_id,
        config = ?cli.config,
        "charging-engine v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = ConfigStore::new(config, ReloadRegistry::new());
    let engine = Engine::new(store.clone(), Arc::new(MemoryConnector::new()))?;

    // The in-process store has nothing to precache.
    engine.mark_precached(partitions::ATTRIBUTE_PROFILES);
    engine.mark_precached(partitions::ATTRIBUTE_FILTER_INDEXES);

    let _watcher = if cli.no_watch {
        None
    } else {
        match ConfigWatcher::new(&cli.config, store.clone()).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, reload with SIGHUP");
                None
            }
        }
    };
    let signals = spawn_signal_handler(engine.shutdown_signal(), store, cli.config.clone());

    let result = engine.run().await;
    signals.abort();
    result?;
    Ok(())
}
