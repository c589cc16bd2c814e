//! Engine assembly and run loop.
//!
//! # Responsibilities
//! - Build the shared primitives (shutdown signal, gates) and every service
//! - Register the services with one `ServiceManager`
//! - Run until shutdown, then wait for the services to stop
//!
//! # Design Decisions
//! - Startup failures are reported together and logged; the engine keeps
//!   running whatever did start, and a failed service can still come up on a
//!   later reload
//! - Precache readiness is announced from outside through `mark_precached`

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigStore;
use crate::lifecycle::gate::DependencyGates;
use crate::lifecycle::manager::{ManagerError, ServiceManager, StartupError};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::services::{AnalyzerService, AttributeService, DataDbService, LoaderService, Service};
use crate::storage::Connector;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("services still running {0:?} after shutdown")]
    ShutdownTimeout(Duration),
}

/// The assembled engine: configuration, primitives and services.
pub struct Engine {
    config: ConfigStore,
    shutdown: ShutdownSignal,
    gates: DependencyGates,
    manager: Arc<ServiceManager>,
    data_db: Arc<DataDbService>,
    attributes: Arc<AttributeService>,
    loaders: Arc<LoaderService>,
    analyzer: Arc<AnalyzerService>,
}

impl Engine {
    pub fn new(config: ConfigStore, connector: Arc<dyn Connector>) -> Result<Self, ManagerError> {
        let shutdown = ShutdownSignal::new();
        let gates = DependencyGates::new();
        let manager = Arc::new(ServiceManager::new(config.clone(), shutdown.clone()));

        let data_db = Arc::new(DataDbService::new(
            config.clone(),
            connector,
            gates.clone(),
            shutdown.clone(),
        ));
        let attributes = Arc::new(AttributeService::new(
            config.clone(),
            gates.clone(),
            shutdown.clone(),
            data_db.handle(),
        ));
        let loaders = Arc::new(LoaderService::new(
            config.clone(),
            gates.clone(),
            shutdown.clone(),
            data_db.handle(),
        ));
        let analyzer = Arc::new(AnalyzerService::new(config.clone(), gates.clone(), shutdown.clone()));

        manager.add_services(vec![
            Arc::clone(&data_db) as Arc<dyn Service>,
            Arc::clone(&attributes) as Arc<dyn Service>,
            Arc::clone(&loaders) as Arc<dyn Service>,
            Arc::clone(&analyzer) as Arc<dyn Service>,
        ])?;

        Ok(Self {
            config,
            shutdown,
            gates,
            manager,
            data_db,
            attributes,
            loaders,
            analyzer,
        })
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn gates(&self) -> &DependencyGates {
        &self.gates
    }

    pub fn manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    pub fn data_db(&self) -> &Arc<DataDbService> {
        &self.data_db
    }

    pub fn attributes(&self) -> &Arc<AttributeService> {
        &self.attributes
    }

    pub fn loaders(&self) -> &Arc<LoaderService> {
        &self.loaders
    }

    pub fn analyzer(&self) -> &Arc<AnalyzerService> {
        &self.analyzer
    }

    /// Announce that a cache partition finished precaching.
    pub fn mark_precached(&self, partition: &str) {
        tracing::debug!(partition = %partition, "Cache partition precached");
        self.gates.open(partition);
    }

    /// Start every wanted service.
    pub async fn start(&self) -> Result<(), StartupError> {
        self.manager.start_services().await
    }

    /// Start, block until shutdown fires, then wait for every service to stop.
    ///
    /// A service that fails to start stays down without stopping its siblings.
    pub async fn run(&self) -> Result<(), EngineError> {
        match self.start().await {
            Ok(()) => {}
            Err(e @ StartupError::Failed(_)) => {
                tracing::error!(error = %e, "Engine running with failed services");
            }
            Err(e) => tracing::warn!(error = %e, "Engine start skipped"),
        }

        self.shutdown.done().await;
        let timeout = self.shutdown_timeout();
        tracing::info!(timeout = ?timeout, "Shutdown started, stopping services");
        if tokio::time::timeout(timeout, self.manager.wait_stopped()).await.is_err() {
            tracing::error!(timeout = ?timeout, "Services did not stop in time");
            return Err(EngineError::ShutdownTimeout(timeout));
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }

    fn shutdown_timeout(&self) -> Duration {
        match self.config.current().general.shutdown_timeout() {
            Ok(timeout) => timeout,
            Err(e) => {
                tracing::warn!(error = %e, default = ?DEFAULT_SHUTDOWN_TIMEOUT, "Invalid shutdown_timeout, using default");
                DEFAULT_SHUTDOWN_TIMEOUT
            }
        }
    }
}
