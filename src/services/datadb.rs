//! Data store service with connection hot swap.
//!
//! # Responsibilities
//! - Open the configured data store and publish it through [`DataDbHandle`]
//! - On reload, replace the connection without interrupting readers
//! - Open and re-arm the `DataDB` gate as the connection comes and goes
//!
//! # Design Decisions
//! - The published connection lives in an `ArcSwapOption`; readers load it
//!   lock-free and keep whatever `Arc` they loaded for the rest of a call
//! - A reload builds and validates the new connection before the swap, so a
//!   failed reload leaves the old connection published and the service running
//! - The old connection is closed only after the swap
//! - Reloading with unchanged effective parameters is a no-op

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{sections, ConfigStore};
use crate::lifecycle::gate::DependencyGates;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics::{self, ReloadOutcome};
use crate::services::{names, Service, ServiceError};
use crate::storage::{ConnectParams, Connection, Connector, StoreError};

/// Lifecycle phase of the data store service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Reloading,
}

/// Stable accessor to the current data store connection.
///
/// Cloned into every consumer. Always yields the connection published last,
/// or `None` while the service is stopped.
#[derive(Clone, Default)]
pub struct DataDbHandle {
    current: Arc<ArcSwapOption<Connection>>,
}

impl DataDbHandle {
    pub fn get_connection(&self) -> Option<Arc<Connection>> {
        self.current.load_full()
    }

    /// Whether a connection is currently published.
    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    fn publish(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        self.current.swap(Some(connection))
    }

    fn clear(&self) -> Option<Arc<Connection>> {
        self.current.swap(None)
    }
}

impl fmt::Debug for DataDbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataDbHandle")
            .field("current", &self.current.load().as_ref().map(|c| c.id()))
            .finish()
    }
}

/// Owner of the engine's data store connection.
pub struct DataDbService {
    config: ConfigStore,
    connector: Arc<dyn Connector>,
    gates: DependencyGates,
    shutdown: ShutdownSignal,
    handle: DataDbHandle,
    /// Serializes start/reload/shutdown; holds the parameters of the
    /// published connection while running.
    applied: Mutex<Option<ConnectParams>>,
    phase: RwLock<Phase>,
}

impl DataDbService {
    pub fn new(
        config: ConfigStore,
        connector: Arc<dyn Connector>,
        gates: DependencyGates,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            connector,
            gates,
            shutdown,
            handle: DataDbHandle::default(),
            applied: Mutex::new(None),
            phase: RwLock::new(Phase::Stopped),
        }
    }

    /// Accessor to hand to consumers.
    pub fn handle(&self) -> DataDbHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove every item under `prefix` from the current store.
    pub async fn flush(&self, prefix: &str) -> Result<(), ServiceError> {
        let connection = self.handle.get_connection().ok_or_else(|| ServiceError::NotRunning(
            names::DATA_DB.to_string(),
        ))?;
        connection.store().flush(prefix).await?;
        tracing::info!(connection = %connection.id(), prefix = %prefix, "Data store flushed");
        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn current_params(&self) -> Result<ConnectParams, StoreError> {
        ConnectParams::from_config(&self.config.current().data_db)
    }

    async fn close(connection: Arc<Connection>) {
        match connection.store().close().await {
            Ok(()) => tracing::info!(
                connection = %connection.id(),
                address = %connection.address(),
                "Data store connection closed"
            ),
            Err(e) => tracing::warn!(
                connection = %connection.id(),
                error = %e,
                "Failed to close data store connection"
            ),
        }
    }
}

#[async_trait]
impl Service for DataDbService {
    fn name(&self) -> &str {
        names::DATA_DB
    }

    fn reload_sections(&self) -> Vec<&'static str> {
        vec![sections::DATA_DB]
    }

    fn should_run(&self) -> bool {
        self.config.current().data_db_required()
    }

    fn is_running(&self) -> bool {
        matches!(self.phase(), Phase::Running | Phase::Reloading)
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let mut applied = self.applied.lock().await;
        if applied.is_some() {
            return Err(ServiceError::AlreadyRunning(names::DATA_DB.to_string()));
        }
        // Checked under the lock: the shutdown listener's call either sees
        // this start complete or this start sees the signal closed.
        if self.shutdown.is_closed() {
            return Err(ServiceError::ShuttingDown(names::DATA_DB.to_string()));
        }
        self.set_phase(Phase::Starting);

        let opened = match self.current_params() {
            Ok(params) => Connection::open(self.connector.as_ref(), params.clone())
                .await
                .map(|connection| (params, connection)),
            Err(e) => Err(e),
        };
        let (params, connection) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.set_phase(Phase::Stopped);
                metrics::record_start_failure(names::DATA_DB);
                tracing::error!(error = %e, "Data store service failed to start");
                return Err(e.into());
            }
        };

        tracing::info!(
            connection = %connection.id(),
            db_type = %connection.db_type(),
            address = %connection.address(),
            "Data store connection established"
        );
        self.handle.publish(Arc::new(connection));
        *applied = Some(params);
        self.set_phase(Phase::Running);
        self.gates.open(names::DATA_DB);
        metrics::record_service_state(names::DATA_DB, true);
        Ok(())
    }

    async fn reload(&self) -> Result<(), ServiceError> {
        let mut applied = self.applied.lock().await;
        let Some(previous) = applied.as_ref() else {
            return Err(ServiceError::NotRunning(names::DATA_DB.to_string()));
        };

        let params = match self.current_params() {
            Ok(params) => params,
            Err(e) => {
                metrics::record_reload(names::DATA_DB, ReloadOutcome::Failed);
                tracing::error!(error = %e, "Invalid data store configuration, keeping current connection");
                return Err(e.into());
            }
        };
        if &params == previous {
            metrics::record_reload(names::DATA_DB, ReloadOutcome::Unchanged);
            tracing::debug!("Data store configuration unchanged, nothing to reload");
            return Ok(());
        }

        self.set_phase(Phase::Reloading);
        let connection = match Connection::open(self.connector.as_ref(), params.clone()).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                self.set_phase(Phase::Running);
                metrics::record_reload(names::DATA_DB, ReloadOutcome::Failed);
                tracing::error!(
                    error = %e,
                    db_type = %params.db_type,
                    address = %params.address(),
                    "Data store reload failed, keeping current connection"
                );
                return Err(e.into());
            }
        };

        let old = self.handle.publish(Arc::clone(&connection));
        *applied = Some(params);
        self.set_phase(Phase::Running);
        metrics::record_reload(names::DATA_DB, ReloadOutcome::Applied);
        metrics::record_connection_swap(connection.db_type().as_str());
        tracing::info!(
            old = ?old.as_ref().map(|c| c.id()),
            new = %connection.id(),
            db_type = %connection.db_type(),
            address = %connection.address(),
            "Data store connection swapped"
        );

        if let Some(old) = old {
            Self::close(old).await;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ServiceError> {
        let mut applied = self.applied.lock().await;
        if applied.take().is_none() {
            return Err(ServiceError::NotRunning(names::DATA_DB.to_string()));
        }

        self.gates.reset(names::DATA_DB);
        if let Some(connection) = self.handle.clear() {
            Self::close(connection).await;
        }
        self.set_phase(Phase::Stopped);
        metrics::record_service_state(names::DATA_DB, false);
        tracing::info!("Data store service stopped");
        Ok(())
    }
}
