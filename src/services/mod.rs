//! Engine services.
//!
//! # Data Flow
//! ```text
//! ServiceManager
//!     → Service::start (one task each, concurrently)
//!         → waits on the DependencyGates it declares
//!         → opens its own gate once usable
//!     → reload listener per section → Service::reload / start / shutdown
//!     → shutdown listener → Service::shutdown
//!
//! DataDbService ── DataDbHandle ──▶ AttributeService, LoaderService
//! ```
//!
//! # Design Decisions
//! - Startup order is expressed only through gate waits
//! - Every service serializes its own start/reload/shutdown
//! - No start completes once the process-wide shutdown signal has fired, so
//!   the shutdown listener never races a start into a running service
//! - Consumers of the data store never cache the connection; they ask the
//!   handle on every call and so always see the latest swap

pub mod analyzer;
pub mod attributes;
pub mod datadb;
pub mod loaders;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::ConfigStore;
use crate::lifecycle::gate::{DependencyGates, GateError};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::storage::StoreError;

pub use analyzer::AnalyzerService;
pub use attributes::AttributeService;
pub use datadb::{DataDbHandle, DataDbService, Phase};
pub use loaders::LoaderService;

/// Service names, also used as the names of their readiness gates.
pub mod names {
    pub const DATA_DB: &str = "DataDB";
    pub const ATTRIBUTES: &str = "AttributeS";
    pub const LOADERS: &str = "LoaderS";
    pub const ANALYZER: &str = "AnalyzerS";
}

/// Cache partitions whose precache readiness services can wait on.
pub mod partitions {
    pub const ATTRIBUTE_PROFILES: &str = "attribute_profiles";
    pub const ATTRIBUTE_FILTER_INDEXES: &str = "attribute_filter_indexes";
}

/// Errors raised by service lifecycle operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service <{0}> already running")]
    AlreadyRunning(String),

    #[error("service <{0}> not running")]
    NotRunning(String),

    #[error("service <{0}> not started: shutdown in progress")]
    ShuttingDown(String),

    /// `shutdown` was called while the start was still waiting.
    #[error("start of service <{0}> cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dependency(#[from] GateError),

    #[error("invalid configuration for <{service}>: {reason}")]
    Config { service: String, reason: String },

    /// A dependency's resource was not published when it was needed.
    #[error("service <{service}> cannot use <{dependency}>: not available")]
    Unavailable { service: String, dependency: String },

    #[error("task of service <{service}> failed: {reason}")]
    TaskFailed { service: String, reason: String },
}

/// A long-lived engine subsystem.
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service name.
    fn name(&self) -> &str;

    /// Gates that must be open before the service can start.
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Configuration sections whose reload signals this service consumes.
    fn reload_sections(&self) -> Vec<&'static str>;

    /// Whether the current configuration wants this service running.
    fn should_run(&self) -> bool;

    fn is_running(&self) -> bool;

    /// Acquire resources and become usable. Fails with `AlreadyRunning` if
    /// the service is running.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Re-read configuration and apply it in place.
    async fn reload(&self) -> Result<(), ServiceError>;

    /// Release resources. Fails with `NotRunning` if the service is stopped.
    async fn shutdown(&self) -> Result<(), ServiceError>;
}

/// Start and stop bookkeeping for services whose start waits on gates.
///
/// The lock is never held across the dependency wait, so `stop` can always
/// proceed; it cancels a start that is still waiting.
pub(crate) struct GatedLifecycle {
    name: &'static str,
    running: AtomicBool,
    /// Cancel handle of the start currently waiting on its dependencies.
    pending: Mutex<Option<ShutdownSignal>>,
}

impl GatedLifecycle {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Await `wait`, then mark the service running and call `on_started`
    /// under the lock, unless the start was cancelled or shutdown fired.
    pub(crate) async fn start<W, F>(
        &self,
        shutdown: &ShutdownSignal,
        wait: W,
        on_started: F,
    ) -> Result<(), ServiceError>
    where
        W: Future<Output = Result<(), ServiceError>>,
        F: FnOnce(),
    {
        let cancel = {
            let mut pending = self.pending.lock().await;
            if self.is_running() || pending.is_some() {
                return Err(ServiceError::AlreadyRunning(self.name.to_string()));
            }
            if shutdown.is_closed() {
                return Err(ServiceError::ShuttingDown(self.name.to_string()));
            }
            let cancel = ShutdownSignal::new();
            *pending = Some(cancel.clone());
            cancel
        };

        let waited = tokio::select! {
            biased;
            _ = cancel.done() => Err(ServiceError::Cancelled(self.name.to_string())),
            result = wait => result,
        };

        let mut pending = self.pending.lock().await;
        // A closed handle was already taken by `stop`.
        if cancel.is_closed() {
            return Err(ServiceError::Cancelled(self.name.to_string()));
        }
        *pending = None;
        if let Err(e) = waited {
            metrics::record_start_failure(self.name);
            return Err(e);
        }
        if shutdown.is_closed() {
            return Err(ServiceError::ShuttingDown(self.name.to_string()));
        }
        self.running.store(true, Ordering::Release);
        on_started();
        Ok(())
    }

    /// Run `apply` under the lock if the service is running.
    pub(crate) async fn reload<F: FnOnce()>(&self, apply: F) -> Result<(), ServiceError> {
        let _pending = self.pending.lock().await;
        if !self.is_running() {
            return Err(ServiceError::NotRunning(self.name.to_string()));
        }
        apply();
        Ok(())
    }

    /// Stop the service, or cancel its pending start.
    pub(crate) async fn stop<F: FnOnce()>(&self, on_stopped: F) -> Result<(), ServiceError> {
        let mut pending = self.pending.lock().await;
        if let Some(cancel) = pending.take() {
            cancel.close_once();
            tracing::info!(service = %self.name, "Pending service start cancelled");
            return Ok(());
        }
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(ServiceError::NotRunning(self.name.to_string()));
        }
        on_stopped();
        Ok(())
    }
}

/// Wait for every gate in `dependencies`, bounded by
/// `general.dependency_timeout` and cancelled by shutdown.
pub(crate) async fn wait_for_dependencies(
    service: &str,
    dependencies: &[&'static str],
    gates: &DependencyGates,
    config: &ConfigStore,
    shutdown: &ShutdownSignal,
) -> Result<(), ServiceError> {
    let timeout = dependency_timeout(service, config)?;
    for dependency in dependencies {
        let gate = gates.gate(dependency);
        if !gate.is_open() {
            tracing::debug!(service = %service, dependency = %dependency, "Waiting for dependency");
        }
        gate.wait_with(timeout, shutdown).await?;
    }
    Ok(())
}

fn dependency_timeout(service: &str, config: &ConfigStore) -> Result<Option<Duration>, ServiceError> {
    config
        .current()
        .general
        .dependency_timeout()
        .map_err(|e| ServiceError::Config {
            service: service.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lifecycle::reload::ReloadRegistry;

    fn store_with_timeout(timeout: Option<&str>) -> ConfigStore {
        let mut config = EngineConfig::default();
        config.general.dependency_timeout = timeout.map(str::to_string);
        ConfigStore::new(config, ReloadRegistry::new())
    }

    #[tokio::test]
    async fn test_wait_for_open_dependencies() {
        let gates = DependencyGates::new();
        gates.open(names::DATA_DB);
        gates.open(partitions::ATTRIBUTE_PROFILES);

        wait_for_dependencies(
            names::ATTRIBUTES,
            &[names::DATA_DB, partitions::ATTRIBUTE_PROFILES],
            &gates,
            &store_with_timeout(None),
            &ShutdownSignal::new(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out_on_closed_dependency() {
        let gates = DependencyGates::new();
        let err = wait_for_dependencies(
            names::LOADERS,
            &[names::DATA_DB],
            &gates,
            &store_with_timeout(Some("20ms")),
            &ShutdownSignal::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "dependency <DataDB> not ready after 20ms");
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_start() {
        let lifecycle = std::sync::Arc::new(GatedLifecycle::new(names::LOADERS));
        let gates = DependencyGates::new();
        let shutdown = ShutdownSignal::new();

        let start = {
            let lifecycle = std::sync::Arc::clone(&lifecycle);
            let gates = gates.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let config = store_with_timeout(None);
                let wait = wait_for_dependencies(
                    names::LOADERS,
                    &[names::DATA_DB],
                    &gates,
                    &config,
                    &shutdown,
                );
                lifecycle.start(&shutdown, wait, || {}).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_millis(500), lifecycle.stop(|| {}))
            .await
            .expect("stop blocked behind pending start")
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), start).await.unwrap().unwrap();
        assert!(matches!(result, Err(ServiceError::Cancelled(_))));
        assert!(!lifecycle.is_running());

        // A later start still works.
        gates.open(names::DATA_DB);
        lifecycle.start(&shutdown, async { Ok(()) }, || {}).await.unwrap();
        assert!(lifecycle.is_running());
    }

    #[tokio::test]
    async fn test_no_start_after_shutdown() {
        let lifecycle = GatedLifecycle::new(names::LOADERS);
        let shutdown = ShutdownSignal::new();
        shutdown.close_once();

        let err = lifecycle.start(&shutdown, async { Ok(()) }, || {}).await.unwrap_err();
        assert!(matches!(err, ServiceError::ShuttingDown(_)));
        assert!(!lifecycle.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_during_wait_refuses_start() {
        let lifecycle = GatedLifecycle::new(names::LOADERS);
        let shutdown = ShutdownSignal::new();
        let closer = shutdown.clone();

        let wait = async move {
            closer.close_once();
            Ok(())
        };
        let err = lifecycle.start(&shutdown, wait, || {}).await.unwrap_err();
        assert!(matches!(err, ServiceError::ShuttingDown(_)));
        assert!(!lifecycle.is_running());
    }
}
