//! Service manager.
//!
//! # Responsibilities
//! - Register services once, by unique name and unique reload sections
//! - Start every wanted service concurrently and report every failure
//! - Run one reload listener per section and one shutdown listener per service
//!
//! # Design Decisions
//! - Listeners are spawned before any start so no signal is lost; reload
//!   signals sent earlier stay buffered in the registry
//! - A reload signal reconciles desired and actual state in the listener
//!   task, never in the notifier
//! - A failed start never aborts its siblings

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::lifecycle::reload::ReloadReceiver;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::services::{Service, ServiceError};

/// Registration errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("service <{0}> already registered")]
    DuplicateService(String),

    #[error("section <{section}> already handled by service <{owner}>")]
    SectionTaken { section: String, owner: String },

    #[error("services already started")]
    AlreadyStarted,
}

/// One service that failed to start.
#[derive(Debug)]
pub struct ServiceFailure {
    pub service: String,
    pub error: ServiceError,
}

/// Errors from [`ServiceManager::start_services`].
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("services already started")]
    AlreadyStarted,

    #[error("{} service(s) failed to start: {}", .0.len(), describe(.0))]
    Failed(Vec<ServiceFailure>),
}

fn describe(failures: &[ServiceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("<{}> {}", f.service, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Point-in-time view of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub should_run: bool,
    pub dependencies: Vec<String>,
}

/// Owns the engine's services and their listeners.
pub struct ServiceManager {
    config: ConfigStore,
    shutdown: ShutdownSignal,
    services: RwLock<Vec<Arc<dyn Service>>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ServiceManager {
    pub fn new(config: ConfigStore, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            shutdown,
            services: RwLock::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register services. Rejects the whole batch on any conflict.
    pub fn add_services(&self, new: Vec<Arc<dyn Service>>) -> Result<(), ManagerError> {
        if self.started.load(Ordering::Acquire) {
            return Err(ManagerError::AlreadyStarted);
        }
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);

        let mut owners: Vec<(&'static str, String)> = services
            .iter()
            .flat_map(|s| {
                s.reload_sections()
                    .into_iter()
                    .map(move |section| (section, s.name().to_string()))
            })
            .collect();
        let mut names: Vec<String> = services.iter().map(|s| s.name().to_string()).collect();

        for service in &new {
            if names.iter().any(|n| n == service.name()) {
                return Err(ManagerError::DuplicateService(service.name().to_string()));
            }
            names.push(service.name().to_string());

            for section in service.reload_sections() {
                if let Some((_, owner)) = owners.iter().find(|(s, _)| *s == section) {
                    return Err(ManagerError::SectionTaken {
                        section: section.to_string(),
                        owner: owner.clone(),
                    });
                }
                owners.push((section, service.name().to_string()));
            }
        }

        for service in &new {
            tracing::debug!(service = %service.name(), "Service registered");
        }
        services.extend(new);
        Ok(())
    }

    /// Start every service whose configuration wants it running.
    ///
    /// Waits for all start tasks and returns every failure together.
    pub async fn start_services(&self) -> Result<(), StartupError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StartupError::AlreadyStarted);
        }
        let services = self.services();

        {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            for service in &services {
                for section in service.reload_sections() {
                    let rx = self.config.registry().subscribe(section);
                    listeners.push(tokio::spawn(reload_listener(
                        Arc::clone(service),
                        rx,
                        self.shutdown.clone(),
                    )));
                }
                listeners.push(tokio::spawn(shutdown_listener(
                    Arc::clone(service),
                    self.shutdown.clone(),
                )));
            }
        }

        let wanted: Vec<Arc<dyn Service>> = services.into_iter().filter(|s| s.should_run()).collect();
        tracing::info!(
            services = ?wanted.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            "Starting services"
        );

        let starts = wanted.iter().map(|service| {
            let service = Arc::clone(service);
            tokio::spawn(async move { service.start().await })
        });
        let results = join_all(starts).await;

        let mut failures = Vec::new();
        for (service, result) in wanted.iter().zip(results) {
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_error) => ServiceError::TaskFailed {
                    service: service.name().to_string(),
                    reason: join_error.to_string(),
                },
            };
            tracing::error!(service = %service.name(), error = %error, "Service failed to start");
            failures.push(ServiceFailure {
                service: service.name().to_string(),
                error,
            });
        }

        if failures.is_empty() {
            tracing::info!("All services started");
            Ok(())
        } else {
            Err(StartupError::Failed(failures))
        }
    }

    /// Wait for every listener to finish. Returns once shutdown has fired
    /// and every service has been stopped.
    pub async fn wait_stopped(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.drain(..).collect()
        };
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Service listener ended abnormally");
            }
        }
    }

    /// Registered services, in registration order.
    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services().into_iter().find(|s| s.name() == name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.service(name).map(|s| s.is_running()).unwrap_or(false)
    }

    /// Snapshot of every registered service.
    pub fn status(&self) -> Vec<ServiceStatus> {
        self.services()
            .iter()
            .map(|s| ServiceStatus {
                name: s.name().to_string(),
                running: s.is_running(),
                should_run: s.should_run(),
                dependencies: s.dependencies().into_iter().map(str::to_string).collect(),
            })
            .collect()
    }
}

async fn reload_listener(service: Arc<dyn Service>, mut rx: ReloadReceiver, shutdown: ShutdownSignal) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.done() => break,
            signal = rx.recv() => match signal {
                Some(()) => reconcile(service.as_ref(), rx.section(), &shutdown).await,
                None => {
                    tracing::debug!(service = %service.name(), section = %rx.section(), "Reload channel replaced, listener exiting");
                    break;
                }
            },
        }
    }
}

/// Bring a service in line with its configuration after a reload signal.
async fn reconcile(service: &dyn Service, section: &str, shutdown: &ShutdownSignal) {
    if shutdown.is_closed() {
        return;
    }
    let name = service.name();
    let (result, action) = match (service.should_run(), service.is_running()) {
        (true, true) => (service.reload().await, "reloaded"),
        (true, false) => (service.start().await, "started"),
        (false, true) => (service.shutdown().await, "stopped"),
        (false, false) => {
            tracing::debug!(service = %name, section = %section, "Service disabled and stopped, nothing to do");
            return;
        }
    };

    match result {
        Ok(()) => tracing::info!(service = %name, section = %section, action, "Service reconciled"),
        Err(ServiceError::AlreadyRunning(_)) | Err(ServiceError::NotRunning(_)) => {
            tracing::debug!(service = %name, section = %section, action, "Service already in desired state");
        }
        Err(e @ ServiceError::ShuttingDown(_)) | Err(e @ ServiceError::Cancelled(_)) => {
            tracing::debug!(service = %name, section = %section, action, reason = %e, "Service reconcile abandoned");
        }
        Err(e) => {
            if action == "started" {
                metrics::record_start_failure(name);
            }
            tracing::error!(service = %name, section = %section, action, error = %e, "Service reconcile failed");
        }
    }
}

async fn shutdown_listener(service: Arc<dyn Service>, shutdown: ShutdownSignal) {
    shutdown.done().await;
    match service.shutdown().await {
        Ok(()) => tracing::info!(service = %service.name(), "Service shut down"),
        Err(ServiceError::NotRunning(_)) => {
            tracing::debug!(service = %service.name(), "Service was not running at shutdown");
        }
        Err(e) => tracing::error!(service = %service.name(), error = %e, "Service shutdown failed"),
    }
}
