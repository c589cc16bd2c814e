//! Analyzer service.
//!
//! # Responsibilities
//! - Record captured API calls while running
//! - Periodically drop captures older than the configured ttl
//!
//! # Design Decisions
//! - The cleanup loop owns a private stop signal; shutdown and reload close
//!   it and await the task, so no cleanup runs after either returns
//! - Reload restarts the loop only when interval or ttl changed

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::duration::parse_duration;
use crate::config::schema::AnalyzersConfig;
use crate::config::{sections, ConfigStore};
use crate::lifecycle::gate::DependencyGates;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics::{self, ReloadOutcome};
use crate::services::{names, Service, ServiceError};

#[derive(Debug, Clone)]
struct Capture {
    method: String,
    recorded_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CleanupSettings {
    interval: Duration,
    ttl: Duration,
}

impl CleanupSettings {
    fn from_config(config: &AnalyzersConfig) -> Result<Self, ServiceError> {
        let parse = |value: &str| {
            parse_duration(value).map_err(|e| ServiceError::Config {
                service: names::ANALYZER.to_string(),
                reason: e.to_string(),
            })
        };
        let interval = parse(&config.cleanup_interval)?;
        if interval.is_zero() {
            return Err(ServiceError::Config {
                service: names::ANALYZER.to_string(),
                reason: "cleanup_interval must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            interval,
            ttl: parse(&config.ttl)?,
        })
    }
}

struct CleanupTask {
    settings: CleanupSettings,
    stop: ShutdownSignal,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    fn spawn(settings: CleanupSettings, captures: Arc<DashMap<u64, Capture>>) -> Self {
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(cleanup_loop(settings, captures, stop.clone()));
        Self {
            settings,
            stop,
            handle,
        }
    }

    async fn stop(self) {
        self.stop.close_once();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Analyzer cleanup task ended abnormally");
        }
    }
}

async fn cleanup_loop(settings: CleanupSettings, captures: Arc<DashMap<u64, Capture>>, stop: ShutdownSignal) {
    tracing::debug!(
        interval = ?settings.interval,
        ttl = ?settings.ttl,
        "Analyzer cleanup starting"
    );
    let mut ticker = time::interval(settings.interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let before = captures.len();
                captures.retain(|_, capture| capture.recorded_at.elapsed() < settings.ttl);
                let removed = before.saturating_sub(captures.len());
                if removed > 0 {
                    tracing::debug!(removed, "Expired analyzer captures removed");
                }
            }
            _ = stop.done() => {
                tracing::debug!("Analyzer cleanup received stop signal, exiting loop");
                break;
            }
        }
    }
}

pub struct AnalyzerService {
    config: ConfigStore,
    gates: DependencyGates,
    shutdown: ShutdownSignal,
    captures: Arc<DashMap<u64, Capture>>,
    next_id: AtomicU64,
    running: AtomicBool,
    cleanup: Mutex<Option<CleanupTask>>,
}

impl AnalyzerService {
    pub fn new(config: ConfigStore, gates: DependencyGates, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            gates,
            shutdown,
            captures: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            cleanup: Mutex::new(None),
        }
    }

    /// Record one API call. Returns the capture id.
    pub fn capture(&self, method: &str) -> Result<u64, ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning(names::ANALYZER.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.captures.insert(
            id,
            Capture {
                method: method.to_string(),
                recorded_at: Instant::now(),
            },
        );
        Ok(id)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    /// Number of live captures for `method`.
    pub fn captures_for(&self, method: &str) -> usize {
        self.captures.iter().filter(|c| c.method == method).count()
    }
}

#[async_trait]
impl Service for AnalyzerService {
    fn name(&self) -> &str {
        names::ANALYZER
    }

    fn reload_sections(&self) -> Vec<&'static str> {
        vec![sections::ANALYZERS]
    }

    fn should_run(&self) -> bool {
        self.config.current().analyzers.enabled
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let mut cleanup = self.cleanup.lock().await;
        if cleanup.is_some() {
            return Err(ServiceError::AlreadyRunning(names::ANALYZER.to_string()));
        }
        if self.shutdown.is_closed() {
            return Err(ServiceError::ShuttingDown(names::ANALYZER.to_string()));
        }
        let settings = match CleanupSettings::from_config(&self.config.current().analyzers) {
            Ok(settings) => settings,
            Err(e) => {
                metrics::record_start_failure(names::ANALYZER);
                return Err(e);
            }
        };

        *cleanup = Some(CleanupTask::spawn(settings, Arc::clone(&self.captures)));
        self.running.store(true, Ordering::Release);
        self.gates.open(names::ANALYZER);
        metrics::record_service_state(names::ANALYZER, true);
        tracing::info!(
            cleanup_interval = ?settings.interval,
            ttl = ?settings.ttl,
            "Analyzer service started"
        );
        Ok(())
    }

    async fn reload(&self) -> Result<(), ServiceError> {
        let mut cleanup = self.cleanup.lock().await;
        let Some(current) = cleanup.as_ref() else {
            return Err(ServiceError::NotRunning(names::ANALYZER.to_string()));
        };
        let settings = match CleanupSettings::from_config(&self.config.current().analyzers) {
            Ok(settings) => settings,
            Err(e) => {
                metrics::record_reload(names::ANALYZER, ReloadOutcome::Failed);
                tracing::error!(error = %e, "Invalid analyzer configuration, keeping current settings");
                return Err(e);
            }
        };
        if current.settings == settings {
            metrics::record_reload(names::ANALYZER, ReloadOutcome::Unchanged);
            return Ok(());
        }

        if let Some(task) = cleanup.take() {
            task.stop().await;
        }
        *cleanup = Some(CleanupTask::spawn(settings, Arc::clone(&self.captures)));
        metrics::record_reload(names::ANALYZER, ReloadOutcome::Applied);
        tracing::info!(
            cleanup_interval = ?settings.interval,
            ttl = ?settings.ttl,
            "Analyzer cleanup restarted with new settings"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ServiceError> {
        let mut cleanup = self.cleanup.lock().await;
        let Some(task) = cleanup.take() else {
            return Err(ServiceError::NotRunning(names::ANALYZER.to_string()));
        };
        self.gates.reset(names::ANALYZER);
        self.running.store(false, Ordering::Release);
        task.stop().await;
        self.captures.clear();
        metrics::record_service_state(names::ANALYZER, false);
        tracing::info!("Analyzer service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lifecycle::reload::ReloadRegistry;

    fn service(interval: &str, ttl: &str) -> (AnalyzerService, ConfigStore) {
        let (service, store, _) = service_with_shutdown(interval, ttl);
        (service, store)
    }

    fn service_with_shutdown(interval: &str, ttl: &str) -> (AnalyzerService, ConfigStore, ShutdownSignal) {
        let mut config = EngineConfig::default();
        config.analyzers.enabled = true;
        config.analyzers.cleanup_interval = interval.to_string();
        config.analyzers.ttl = ttl.to_string();
        let store = ConfigStore::new(config, ReloadRegistry::new());
        let shutdown = ShutdownSignal::new();
        let service = AnalyzerService::new(store.clone(), DependencyGates::new(), shutdown.clone());
        (service, store, shutdown)
    }

    #[tokio::test]
    async fn test_capture_requires_running() {
        let (service, _) = service("1h", "24h");
        assert!(service.capture("APIerSv1.Ping").is_err());

        service.start().await.unwrap();
        service.capture("APIerSv1.Ping").unwrap();
        service.capture("APIerSv1.Ping").unwrap();
        assert_eq!(service.captures_for("APIerSv1.Ping"), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_captures() {
        let (service, _) = service("10ms", "20ms");
        service.start().await.unwrap();
        service.capture("SessionSv1.InitiateSession").unwrap();
        assert_eq!(service.capture_count(), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while service.capture_count() > 0 && Instant::now() < deadline {
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.capture_count(), 0);
    }

    #[tokio::test]
    async fn test_reload_applies_new_ttl() {
        let (service, store) = service("10ms", "24h");
        service.start().await.unwrap();
        service.capture("CDRsV1.ProcessEvent").unwrap();
        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(service.capture_count(), 1);

        store.update(|c| c.analyzers.ttl = "1ms".to_string());
        service.reload().await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while service.capture_count() > 0 && Instant::now() < deadline {
            time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(service.capture_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_cleanup() {
        let (service, _) = service("10ms", "24h");
        service.start().await.unwrap();
        service.shutdown().await.unwrap();

        assert!(!service.is_running());
        assert!(matches!(service.reload().await, Err(ServiceError::NotRunning(_))));
        assert!(matches!(service.shutdown().await, Err(ServiceError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_invalid_interval_fails_start() {
        let (service, _) = service("often", "24h");
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Config { .. }));
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_start_refused_after_shutdown() {
        let (service, _, shutdown) = service_with_shutdown("10ms", "24h");
        shutdown.close_once();

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::ShuttingDown(_)));
        assert!(!service.is_running());
        assert!(service.cleanup.lock().await.is_none());
    }
}
