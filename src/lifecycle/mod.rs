//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Engine::new → register services → ServiceManager::start_services
//!         each start waits on its DependencyGates (gate.rs)
//!
//! Reload (reload.rs):
//!     ConfigStore → ReloadRegistry::notify(section)
//!         → per-section listener → reconcile service
//!
//! Shutdown (shutdown.rs):
//!     Signal received → ShutdownSignal closes once
//!         → per-service listener → Service::shutdown
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Startup order emerges from gate waits, never from a central list
//! - Shutdown has timeout: the binary gives up after `general.shutdown_timeout`

pub mod gate;
pub mod manager;
pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use gate::{DependencyGate, DependencyGates, GateError};
pub use manager::{ManagerError, ServiceManager, ServiceStatus, StartupError};
pub use reload::{ReloadReceiver, ReloadRegistry};
pub use shutdown::ShutdownSignal;
pub use startup::{Engine, EngineError};
