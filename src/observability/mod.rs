//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout via the fmt layer
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (service, section, connection id)
//! - RUST_LOG overrides the configured log level
//! - Metrics go through the `metrics` facade; without an installed recorder
//!   every update is a no-op, so tests need no setup

pub mod logging;
pub mod metrics;
