//! Charging engine service lifecycle library.
//!
//! Starts, stops, hot-reloads and dependency-sequences the engine's
//! long-lived services, and hot-swaps the shared data store connection
//! underneath running consumers.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{ConfigStore, EngineConfig};
pub use lifecycle::{Engine, ServiceManager, ShutdownSignal};
pub use services::{DataDbHandle, Service, ServiceError};
