//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated snapshot)
//!     → store.rs (ArcSwap, shared by every service)
//!
//! On reload (file change, SIGHUP, or an explicit section reload):
//!     watcher.rs / signals detect it
//!     → loader.rs loads and validates the file
//!     → store.rs swaps the snapshot and diffs sections
//!     → ReloadRegistry is signalled once per changed section
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Services re-read the snapshot when signalled; nothing is pushed to them

pub mod duration;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{sections, DataDbConfig, EngineConfig};
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;
