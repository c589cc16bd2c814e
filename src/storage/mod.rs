//! Data store abstraction.
//!
//! # Data Flow
//! ```text
//! DataDbConfig (loose, from file)
//!     → ConnectParams::from_config (db_type + typed options)
//!     → Connector::connect (backend driver)
//!     → versions::check_versions (refuse outdated data)
//!     → Connection (identity + params + store), published by DataDbService
//! ```
//!
//! # Design Decisions
//! - Backend drivers live behind the `Connector` and `DataStore` traits; the
//!   orchestrator only opens, closes, flushes and version-checks stores
//! - A `Connection` is immutable once built; replacing it means building a
//!   new one and swapping it in

pub mod connection;
pub mod memory;
pub mod options;
pub mod versions;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;

pub use connection::{ConnectParams, Connection};
pub use memory::{MemoryConnector, MemoryStore};
pub use options::{ConnectOptions, OptionError};
pub use versions::Versions;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Empty or unknown backend type.
    #[error("unsupported db_type <{0}>")]
    UnsupportedDbType(String),

    /// An option value could not be converted to its typed form.
    #[error(transparent)]
    Option(#[from] OptionError),

    /// The backend could not be reached.
    #[error("cannot connect to {db_type} at {address}: {reason}")]
    Connect {
        db_type: DbType,
        address: String,
        reason: String,
    },

    /// Operation on a connection that was already closed.
    #[error("data store connection to {0} is closed")]
    Closed(String),

    /// Stored data is older than this build understands.
    #[error("migration needed for <{}>: please backup data and run the migrator", .0.join(","))]
    MigrationNeeded(Vec<String>),
}

/// Supported backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Internal,
    Redis,
    Mongo,
    MySql,
    Postgres,
}

impl DbType {
    /// Canonical identifier, as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Internal => "*internal",
            DbType::Redis => "*redis",
            DbType::Mongo => "*mongo",
            DbType::MySql => "*mysql",
            DbType::Postgres => "*postgres",
        }
    }

    /// Port used when the configuration leaves it at 0.
    pub fn default_port(&self) -> u16 {
        match self {
            DbType::Internal => 0,
            DbType::Redis => 6379,
            DbType::Mongo => 27017,
            DbType::MySql => 3306,
            DbType::Postgres => 5432,
        }
    }
}

impl FromStr for DbType {
    type Err = StoreError;

    /// Accepts the canonical form (`*mongo`) and the bare name (`mongo`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('*').unwrap_or(s) {
            "internal" => Ok(DbType::Internal),
            "redis" => Ok(DbType::Redis),
            "mongo" => Ok(DbType::Mongo),
            "mysql" => Ok(DbType::MySql),
            "postgres" => Ok(DbType::Postgres),
            _ => Err(StoreError::UnsupportedDbType(s.to_string())),
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open handle to a backend.
#[async_trait]
pub trait DataStore: Send + Sync + fmt::Debug {
    /// Backend type of this store.
    fn db_type(&self) -> DbType;

    /// Fetch one item.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Store one item, replacing any previous value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    /// Remove one item. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove every item whose key starts with `prefix` (empty = everything).
    async fn flush(&self, prefix: &str) -> Result<(), StoreError>;

    /// Stored data versions.
    async fn versions(&self) -> Result<Versions, StoreError>;

    /// Write data versions, replacing all of them when `overwrite` is set.
    async fn set_versions(&self, versions: &Versions, overwrite: bool) -> Result<(), StoreError>;

    /// Release the backend handle. Later calls fail with `Closed`.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Factory for backend handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a store for the given parameters.
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn DataStore>, StoreError>;
}
