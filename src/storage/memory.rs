//! In-process data store backend.
//!
//! Databases are keyed by backend type, address and name, so reconnecting
//! with the same parameters reaches the same data, as with a real server.
//! Hosts can be marked unreachable to exercise connection failures.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::storage::connection::ConnectParams;
use crate::storage::versions::Versions;
use crate::storage::{Connector, DataStore, DbType, StoreError};

/// Contents of one in-process database.
#[derive(Debug, Default)]
struct MemoryDatabase {
    items: DashMap<String, serde_json::Value>,
    versions: DashMap<String, i64>,
}

/// Connector producing [`MemoryStore`] handles.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<DashMap<String, Arc<MemoryDatabase>>>,
    unreachable: Arc<DashSet<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or stop refusing) connections to `host`.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(host.to_string());
        } else {
            self.unreachable.remove(host);
        }
    }

    /// Pre-populate the versions of the database `params` points at.
    pub fn seed_versions(&self, params: &ConnectParams, versions: Versions) {
        let db = self.database(params);
        db.versions.clear();
        for (name, version) in versions {
            db.versions.insert(name, version);
        }
    }

    /// Number of distinct databases created so far.
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    fn database(&self, params: &ConnectParams) -> Arc<MemoryDatabase> {
        let key = format!("{}://{}/{}", params.db_type, params.address(), params.name);
        self.databases.entry(key).or_default().value().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Arc<dyn DataStore>, StoreError> {
        if self.unreachable.contains(&params.host) {
            return Err(StoreError::Connect {
                db_type: params.db_type,
                address: params.address(),
                reason: "connection refused".to_string(),
            });
        }

        tracing::debug!(db_type = %params.db_type, address = %params.address(), "Opening in-process data store");
        Ok(Arc::new(MemoryStore {
            db_type: params.db_type,
            address: params.address(),
            db: self.database(params),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Handle to an in-process database.
#[derive(Debug)]
pub struct MemoryStore {
    db_type: DbType,
    address: String,
    db: Arc<MemoryDatabase>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Whether `close` has been called on this handle.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed(self.address.clone()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.ensure_open()?;
        Ok(self.db.items.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.items.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.db.items.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let mut keys: Vec<String> = self
            .db
            .items
            .iter()
            .filter(|item| item.key().starts_with(prefix))
            .map(|item| item.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self, prefix: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.db.items.retain(|key, _| !key.starts_with(prefix));
        if prefix.is_empty() {
            self.db.versions.clear();
        }
        Ok(())
    }

    async fn versions(&self) -> Result<Versions, StoreError> {
        self.ensure_open()?;
        Ok(self
            .db
            .versions
            .iter()
            .map(|v| (v.key().clone(), *v.value()))
            .collect())
    }

    async fn set_versions(&self, versions: &Versions, overwrite: bool) -> Result<(), StoreError> {
        self.ensure_open()?;
        if overwrite {
            self.db.versions.clear();
        }
        for (name, version) in versions {
            self.db.versions.insert(name.clone(), *version);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed(self.address.clone()));
        }
        tracing::debug!(db_type = %self.db_type, address = %self.address, "Closed in-process data store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DataDbConfig;
    use serde_json::json;

    fn params(db_type: &str, host: &str) -> ConnectParams {
        ConnectParams::from_config(&DataDbConfig {
            db_type: db_type.to_string(),
            host: host.to_string(),
            ..DataDbConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_same_params_share_data() {
        let connector = MemoryConnector::new();
        let a = connector.connect(&params("*redis", "10.0.0.1")).await.unwrap();
        let b = connector.connect(&params("*redis", "10.0.0.1")).await.unwrap();
        let other = connector.connect(&params("*mongo", "10.0.0.1")).await.unwrap();

        a.set("acc_1001", json!({"balance": 10})).await.unwrap();
        assert_eq!(b.get("acc_1001").await.unwrap(), Some(json!({"balance": 10})));
        assert_eq!(other.get("acc_1001").await.unwrap(), None);
        assert_eq!(connector.database_count(), 2);
    }

    #[tokio::test]
    async fn test_flush_by_prefix() {
        let connector = MemoryConnector::new();
        let store = connector.connect(&params("*redis", "127.0.0.1")).await.unwrap();
        store.set("alp_cgrates.org:A", json!(1)).await.unwrap();
        store.set("acc_cgrates.org:1001", json!(2)).await.unwrap();

        store.flush("alp_").await.unwrap();
        assert_eq!(store.keys("").await.unwrap(), vec!["acc_cgrates.org:1001"]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let connector = MemoryConnector::new();
        let store = connector.connect(&params("*redis", "127.0.0.1")).await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(store.get("k").await, Err(StoreError::Closed(_))));
        assert!(matches!(store.close().await, Err(StoreError::Closed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let connector = MemoryConnector::new();
        connector.set_unreachable("10.9.9.9", true);
        let err = connector.connect(&params("*mongo", "10.9.9.9")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot connect to *mongo at 10.9.9.9:6379: connection refused"
        );

        connector.set_unreachable("10.9.9.9", false);
        assert!(connector.connect(&params("*mongo", "10.9.9.9")).await.is_ok());
    }
}
