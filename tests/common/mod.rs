//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use charging_engine::config::{ConfigStore, EngineConfig};
use charging_engine::lifecycle::{Engine, ReloadRegistry};
use charging_engine::services::partitions;
use charging_engine::storage::MemoryConnector;

/// An engine wired to an in-process store.
pub struct Harness {
    pub engine: Engine,
    pub store: ConfigStore,
    pub connector: MemoryConnector,
}

/// Config with the data store pointed at mongo on 127.0.0.1:27017 and the
/// given consumers enabled.
#[allow(dead_code)]
pub fn mongo_config(attributes: bool, loaders: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.data_db.db_type = "*mongo".to_string();
    config.data_db.host = "127.0.0.1".to_string();
    config.data_db.port = 27017;
    config.attributes.enabled = attributes;
    config.loaders.enabled = loaders;
    config.general.dependency_timeout = Some("2s".to_string());
    config.general.shutdown_timeout = "2s".to_string();
    config
}

/// Build an engine for `config`, with every precache partition marked ready.
pub fn harness(config: EngineConfig) -> Harness {
    let store = ConfigStore::new(config, ReloadRegistry::new());
    let connector = MemoryConnector::new();
    let engine = Engine::new(store.clone(), Arc::new(connector.clone())).unwrap();
    engine.mark_precached(partitions::ATTRIBUTE_PROFILES);
    engine.mark_precached(partitions::ATTRIBUTE_FILTER_INDEXES);
    Harness {
        engine,
        store,
        connector,
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
