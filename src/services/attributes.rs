//! Attribute service.
//!
//! Serves attribute profiles out of the data store. Starts only once the
//! data store is published and the attribute cache partitions are
//! precached.

use async_trait::async_trait;

use crate::config::{sections, ConfigStore};
use crate::lifecycle::gate::DependencyGates;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics::{self, ReloadOutcome};
use crate::services::datadb::DataDbHandle;
use crate::services::{names, partitions, wait_for_dependencies, GatedLifecycle, Service, ServiceError};

/// Key prefix of stored attribute profiles.
pub const ATTRIBUTE_PROFILE_PREFIX: &str = "alp_";

/// Store key of the profile `id` of `tenant`.
pub fn attribute_profile_key(tenant: &str, id: &str) -> String {
    format!("{ATTRIBUTE_PROFILE_PREFIX}{tenant}:{id}")
}

pub struct AttributeService {
    config: ConfigStore,
    gates: DependencyGates,
    shutdown: ShutdownSignal,
    data_db: DataDbHandle,
    lifecycle: GatedLifecycle,
}

impl AttributeService {
    pub fn new(
        config: ConfigStore,
        gates: DependencyGates,
        shutdown: ShutdownSignal,
        data_db: DataDbHandle,
    ) -> Self {
        Self {
            config,
            gates,
            shutdown,
            data_db,
            lifecycle: GatedLifecycle::new(names::ATTRIBUTES),
        }
    }

    /// Fetch one attribute profile from the current data store.
    pub async fn attribute_profile(
        &self,
        tenant: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning(names::ATTRIBUTES.to_string()));
        }
        let connection = self.data_db.get_connection().ok_or_else(|| ServiceError::Unavailable {
            service: names::ATTRIBUTES.to_string(),
            dependency: names::DATA_DB.to_string(),
        })?;
        Ok(connection.store().get(&attribute_profile_key(tenant, id)).await?)
    }
}

#[async_trait]
impl Service for AttributeService {
    fn name(&self) -> &str {
        names::ATTRIBUTES
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![
            names::DATA_DB,
            partitions::ATTRIBUTE_PROFILES,
            partitions::ATTRIBUTE_FILTER_INDEXES,
        ]
    }

    fn reload_sections(&self) -> Vec<&'static str> {
        vec![sections::ATTRIBUTES]
    }

    fn should_run(&self) -> bool {
        self.config.current().attributes.enabled
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let dependencies = self.dependencies();
        let wait = wait_for_dependencies(
            names::ATTRIBUTES,
            &dependencies,
            &self.gates,
            &self.config,
            &self.shutdown,
        );
        self.lifecycle
            .start(&self.shutdown, wait, || {
                self.gates.open(names::ATTRIBUTES);
                metrics::record_service_state(names::ATTRIBUTES, true);
                let config = self.config.current();
                tracing::info!(
                    process_runs = config.attributes.process_runs,
                    indexed_selects = config.attributes.indexed_selects,
                    "Attribute service started"
                );
            })
            .await
    }

    async fn reload(&self) -> Result<(), ServiceError> {
        self.lifecycle
            .reload(|| {
                let config = self.config.current();
                metrics::record_reload(names::ATTRIBUTES, ReloadOutcome::Applied);
                tracing::info!(
                    process_runs = config.attributes.process_runs,
                    indexed_selects = config.attributes.indexed_selects,
                    "Attribute service reloaded"
                );
            })
            .await
    }

    async fn shutdown(&self) -> Result<(), ServiceError> {
        self.lifecycle
            .stop(|| {
                self.gates.reset(names::ATTRIBUTES);
                metrics::record_service_state(names::ATTRIBUTES, false);
                tracing::info!("Attribute service stopped");
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lifecycle::reload::ReloadRegistry;
    use std::time::Duration;

    fn service(gates: &DependencyGates) -> AttributeService {
        service_with_timeout(gates, Some("50ms"))
    }

    fn service_with_timeout(gates: &DependencyGates, timeout: Option<&str>) -> AttributeService {
        let mut config = EngineConfig::default();
        config.attributes.enabled = true;
        config.general.dependency_timeout = timeout.map(str::to_string);
        AttributeService::new(
            ConfigStore::new(config, ReloadRegistry::new()),
            gates.clone(),
            ShutdownSignal::new(),
            DataDbHandle::default(),
        )
    }

    #[test]
    fn test_profile_key() {
        assert_eq!(attribute_profile_key("cgrates.org", "ATTR_1"), "alp_cgrates.org:ATTR_1");
    }

    #[tokio::test]
    async fn test_start_waits_for_precache() {
        let gates = DependencyGates::new();
        gates.open(names::DATA_DB);
        gates.open(partitions::ATTRIBUTE_PROFILES);
        let service = service(&gates);

        let err = service.start().await.unwrap_err();
        assert!(err.to_string().contains("attribute_filter_indexes"));
        assert!(!service.is_running());

        gates.open(partitions::ATTRIBUTE_FILTER_INDEXES);
        tokio::time::timeout(Duration::from_secs(1), service.start())
            .await
            .unwrap()
            .unwrap();
        assert!(gates.is_open(names::ATTRIBUTES));
    }

    #[tokio::test]
    async fn test_lookup_without_published_store() {
        let gates = DependencyGates::new();
        for gate in [
            names::DATA_DB,
            partitions::ATTRIBUTE_PROFILES,
            partitions::ATTRIBUTE_FILTER_INDEXES,
        ] {
            gates.open(gate);
        }
        let service = service(&gates);
        service.start().await.unwrap();

        let err = service.attribute_profile("cgrates.org", "A").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_data_db() {
        let gates = DependencyGates::new();
        let service = std::sync::Arc::new(service_with_timeout(&gates, None));

        let pending = {
            let service = std::sync::Arc::clone(&service);
            tokio::spawn(async move { service.start().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_millis(500), service.shutdown())
            .await
            .expect("shutdown blocked by pending start")
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ServiceError::Cancelled(_))));
        assert!(!service.is_running());
        assert!(!gates.is_open(names::ATTRIBUTES));
    }
}
