//! Loader service.
//!
//! Writes attribute profiles into whichever data store is currently
//! published.

use async_trait::async_trait;

use crate::config::{sections, ConfigStore};
use crate::lifecycle::gate::DependencyGates;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics::{self, ReloadOutcome};
use crate::services::attributes::attribute_profile_key;
use crate::services::datadb::DataDbHandle;
use crate::services::{names, wait_for_dependencies, GatedLifecycle, Service, ServiceError};

pub struct LoaderService {
    config: ConfigStore,
    gates: DependencyGates,
    shutdown: ShutdownSignal,
    data_db: DataDbHandle,
    lifecycle: GatedLifecycle,
}

impl LoaderService {
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
            lifecycle: GatedLifecycle::new(names::LOADERS),
        }
    }

    /// Store attribute profiles under the configured tenant.
    ///
    /// Returns how many profiles were written.
    pub async fn load_attribute_profiles<I>(&self, profiles: I) -> Result<usize, ServiceError>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if !self.is_running() {
            return Err(ServiceError::NotRunning(names::LOADERS.to_string()));
        }
        let connection = self.data_db.get_connection().ok_or_else(|| ServiceError::Unavailable {
            service: names::LOADERS.to_string(),
            dependency: names::DATA_DB.to_string(),
        })?;
        let tenant = self.config.current().loaders.tenant.clone();

        let mut loaded = 0;
        for (id, profile) in profiles {
            connection
                .store()
                .set(&attribute_profile_key(&tenant, &id), profile)
                .await?;
            loaded += 1;
        }
        tracing::info!(
            connection = %connection.id(),
            tenant = %tenant,
            loaded,
            "Attribute profiles loaded"
        );
        Ok(loaded)
    }
}

#[async_trait]
impl Service for LoaderService {
    fn name(&self) -> &str {
        names::LOADERS
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![names::DATA_DB]
    }

    fn reload_sections(&self) -> Vec<&'static str> {
        vec![sections::LOADERS]
    }

    fn should_run(&self) -> bool {
        self.config.current().loaders.enabled
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let dependencies = self.dependencies();
        let wait = wait_for_dependencies(
            names::LOADERS,
            &dependencies,
            &self.gates,
            &self.config,
            &self.shutdown,
        );
        self.lifecycle
            .start(&self.shutdown, wait, || {
                self.gates.open(names::LOADERS);
                metrics::record_service_state(names::LOADERS, true);
                tracing::info!(tenant = %self.config.current().loaders.tenant, "Loader service started");
            })
            .await
    }

    async fn reload(&self) -> Result<(), ServiceError> {
        self.lifecycle
            .reload(|| {
                metrics::record_reload(names::LOADERS, ReloadOutcome::Applied);
                tracing::info!(tenant = %self.config.current().loaders.tenant, "Loader service reloaded");
            })
            .await
    }

    async fn shutdown(&self) -> Result<(), ServiceError> {
        self.lifecycle
            .stop(|| {
                self.gates.reset(names::LOADERS);
                metrics::record_service_state(names::LOADERS, false);
                tracing::info!("Loader service stopped");
            })
            .await
    }
}
