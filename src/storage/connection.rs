//! Connection parameters and live connections.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::schema::{DataDbConfig, ItemOpt};
use crate::storage::options::ConnectOptions;
use crate::storage::versions::check_versions;
use crate::storage::{Connector, DataStore, DbType, StoreError};

/// Everything needed to open a store, validated and typed.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub options: ConnectOptions,
    pub items: BTreeMap<String, ItemOpt>,
}

impl ConnectParams {
    /// Validate and convert a data store descriptor.
    pub fn from_config(config: &DataDbConfig) -> Result<Self, StoreError> {
        let db_type: DbType = config.db_type.parse()?;
        let options = ConnectOptions::from_opts(&config.opts)?;
        let port = if config.port == 0 {
            db_type.default_port()
        } else {
            config.port
        };

        Ok(Self {
            db_type,
            host: config.host.clone(),
            port,
            name: config.name.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            options,
            items: config.items.clone(),
        })
    }

    /// `host:port` of the backend.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("db_type", &self.db_type)
            .field("address", &self.address())
            .field("name", &self.name)
            .field("user", &self.user)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A usable, version-checked connection to a data store.
///
/// Immutable once built. The id identifies this connection across swaps.
pub struct Connection {
    id: Uuid,
    params: ConnectParams,
    store: Arc<dyn DataStore>,
}

impl Connection {
    /// Connect and verify the stored data versions.
    ///
    /// The store is closed again when the version check fails, so a rejected
    /// connection never leaks.
    pub async fn open(connector: &dyn Connector, params: ConnectParams) -> Result<Self, StoreError> {
        let store = connector.connect(&params).await?;
        if let Err(e) = check_versions(store.as_ref()).await {
            if let Err(close_err) = store.close().await {
                tracing::warn!(error = %close_err, "Failed to close rejected data store connection");
            }
            return Err(e);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            params,
            store,
        })
    }

    /// Identity of this connection.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn db_type(&self) -> DbType {
        self.params.db_type
    }

    pub fn address(&self) -> String {
        self.params.address()
    }

    pub fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// Backend handle.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("db_type", &self.params.db_type)
            .field("address", &self.params.address())
            .finish()
    }
}
