//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files, and
//! every section is addressable by its identifier for per-section reloads.

use std::collections::BTreeMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::duration::{parse_duration, DurationError};

/// Section identifiers, used as keys of the reload registry.
pub mod sections {
    pub const GENERAL: &str = "general";
    pub const DATA_DB: &str = "data_db";
    pub const ATTRIBUTES: &str = "attributes";
    pub const LOADERS: &str = "loaders";
    pub const ANALYZERS: &str = "analyzers";
    pub const SESSIONS: &str = "sessions";
    pub const OBSERVABILITY: &str = "observability";

    /// Every section, in file order.
    pub const ALL: [&str; 7] = [
        GENERAL,
        DATA_DB,
        ATTRIBUTES,
        LOADERS,
        ANALYZERS,
        SESSIONS,
        OBSERVABILITY,
    ];

    /// Sections whose `enabled` flag decides whether the data store must run.
    pub const DATA_DB_CONSUMERS: [&str; 3] = [ATTRIBUTES, LOADERS, SESSIONS];
}

/// Root configuration for the engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Process-wide settings.
    pub general: GeneralConfig,

    /// Data store connection settings.
    pub data_db: DataDbConfig,

    /// Attribute service settings.
    pub attributes: AttributesConfig,

    /// Loader service settings.
    pub loaders: LoadersConfig,

    /// Analyzer service settings.
    pub analyzers: AnalyzersConfig,

    /// Session service settings (consumer of the data store).
    pub sessions: SessionsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Sections whose content differs between `self` and `other`.
    pub fn changed_sections(&self, other: &EngineConfig) -> Vec<&'static str> {
        sections::ALL
            .into_iter()
            .filter(|section| !self.section_eq(other, section))
            .collect()
    }

    /// Copy one section from `other` into `self`.
    ///
    /// Returns false when the section identifier is unknown.
    pub fn replace_section(&mut self, section: &str, other: &EngineConfig) -> bool {
        match section {
            sections::GENERAL => self.general = other.general.clone(),
            sections::DATA_DB => self.data_db = other.data_db.clone(),
            sections::ATTRIBUTES => self.attributes = other.attributes.clone(),
            sections::LOADERS => self.loaders = other.loaders.clone(),
            sections::ANALYZERS => self.analyzers = other.analyzers.clone(),
            sections::SESSIONS => self.sessions = other.sessions.clone(),
            sections::OBSERVABILITY => self.observability = other.observability.clone(),
            _ => return false,
        }
        true
    }

    /// True when any consumer of the data store is enabled.
    pub fn data_db_required(&self) -> bool {
        self.attributes.enabled || self.loaders.enabled || self.sessions.enabled
    }

    fn section_eq(&self, other: &EngineConfig, section: &str) -> bool {
        match section {
            sections::GENERAL => self.general == other.general,
            sections::DATA_DB => self.data_db == other.data_db,
            sections::ATTRIBUTES => self.attributes == other.attributes,
            sections::LOADERS => self.loaders == other.loaders,
            sections::ANALYZERS => self.analyzers == other.analyzers,
            sections::SESSIONS => self.sessions == other.sessions,
            sections::OBSERVABILITY => self.observability == other.observability,
            _ => true,
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Identifier of this engine node, used in logs.
    pub node_id: String,

    /// Upper bound on how long a service waits for its dependencies.
    /// Absent means wait until shutdown.
    pub dependency_timeout: Option<String>,

    /// Time allowed for every service to stop once shutdown fires.
    pub shutdown_timeout: String,
}

impl GeneralConfig {
    /// Parsed dependency wait bound.
    pub fn dependency_timeout(&self) -> Result<Option<Duration>, DurationError> {
        self.dependency_timeout.as_deref().map(parse_duration).transpose()
    }

    /// Parsed shutdown bound.
    pub fn shutdown_timeout(&self) -> Result<Duration, DurationError> {
        parse_duration(&self.shutdown_timeout)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            node_id: "engine".to_string(),
            dependency_timeout: None,
            shutdown_timeout: "10s".to_string(),
        }
    }
}

/// Data store descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataDbConfig {
    /// Backend type, e.g. `*redis`, `*mongo`, `*internal`.
    pub db_type: String,

    /// Backend host.
    pub host: String,

    /// Backend port (0 selects the backend's default port).
    pub port: u16,

    /// Database name or index.
    pub name: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Backend options; values are converted to typed options on connect.
    pub opts: BTreeMap<String, toml::Value>,

    /// Per-entity replication settings.
    pub items: BTreeMap<String, ItemOpt>,

    /// Connections used for remote lookups of missing items.
    pub remote_conns: Vec<String>,

    /// Connections items are replicated to.
    pub replication_conns: Vec<String>,
}

impl Default for DataDbConfig {
    fn default() -> Self {
        Self {
            db_type: "*redis".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            name: "10".to_string(),
            user: "cgrates".to_string(),
            password: String::new(),
            opts: default_data_db_opts(),
            items: default_items(),
            remote_conns: Vec::new(),
            replication_conns: Vec::new(),
        }
    }
}

fn default_data_db_opts() -> BTreeMap<String, toml::Value> {
    use toml::Value;
    BTreeMap::from([
        ("query_timeout".to_string(), Value::String("10s".into())),
        ("redis_cluster".to_string(), Value::Boolean(false)),
        ("redis_cluster_sync".to_string(), Value::String("5s".into())),
        ("redis_cluster_ondown_delay".to_string(), Value::String("0".into())),
        ("redis_sentinel".to_string(), Value::String(String::new())),
        ("redis_tls".to_string(), Value::Boolean(false)),
        ("redis_client_certificate".to_string(), Value::String(String::new())),
        ("redis_client_key".to_string(), Value::String(String::new())),
        ("redis_ca_certificate".to_string(), Value::String(String::new())),
    ])
}

/// Entities stored in the data store.
pub const DATA_DB_ITEMS: [&str; 20] = [
    "*accounts",
    "*actions",
    "*action_plans",
    "*action_triggers",
    "*shared_groups",
    "*timings",
    "*destinations",
    "*reverse_destinations",
    "*rating_plans",
    "*rating_profiles",
    "*resource_profiles",
    "*resources",
    "*statqueue_profiles",
    "*statqueues",
    "*threshold_profiles",
    "*thresholds",
    "*filters",
    "*route_profiles",
    "*attribute_profiles",
    "*charger_profiles",
];

fn default_items() -> BTreeMap<String, ItemOpt> {
    DATA_DB_ITEMS
        .iter()
        .map(|item| (item.to_string(), ItemOpt::default()))
        .collect()
}

/// Replication settings of one stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ItemOpt {
    /// Replicate writes to `replication_conns`.
    pub replicate: bool,

    /// Look up missing items over `remote_conns`.
    pub remote: bool,
}

/// Attribute service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AttributesConfig {
    pub enabled: bool,

    /// Use the filter indexes when selecting profiles.
    pub indexed_selects: bool,

    /// Number of attribute passes applied per event.
    pub process_runs: u32,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            indexed_selects: true,
            process_runs: 1,
        }
    }
}

/// Loader service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadersConfig {
    pub enabled: bool,

    /// Tenant applied to loaded items that carry none.
    pub tenant: String,
}

impl Default for LoadersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tenant: "cgrates.org".to_string(),
        }
    }
}

/// Analyzer service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzersConfig {
    pub enabled: bool,

    /// How often expired captures are removed.
    pub cleanup_interval: String,

    /// How long a capture is kept.
    pub ttl: String,
}

impl Default for AnalyzersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cleanup_interval: "1h".to_string(),
            ttl: "24h".to_string(),
        }
    }
}

/// Session service settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SessionsConfig {
    pub enabled: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
