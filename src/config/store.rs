//! Live configuration snapshot.
//!
//! # Responsibilities
//! - Hold the current `EngineConfig` behind an atomically swappable pointer
//! - Replace the whole snapshot or a single section from a file
//! - Signal the reload registry for every section that changed
//!
//! # Design Decisions
//! - Readers load an `Arc` snapshot and never block writers
//! - Writers are serialized so concurrent reloads cannot lose each other's edits
//! - A change to a section that decides whether the data store must run also
//!   signals `data_db`, so the store follows its consumers

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{sections, EngineConfig};
use crate::lifecycle::reload::ReloadRegistry;

/// Shared, swappable configuration with reload signalling.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<ArcSwap<EngineConfig>>,
    registry: ReloadRegistry,
    writer: Arc<Mutex<()>>,
}

impl ConfigStore {
    pub fn new(config: EngineConfig, registry: ReloadRegistry) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            registry,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<EngineConfig> {
        self.current.load_full()
    }

    pub fn registry(&self) -> &ReloadRegistry {
        &self.registry
    }

    /// Edit the snapshot in place without signalling anyone.
    ///
    /// Returns the sections that changed; callers decide what to notify.
    pub fn update<F>(&self, edit: F) -> Vec<&'static str>
    where
        F: FnOnce(&mut EngineConfig),
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let old = self.current.load_full();
        let mut new = EngineConfig::clone(&old);
        edit(&mut new);
        let changed = old.changed_sections(&new);
        self.current.store(Arc::new(new));
        changed
    }

    /// Replace the whole snapshot and signal every changed section.
    pub fn apply(&self, config: EngineConfig) -> Vec<&'static str> {
        let changed = {
            let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = self.current.load().changed_sections(&config);
            self.current.store(Arc::new(config));
            changed
        };

        if changed.is_empty() {
            tracing::debug!("Configuration unchanged");
        } else {
            tracing::info!(sections = ?changed, "Configuration updated");
            self.signal(&changed);
        }
        changed
    }

    /// Replace one section with its content in the file at `path` and
    /// signal it, whether or not its content changed.
    pub fn reload_section(&self, path: &Path, section: &str) -> Result<(), ConfigError> {
        let section = sections::ALL
            .into_iter()
            .find(|known| *known == section)
            .ok_or_else(|| ConfigError::UnknownSection(section.to_string()))?;
        let incoming = load_config(path)?;

        {
            let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let mut new = EngineConfig::clone(&self.current.load());
            new.replace_section(section, &incoming);
            self.current.store(Arc::new(new));
        }

        tracing::info!(section = %section, path = ?path, "Configuration section reloaded");
        self.signal(&[section]);
        Ok(())
    }

    /// Load the whole file at `path` and apply it.
    pub fn reload_from_path(&self, path: &Path) -> Result<Vec<&'static str>, ConfigError> {
        let config = load_config(path)?;
        Ok(self.apply(config))
    }

    /// Signal one section without changing the configuration.
    pub fn notify(&self, section: &str) {
        self.registry.notify(section);
    }

    fn signal(&self, changed: &[&'static str]) {
        for section in changed {
            self.registry.notify(section);
        }
        let consumer_changed = changed
            .iter()
            .any(|section| sections::DATA_DB_CONSUMERS.contains(section));
        if consumer_changed && !changed.contains(&sections::DATA_DB) {
            self.registry.notify(sections::DATA_DB);
        }
    }
}
