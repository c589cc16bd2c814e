//! Stored data versions.
//!
//! Every data store carries the schema version of each subsystem's data. A
//! store is only accepted when none of its versions is older than what this
//! build expects; a store without versions is new and gets stamped.

use std::collections::BTreeMap;

use crate::storage::{DataStore, StoreError};

/// Subsystem → data version.
pub type Versions = BTreeMap<String, i64>;

/// Versions this build reads and writes.
pub fn current_versions() -> Versions {
    [
        ("Accounts", 3),
        ("ActionPlans", 3),
        ("ActionProfiles", 1),
        ("ActionTriggers", 2),
        ("Actions", 2),
        ("Attributes", 6),
        ("Chargers", 2),
        ("Destinations", 1),
        ("Dispatchers", 2),
        ("LoadIDs", 1),
        ("RQF", 5),
        ("RateProfiles", 1),
        ("RatingPlan", 1),
        ("RatingProfile", 1),
        ("Resource", 1),
        ("ReverseDestinations", 1),
        ("Routes", 2),
        ("SharedGroups", 2),
        ("StatS", 4),
        ("Subscribers", 1),
        ("Thresholds", 4),
        ("Timing", 1),
    ]
    .into_iter()
    .map(|(name, version)| (name.to_string(), version))
    .collect()
}

/// Subsystems whose stored version is missing or older than `expected`.
pub fn outdated(stored: &Versions, expected: &Versions) -> Vec<String> {
    expected
        .iter()
        .filter(|(name, version)| stored.get(*name).map_or(true, |stored| stored < *version))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Accept a store if its data is current, stamping it when empty.
pub async fn check_versions(store: &dyn DataStore) -> Result<(), StoreError> {
    let stored = store.versions().await?;
    let expected = current_versions();

    if stored.is_empty() {
        store.set_versions(&expected, true).await?;
        tracing::info!(db_type = %store.db_type(), "Stamped empty data store with current versions");
        return Ok(());
    }

    let outdated = outdated(&stored, &expected);
    if outdated.is_empty() {
        Ok(())
    } else {
        tracing::warn!(db_type = %store.db_type(), outdated = ?outdated, "Data store needs migration");
        Err(StoreError::MigrationNeeded(outdated))
    }
}
