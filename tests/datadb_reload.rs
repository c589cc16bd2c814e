//! Data store service start, reload and hot swap through the assembled engine.

use std::time::Duration;
use serde_json::json;

use charging_engine::config::sections;
use charging_engine::lifecycle::StartupError;
use charging_engine::services::{names, Service, ServiceError};
use charging_engine::storage::{ConnectParams, StoreError};

mod common;

use common::{harness, mongo_config, wait_until};

#[tokio::test]
async fn test_start_publishes_connection() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();

    let data_db = h.engine.data_db();
    assert!(data_db.is_running());
    assert!(data_db.handle().is_ready());
    let connection = data_db.handle().get_connection().unwrap();
    assert_eq!(connection.address(), "127.0.0.1:27017");
    assert!(h.engine.manager().is_running(names::ATTRIBUTES));
}

#[tokio::test]
async fn test_reload_to_new_backend_swaps_connection() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();
    let before = h.engine.data_db().handle().get_connection().unwrap();

    h.store.update(|c| {
        c.data_db.db_type = "*mysql".to_string();
        c.data_db.port = 3306;
    });
    h.store.notify(sections::DATA_DB);
    h.engine.data_db().reload().await.unwrap();

    let data_db = h.engine.data_db();
    assert!(data_db.is_running());
    let after = data_db.handle().get_connection().unwrap();
    assert_ne!(after.id(), before.id());
    assert_eq!(after.address(), "127.0.0.1:3306");
    assert!(matches!(before.store().get("any").await, Err(StoreError::Closed(_))));
}

#[tokio::test]
async fn test_empty_db_type_fails_start() {
    let mut config = mongo_config(false, false);
    config.sessions.enabled = true;
    config.data_db.db_type = String::new();
    let h = harness(config);

    match h.engine.start().await {
        Err(StartupError::Failed(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].service, names::DATA_DB);
            assert_eq!(failures[0].error.to_string(), "unsupported db_type <>");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!h.engine.data_db().is_running());
    assert!(h.engine.data_db().handle().get_connection().is_none());
}

#[tokio::test]
async fn test_bad_option_keeps_previous_connection() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();
    let before = h.engine.data_db().handle().get_connection().unwrap().id();

    h.store.update(|c| {
        c.data_db
            .opts
            .insert("query_timeout".to_string(), toml::Value::Boolean(false));
    });
    let err = h.engine.data_db().reload().await.unwrap_err();

    assert!(matches!(err, ServiceError::Store(StoreError::Option(_))));
    assert_eq!(err.to_string(), "cannot convert field: false to duration");
    assert!(h.engine.data_db().is_running());
    assert_eq!(h.engine.data_db().handle().get_connection().unwrap().id(), before);
}

#[tokio::test]
async fn test_repeated_reload_is_noop() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();
    let before = h.engine.data_db().handle().get_connection().unwrap().id();

    for _ in 0..3 {
        h.engine.data_db().reload().await.unwrap();
    }
    assert_eq!(h.engine.data_db().handle().get_connection().unwrap().id(), before);
}

#[tokio::test]
async fn test_outdated_store_fails_start() {
    let config = mongo_config(false, true);
    let h = harness(config.clone());
    let params = ConnectParams::from_config(&config.data_db).unwrap();
    let mut versions = charging_engine::storage::versions::current_versions();
    versions.insert("Attributes".to_string(), 1);
    h.connector.seed_versions(&params, versions);

    let err = h.engine.data_db().start().await.unwrap_err();
    assert!(err.to_string().starts_with("migration needed for <Attributes>"));
    assert!(!h.engine.data_db().is_running());
}

#[tokio::test]
async fn test_unreachable_host_during_reload_keeps_connection() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();
    let before = h.engine.data_db().handle().get_connection().unwrap().id();

    h.connector.set_unreachable("10.0.0.9", true);
    h.store.update(|c| c.data_db.host = "10.0.0.9".to_string());
    let err = h.engine.data_db().reload().await.unwrap_err();

    assert!(err.to_string().contains("connection refused"));
    assert!(h.engine.data_db().is_running());
    assert_eq!(h.engine.data_db().handle().get_connection().unwrap().id(), before);
}

#[tokio::test]
async fn test_consumers_follow_swapped_store() {
    let h = harness(mongo_config(true, true));
    h.engine.start().await.unwrap();

    let loaded = h
        .engine
        .loaders()
        .load_attribute_profiles(vec![("ATTR_1".to_string(), json!({"Weight": 10}))])
        .await
        .unwrap();
    assert_eq!(loaded, 1);
    assert_eq!(
        h.engine
            .attributes()
            .attribute_profile("cgrates.org", "ATTR_1")
            .await
            .unwrap(),
        Some(json!({"Weight": 10}))
    );

    h.store.update(|c| {
        c.data_db.db_type = "*postgres".to_string();
        c.data_db.port = 5432;
    });
    h.engine.data_db().reload().await.unwrap();

    // The new store is empty; the attribute service reads it, not the old one.
    assert_eq!(
        h.engine
            .attributes()
            .attribute_profile("cgrates.org", "ATTR_1")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_reload_signal_reconciles_through_listener() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();
    let before = h.engine.data_db().handle().get_connection().unwrap().id();

    h.store.update(|c| c.data_db.port = 27018);
    h.store.notify(sections::DATA_DB);

    let handle = h.engine.data_db().handle();
    assert!(
        wait_until(Duration::from_secs(2), || {
            handle.get_connection().map(|c| c.id() != before).unwrap_or(false)
        })
        .await
    );
    assert_eq!(handle.get_connection().unwrap().address(), "127.0.0.1:27018");
}

#[tokio::test]
async fn test_disabling_consumers_stops_data_db() {
    let mut config = mongo_config(false, false);
    config.sessions.enabled = true;
    let h = harness(config.clone());
    h.engine.start().await.unwrap();
    assert!(h.engine.data_db().is_running());

    config.sessions.enabled = false;
    let changed = h.store.apply(config);
    assert_eq!(changed, vec![sections::SESSIONS]);

    let data_db = h.engine.data_db().clone();
    assert!(wait_until(Duration::from_secs(2), || !data_db.is_running()).await);
    assert!(!h.engine.gates().is_open(names::DATA_DB));
}

#[tokio::test]
async fn test_enabling_consumer_starts_data_db() {
    let h = harness(mongo_config(false, false));
    h.engine.start().await.unwrap();
    assert!(!h.engine.data_db().is_running());

    h.store.apply(mongo_config(false, true));

    let engine = &h.engine;
    assert!(
        wait_until(Duration::from_secs(2), || {
            engine.data_db().is_running() && engine.loaders().is_running()
        })
        .await
    );
}

#[tokio::test]
async fn test_reload_section_from_file() {
    let h = harness(mongo_config(true, false));
    h.engine.start().await.unwrap();

    let path = std::env::temp_dir().join(format!("engine-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"
        [data_db]
        db_type = "*redis"
        host = "127.0.0.1"
        port = 6380

        [attributes]
        enabled = false
        "#,
    )
    .unwrap();

    h.store.reload_section(&path, sections::DATA_DB).unwrap();
    std::fs::remove_file(&path).unwrap();

    // Only the data_db section was taken from the file.
    assert!(h.store.current().attributes.enabled);
    let handle = h.engine.data_db().handle();
    assert!(
        wait_until(Duration::from_secs(2), || {
            handle
                .get_connection()
                .map(|c| c.address() == "127.0.0.1:6380")
                .unwrap_or(false)
        })
        .await
    );
}
