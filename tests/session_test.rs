//! Session lifetime: issue, expiry and eviction.

mod common;

use common::{FakeDatabase, FakeLlm, Harness, test_config};
use nl2sql_orchestrator::models::SessionContext;
use nl2sql_orchestrator::session::SessionStore;
use std::time::Duration;

#[tokio::test]
async fn test_never_issued_id_is_absent() {
    let store = SessionStore::new(Duration::from_secs(60));
    store.create().await;

    assert!(store.get("never-issued").await.is_none());
    assert!(store.get("").await.is_none());
}

#[tokio::test]
async fn test_expired_session_reads_as_absent() {
    let store = SessionStore::new(Duration::from_millis(50));
    let session = store.create().await;
    assert!(store.get(&session.id).await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;

    // Still stored until a read evicts it
    assert_eq!(store.len().await, 1);
    assert!(store.get(&session.id).await.is_none());
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn test_update_refreshes_activity() {
    let store = SessionStore::new(Duration::from_millis(200));
    let session = store.create().await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    let session = store.update(session).await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(store.get(&session.id).await.is_some());
}

#[tokio::test]
async fn test_update_persists_changes() {
    let store = SessionStore::new(Duration::from_secs(60));
    let mut session = store.create().await;
    session
        .preferences
        .insert("format".to_string(), serde_json::json!("table"));

    store.update(session.clone()).await;

    let stored = store.get(&session.id).await.unwrap();
    assert_eq!(stored.preferences["format"], "table");
}

#[tokio::test]
async fn test_insert_and_delete() {
    let store = SessionStore::new(Duration::from_secs(60));
    let session = SessionContext::new();
    store.insert(session.clone()).await;

    assert!(store.get(&session.id).await.is_some());
    assert!(store.delete(&session.id).await.is_some());
    assert!(store.delete(&session.id).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_orchestrator_purges_expired_sessions_and_connections() {
    let mut config = test_config();
    config.session_timeout_minutes = 0;
    let h = Harness::with(config, FakeLlm::new(), FakeDatabase::new());

    let id = h.connected().await;
    assert_eq!(h.db.open_count(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.orchestrator.purge_expired_sessions().await, 1);
    assert_eq!(h.db.open_count(), 0);
    assert!(h.orchestrator.session(&id).await.is_none());
}

#[tokio::test]
async fn test_expired_session_id_gets_a_new_session() {
    let mut config = test_config();
    config.session_timeout_minutes = 0;
    let h = Harness::with(config, FakeLlm::new(), FakeDatabase::new());

    let id = h.connected().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = h.turn("help", "hello again", Some(&id)).await;

    assert_ne!(response.session_id.as_deref(), Some(id.as_str()));
    // The expired session's connection went with it
    assert_eq!(h.db.open_count(), 0);
    assert_eq!(h.orchestrator.purge_expired_sessions().await, 1);
    assert_eq!(h.db.open_count(), 0);
}

#[tokio::test]
async fn test_reading_expired_session_closes_connection() {
    let mut config = test_config();
    config.session_timeout_minutes = 0;
    let h = Harness::with(config, FakeLlm::new(), FakeDatabase::new());

    let id = h.connected().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.orchestrator.session(&id).await.is_none());
    assert_eq!(h.db.open_count(), 0);
}

#[tokio::test]
async fn test_sweep_waits_for_turn_in_flight() {
    let h = Harness::with_session_timeout(Duration::from_millis(300));
    let id = h.connected().await;

    // The turn resolves the session while it is live, then stalls in the classifier
    h.llm.set_classify_delay(Duration::from_millis(500));
    h.llm.push_label("connection");
    let orchestrator = h.orchestrator.clone();
    let turn_id = id.clone();
    let turn = tokio::spawn(async move { orchestrator.process("check status", Some(&turn_id)).await });

    tokio::time::sleep(Duration::from_millis(350)).await;
    let purged = h.orchestrator.purge_expired_sessions().await;
    let response = turn.await.unwrap();

    assert_eq!(purged, 0);
    assert!(response.success, "{}", response.message);
    assert_eq!(response.session_id.as_deref(), Some(id.as_str()));
    assert_eq!(h.db.open_count(), 1);
    let session = h.orchestrator.session(&id).await.unwrap();
    assert!(session.is_connected());
}
