//! End-to-end engine scenarios over the in-memory backends.
//!
//! Debounce tests run on a paused clock, so `sleep` advances virtual time
//! and fires the upload timers deterministically.

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tempfile::tempdir;

use userdata_sync::{
    Connectivity, FileLocalStore, InMemoryGateway, LocalStore, MemoryLocalStore, Record,
    RecordKind, SyncEngine, SyncEngineConfig, SyncEvent, UserData, UserId,
};
use userdata_sync::record::Winner;

struct Harness {
    engine: Arc<SyncEngine>,
    store: Arc<MemoryLocalStore>,
    gateway: Arc<InMemoryGateway>,
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryLocalStore::new()), Arc::new(InMemoryGateway::new()))
}

fn harness_with(store: Arc<MemoryLocalStore>, gateway: Arc<InMemoryGateway>) -> Harness {
    let engine = SyncEngine::new(SyncEngineConfig::default(), store.clone(), gateway.clone());
    Harness { engine, store, gateway }
}

fn user() -> UserId {
    UserId::from("user-1")
}

fn rec(value: Value) -> Record {
    Record::from_json(value)
}

fn stamped(value: Value, at: DateTime<Utc>) -> Record {
    let mut record = rec(value);
    record.stamp(at);
    record
}

fn seed_local(store: &MemoryLocalStore, kind: RecordKind, record: &Record) {
    let key = SyncEngineConfig::default().key_for(kind).to_string();
    store.write(&key, &serde_json::to_string(record).unwrap()).unwrap();
}

async fn settle() {
    // Past the 500 ms debounce window
    tokio::time::sleep(Duration::from_millis(600)).await;
}

// =============================================================================
// Write path
// =============================================================================

#[tokio::test]
async fn test_empty_save_is_idempotent() {
    let h = harness();
    h.engine.start(None, Connectivity::Online).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;

    h.engine.save_settings(Record::new()).await;
    let once = h.engine.get_settings().await;
    h.engine.save_settings(Record::new()).await;
    let twice = h.engine.get_settings().await;

    assert!(once.same_content(&twice));
    assert_eq!(twice.get("theme"), Some(&json!("dark")));
    assert!(twice.last_saved() >= once.last_saved());
}

#[tokio::test]
async fn test_signed_out_save_stays_local() {
    let h = harness();
    h.engine.start(None, Connectivity::Online).await;

    h.engine.save_progress(rec(json!({"lesson-1": true}))).await;
    settle().await;

    assert_eq!(h.engine.get_progress().await.get("lesson-1"), Some(&json!(true)));
    assert!(h.store.raw("DHEProgress").is_some());
    assert_eq!(h.gateway.fetch_count(), 0);
    assert_eq!(h.gateway.upsert_count(), 0);
    assert!(h.engine.pending_entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_burst_into_one_upload() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;
    assert_eq!(h.gateway.upsert_count(), 0);

    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        h.engine.save_settings(rec(json!({ *key: i }))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.engine.scheduled_uploads(), vec![RecordKind::Settings]);
    assert_eq!(h.gateway.upsert_count(), 0);

    settle().await;

    assert_eq!(h.gateway.upsert_count(), 1);
    let row = h.gateway.row(&user()).unwrap();
    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        assert_eq!(row.settings.get(key), Some(&json!(i)), "key {key}");
    }
    assert_eq!(row.settings, h.engine.get_settings().await);
    assert!(h.engine.scheduled_uploads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_kinds_debounce_independently() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;

    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    h.engine.save_progress(rec(json!({"lesson-2": true}))).await;
    settle().await;

    assert_eq!(h.gateway.upsert_count(), 2);
    let row = h.gateway.row(&user()).unwrap();
    assert_eq!(row.settings.get("theme"), Some(&json!("dark")));
    assert_eq!(row.progress.get("lesson-2"), Some(&json!(true)));
}

#[tokio::test(start_paused = true)]
async fn test_upload_keeps_newer_remote_other_column() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;

    // Another device advanced progress after this one last looked
    let remote_progress = stamped(json!({"lesson-9": true}), Utc::now() + chrono::Duration::hours(1));
    h.gateway.seed(&user(), UserData::new(Record::new(), remote_progress.clone()));

    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    settle().await;

    let row = h.gateway.row(&user()).unwrap();
    assert_eq!(row.settings.get("theme"), Some(&json!("dark")));
    assert_eq!(row.progress, remote_progress);
}

// =============================================================================
// Read path
// =============================================================================

#[tokio::test]
async fn test_read_adopts_strictly_newer_remote() {
    let h = harness();
    let t1 = Utc::now() - chrono::Duration::hours(2);
    seed_local(&h.store, RecordKind::Settings, &stamped(json!({"theme": "dark"}), t1));
    h.engine.start(Some(user()), Connectivity::Online).await;

    let newer = stamped(json!({"theme": "light"}), Utc::now() + chrono::Duration::hours(1));
    h.gateway.seed(&user(), UserData::new(newer.clone(), Record::new()));

    assert_eq!(h.engine.get_settings().await, newer);
    // Persisted: visible even without the remote
    h.engine.on_connectivity_change(Connectivity::Offline).await;
    assert_eq!(h.engine.get_settings().await, newer);
}

#[tokio::test]
async fn test_read_keeps_local_when_not_older() {
    let h = harness();
    let now = Utc::now();
    let local = stamped(json!({"theme": "dark"}), now);
    seed_local(&h.store, RecordKind::Settings, &local);
    h.engine.start(Some(user()), Connectivity::Online).await;

    // Equal timestamp: local wins the tie
    h.gateway.seed(&user(), UserData::new(stamped(json!({"theme": "light"}), now), Record::new()));
    assert_eq!(h.engine.get_settings().await, local);

    h.gateway.seed(&user(), UserData::new(stamped(json!({"theme": "light"}), now - chrono::Duration::days(1)), Record::new()));
    assert_eq!(h.engine.get_settings().await, local);
}

#[tokio::test]
async fn test_read_offline_never_contacts_remote() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Offline).await;

    h.engine.get_settings().await;
    h.engine.get_progress().await;

    assert_eq!(h.gateway.fetch_count(), 0);
}

#[tokio::test]
async fn test_read_falls_back_to_local_on_fetch_failure() {
    let h = harness();
    h.engine.start(None, Connectivity::Online).await;
    h.engine.save_settings(rec(json!({"font": 16}))).await;
    h.gateway.set_offline(true);

    h.engine.on_auth_change(Some(user())).await;
    let settings = h.engine.get_settings().await;

    assert_eq!(settings.get("font"), Some(&json!(16)));
}

// =============================================================================
// Offline queue
// =============================================================================

#[tokio::test]
async fn test_offline_writes_queue_one_entry_per_kind() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Offline).await;

    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    h.engine.save_settings(rec(json!({"theme": "sepia"}))).await;

    let entries = h.engine.pending_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, RecordKind::Settings);
    assert_eq!(entries[0].payload.get("theme"), Some(&json!("sepia")));

    h.engine.save_progress(rec(json!({"lesson-1": true}))).await;
    assert_eq!(h.engine.pending_entries().len(), 2);
    assert_eq!(h.gateway.upsert_count(), 0);
    assert_eq!(h.gateway.fetch_count(), 0);
}

#[tokio::test]
async fn test_queue_survives_restart_on_disk() {
    let dir = tempdir().unwrap();
    let gateway = Arc::new(InMemoryGateway::new());

    {
        let store = Arc::new(FileLocalStore::new(dir.path()).unwrap());
        let engine = SyncEngine::new(SyncEngineConfig::default(), store, gateway.clone());
        engine.start(Some(user()), Connectivity::Offline).await;
        engine.save_progress(rec(json!({"lesson-4": true}))).await;
        engine.shutdown().await;
    }

    let store = Arc::new(FileLocalStore::new(dir.path()).unwrap());
    let engine = SyncEngine::new(SyncEngineConfig::default(), store, gateway.clone());
    assert_eq!(engine.pending_entries().len(), 1);

    engine.start(Some(user()), Connectivity::Online).await;

    assert!(engine.pending_entries().is_empty());
    let row = gateway.row(&user()).unwrap();
    assert_eq!(row.progress.get("lesson-4"), Some(&json!(true)));
}

#[tokio::test]
async fn test_reconnect_merges_before_replaying_queue() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Offline).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    assert_eq!(h.engine.pending_entries().len(), 1);

    // A newer edit from another device reached the remote meanwhile
    let remote = stamped(json!({"theme": "light"}), Utc::now() + chrono::Duration::minutes(5));
    h.gateway.seed(&user(), UserData::new(remote.clone(), Record::new()));

    h.engine.on_connectivity_change(Connectivity::Online).await;

    assert_eq!(h.engine.get_settings().await, remote);
    assert_eq!(h.gateway.row(&user()).unwrap().settings, remote);
    assert!(h.engine.pending_entries().is_empty());
}

#[tokio::test]
async fn test_reconnect_uploads_newer_queued_write() {
    let h = harness();
    let old = stamped(json!({"theme": "light"}), Utc::now() - chrono::Duration::days(1));
    h.gateway.seed(&user(), UserData::new(old, Record::new()));

    h.engine.start(Some(user()), Connectivity::Offline).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    h.engine.on_connectivity_change(Connectivity::Online).await;

    let row = h.gateway.row(&user()).unwrap();
    assert_eq!(row.settings.get("theme"), Some(&json!("dark")));
    assert!(h.engine.pending_entries().is_empty());
}

// =============================================================================
// Session transitions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_out_flushes_queued_write() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;
    h.gateway.set_fail_upserts(true);

    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    settle().await;
    assert_eq!(h.engine.pending_entries().len(), 1);

    h.gateway.set_fail_upserts(false);
    h.engine.on_auth_change(None).await;

    assert!(h.engine.pending_entries().is_empty());
    assert_eq!(h.gateway.row(&user()).unwrap().settings, h.engine.get_settings().await);
    assert!(h.engine.session().user.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_flushes_pending_debounce() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;

    h.engine.save_progress(rec(json!({"lesson-7": true}))).await;
    h.engine.on_auth_change(None).await;

    assert!(h.engine.scheduled_uploads().is_empty());
    let row = h.gateway.row(&user()).unwrap();
    assert_eq!(row.progress.get("lesson-7"), Some(&json!(true)));

    // No further remote activity once signed out
    let upserts = h.gateway.upsert_count();
    h.engine.save_progress(rec(json!({"lesson-8": true}))).await;
    settle().await;
    assert_eq!(h.gateway.upsert_count(), upserts);
}

#[tokio::test]
async fn test_sign_in_merge_scenario() {
    let h = harness();
    let local = rec(json!({"theme": "dark", "_meta": {"lastSaved": "2024-01-01T00:00:00Z"}}));
    let remote = rec(json!({"theme": "light", "_meta": {"lastSaved": "2024-06-01T00:00:00Z"}}));
    seed_local(&h.store, RecordKind::Settings, &local);
    h.gateway.seed(&user(), UserData::new(remote.clone(), Record::new()));

    h.engine.start(None, Connectivity::Online).await;
    let mut events = h.engine.subscribe();
    h.engine.on_auth_change(Some(user())).await;

    assert_eq!(h.engine.get_settings().await, remote);
    assert_eq!(h.gateway.row(&user()).unwrap().settings, remote);

    let mut synced = false;
    let mut degraded = None;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::DataSynced => synced = true,
            SyncEvent::MergeDegraded { kind, kept, discarded } => degraded = Some((kind, kept, discarded)),
            _ => {}
        }
    }
    assert!(synced);
    assert_eq!(degraded, Some((RecordKind::Settings, Winner::Remote, local)));
}

#[tokio::test]
async fn test_sign_in_pushes_local_only_data() {
    let h = harness();
    h.engine.start(None, Connectivity::Online).await;
    h.engine.save_progress(rec(json!({"lesson-1": true}))).await;

    h.engine.on_auth_change(Some(user())).await;

    let row = h.gateway.row(&user()).unwrap();
    assert_eq!(row.progress, h.engine.get_progress().await);
    assert!(h.engine.pending_entries().is_empty());
}

#[tokio::test]
async fn test_sign_in_offline_parks_local_data() {
    let h = harness();
    h.engine.start(None, Connectivity::Offline).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;

    h.engine.on_auth_change(Some(user())).await;

    assert_eq!(h.gateway.fetch_count(), 0);
    let kinds: Vec<_> = h.engine.pending_entries().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![RecordKind::Settings]);
}

#[tokio::test]
async fn test_switching_users_flushes_then_merges() {
    let h = harness();
    let other = UserId::from("user-2");
    h.engine.start(Some(user()), Connectivity::Offline).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    h.engine.on_connectivity_change(Connectivity::Online).await;
    assert!(h.gateway.row(&user()).is_some());

    h.engine.on_auth_change(Some(other.clone())).await;

    assert_eq!(h.engine.session().user, Some(other.clone()));
    let row = h.gateway.row(&other).unwrap();
    assert_eq!(row.settings.get("theme"), Some(&json!("dark")));
}

#[tokio::test]
async fn test_repeated_auth_state_is_noop() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;
    let fetches = h.gateway.fetch_count();

    h.engine.on_auth_change(Some(user())).await;
    h.engine.on_connectivity_change(Connectivity::Online).await;

    assert_eq!(h.gateway.fetch_count(), fetches);
}

#[tokio::test]
async fn test_session_watch_reflects_transitions() {
    let h = harness();
    let rx = h.engine.session_receiver();
    h.engine.start(None, Connectivity::Offline).await;

    h.engine.on_connectivity_change(Connectivity::Online).await;
    h.engine.on_auth_change(Some(user())).await;

    let session = rx.borrow().clone();
    assert_eq!(session.user, Some(user()));
    assert!(session.connectivity.is_online());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_scheduled_uploads() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;
    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;

    h.engine.shutdown().await;

    assert_eq!(h.engine.state(), userdata_sync::EngineState::Stopped);
    assert_eq!(h.gateway.row(&user()).unwrap().settings.get("theme"), Some(&json!("dark")));
}

#[tokio::test(start_paused = true)]
async fn test_save_after_shutdown_stays_local() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;
    h.engine.shutdown().await;
    let uploads = h.gateway.upsert_count();

    h.engine.save_settings(rec(json!({"theme": "dark"}))).await;
    settle().await;

    assert!(h.engine.scheduled_uploads().is_empty());
    assert!(h.engine.pending_entries().is_empty());
    assert_eq!(h.gateway.upsert_count(), uploads);
    let key = SyncEngineConfig::default().key_for(RecordKind::Settings).to_string();
    assert!(h.store.raw(&key).unwrap().contains("dark"));
}

// =============================================================================
// Multi-threaded runtime
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_keep_every_key() {
    let h = harness();
    h.engine.start(None, Connectivity::Online).await;

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine.save_settings(rec(json!({ format!("k{i}"): i }))).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let settings = h.engine.get_settings().await;
    for i in 0..200 {
        assert_eq!(settings.get(&format!("k{i}")), Some(&json!(i)), "k{i} lost");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signed_in_saves_reach_remote() {
    let h = harness();
    h.engine.start(Some(user()), Connectivity::Online).await;

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    engine.save_settings(rec(json!({ format!("s{i}"): i }))).await;
                } else {
                    engine.save_progress(rec(json!({ format!("p{i}"): true }))).await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Well inside the debounce window, so shutdown performs the uploads
    h.engine.shutdown().await;

    let row = h.gateway.row(&user()).unwrap();
    for i in 0..50 {
        if i % 2 == 0 {
            assert_eq!(row.settings.get(&format!("s{i}")), Some(&json!(i)));
        } else {
            assert_eq!(row.progress.get(&format!("p{i}")), Some(&json!(true)));
        }
    }
    assert!(h.engine.pending_entries().is_empty());
}
