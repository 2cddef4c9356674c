//! Wiring test: local edits reach the remote store through the storage-change
//! listener, debounce queue and reachability poller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use medsync_core::models::{DietEntry, OwnerId, Record, RecordBody, RecordKind};
use medsync_core::remote::MemoryRemoteStore;
use medsync_core::store::{document_path, RemoteStore};
use medsync_core::sync::{ReachabilityProbe, SyncEngine, SyncStatus};
use medsync_core::{RecordService, SyncSettings};

struct AlwaysReachable;

#[async_trait]
impl ReachabilityProbe for AlwaysReachable {
    async fn is_reachable(&self) -> bool {
        true
    }
}

fn owner() -> OwnerId {
    OwnerId::new("owner-a").unwrap()
}

fn settings() -> SyncSettings {
    SyncSettings::new("http://localhost:9", owner())
        .unwrap()
        .with_poll_interval(Duration::from_secs(1))
}

fn breakfast(description: &str) -> RecordBody {
    RecordBody::DietEntry(DietEntry {
        meal: "breakfast".to_string(),
        description: description.to_string(),
        ..DietEntry::default()
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn local_edit_is_pushed_after_debounce() {
    let records = RecordService::open_in_memory().await.unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::start(
        &records,
        remote.clone(),
        Arc::new(AlwaysReachable),
        &settings(),
    );

    let mut state = engine.subscribe();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|state| state.is_online))
        .await
        .unwrap()
        .unwrap();

    let record = records.create(&owner(), breakfast("oatmeal")).await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|state| state.last_success_at.is_some() && !state.is_syncing),
    )
    .await
    .unwrap()
    .unwrap();

    let path = document_path(RecordKind::DietEntry, &owner(), &record.id);
    assert!(remote.document(&path).is_some());
    assert_eq!(records.count_dirty(RecordKind::DietEntry).await.unwrap(), 0);
    assert_eq!(engine.state().status(), SyncStatus::Synced);

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn force_full_sync_pushes_then_pulls() {
    let records = RecordService::open_in_memory().await.unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let from_other_device = Record::new(owner(), breakfast("eggs"));
    remote
        .upsert(RecordKind::DietEntry, &owner(), &from_other_device)
        .await
        .unwrap();

    let engine = SyncEngine::start(
        &records,
        remote.clone(),
        Arc::new(AlwaysReachable),
        &settings(),
    );
    engine.set_online(true);
    let local = records.create(&owner(), breakfast("toast")).await.unwrap();

    let report = engine.force_full_sync().await.unwrap();

    assert_eq!(report.upload.remote_writes(), 1);
    assert_eq!(report.download.kinds[&RecordKind::DietEntry].downloaded, 1);
    assert!(remote
        .document(&document_path(RecordKind::DietEntry, &owner(), &local.id))
        .is_some());
    let pulled = records
        .get(RecordKind::DietEntry, &from_other_device.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!pulled.dirty);

    engine.shutdown().await;
}
