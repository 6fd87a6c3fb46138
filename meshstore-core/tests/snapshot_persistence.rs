//! Snapshot save/restore through the file backend

use std::sync::Arc;
use std::time::Duration;

use meshstore_core::core_data::payloads::{AlertLevel, AlertNotice, TextMessage};
use meshstore_core::core_data::{
    AddRequest, FileSnapshotPersistence, ManualClock, PrivilegedKeys, ProtectedData, RemoveRequest,
    SnapshotPersistence, StorageService,
};
use meshstore_core::test_utils::{keypair, test_codec, test_registry};

const NOW: i64 = 1_700_000_000_000;
const DAY: Duration = Duration::from_secs(24 * 3600);

fn text(service: &StorageService, author: u8, body: &str, created: i64) -> AddRequest {
    let kp = keypair(author);
    let req = AddRequest::sign(ProtectedData::authenticated(TextMessage::new(body, &kp.public_key())), 1, created, &kp);
    service.add(&req).unwrap();
    req
}

#[tokio::test]
async fn test_restart_restores_entries_and_tombstones() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = FileSnapshotPersistence::new(dir.path(), Arc::new(test_codec())).unwrap();
    let clock = Arc::new(ManualClock::new(NOW));

    let before = StorageService::builder(test_registry()).with_clock(clock.clone()).build();
    let kept = text(&before, 1, "survives restart", NOW);
    let removed = text(&before, 2, "removed before restart", NOW);
    before.remove(&RemoveRequest::sign(removed.map_key(), 2, NOW, &keypair(2))).unwrap();

    assert_eq!(before.save_to(&persistence).await.unwrap(), 2);

    let after = StorageService::builder(test_registry()).with_clock(clock).build();
    assert_eq!(after.load_from(&persistence).await.unwrap(), 2);

    assert_eq!(after.get_sequence_number(&kept.map_key()), 1);
    assert!(after.get(&removed.map_key()).unwrap().is_tombstone());
    // Tombstone still blocks a replay of the original add
    assert!(after.add(&removed).is_err());
}

#[tokio::test]
async fn test_restore_prunes_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = FileSnapshotPersistence::new(dir.path(), Arc::new(test_codec())).unwrap();
    let clock = Arc::new(ManualClock::new(NOW));

    let before = StorageService::builder(test_registry()).with_clock(clock.clone()).build();
    text(&before, 1, "old", NOW);
    clock.advance(DAY * 5);
    let fresh = text(&before, 2, "fresh", NOW + 5 * 86_400_000);
    before.save_to(&persistence).await.unwrap();

    clock.advance(DAY * 6);
    let after = StorageService::builder(test_registry()).with_clock(clock).build();
    assert_eq!(after.load_from(&persistence).await.unwrap(), 1);
    assert!(after.get(&fresh.map_key()).is_some());
}

#[tokio::test]
async fn test_restore_drops_revoked_authorized_entries() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = FileSnapshotPersistence::new(dir.path(), Arc::new(test_codec())).unwrap();
    let privileged = keypair(9);
    let author = keypair(1);
    let keys = Arc::new(PrivilegedKeys::with_keys([privileged.public_key()]));

    let before = StorageService::builder(test_registry())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_privileged_keys(AlertNotice::TYPE_NAME, keys)
        .build();
    let alert = AlertNotice::new(AlertLevel::Emergency, NOW, "evacuate");
    before
        .add(&AddRequest::sign(ProtectedData::authorized(alert, &privileged, false), 1, NOW, &author))
        .unwrap();
    before.save_to(&persistence).await.unwrap();

    // Same snapshot, but the role was revoked in the meantime
    let after = StorageService::builder(test_registry())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_privileged_keys(AlertNotice::TYPE_NAME, Arc::new(PrivilegedKeys::new()))
        .build();
    assert_eq!(after.load_from(&persistence).await.unwrap(), 0);
}

#[tokio::test]
async fn test_restore_respects_map_size() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = FileSnapshotPersistence::new(dir.path(), Arc::new(test_codec())).unwrap();
    let clock = Arc::new(ManualClock::new(NOW));

    let before = StorageService::builder(test_registry()).with_clock(clock.clone()).build();
    let newest: Vec<AddRequest> = (0..5).map(|i| text(&before, 1, &format!("n{}", i), NOW - i)).collect();
    before.save_to(&persistence).await.unwrap();

    let after = StorageService::builder(test_registry()).with_clock(clock).with_max_map_size(3).build();
    assert_eq!(after.load_from(&persistence).await.unwrap(), 3);
    for req in &newest[..3] {
        assert!(after.get(&req.map_key()).is_some());
    }
    assert!(after.get(&newest[4].map_key()).is_none());

    let types = persistence.list_snapshots().unwrap();
    assert!(types.contains(&TextMessage::TYPE_NAME.to_string()));
    assert!(persistence.load_snapshot("NeverSaved").await.unwrap().is_empty());
}
