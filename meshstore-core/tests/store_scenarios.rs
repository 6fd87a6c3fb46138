//! End-to-end mutation scenarios against a StorageService
//!
//! Covers the add/refresh/remove lifecycle, replay rejection, the racing
//! first-writer case, the authorized and mailbox tiers, and TTL eviction.

use std::sync::Arc;
use std::time::Duration;

use meshstore_core::core_data::payloads::{AlertLevel, AlertNotice, PrivateMessage, TextMessage};
use meshstore_core::core_data::{
    AddRequest, ChangeKind, DataTier, MailboxDelivery, ManualClock, MetaData, MutationError, MutationOrigin,
    PrivilegedKeys, ProtectedData, RefreshRequest, RemoveRequest, StorageService, TtlReaper,
};
use meshstore_core::test_utils::{
    collect_events, keypair, recv_event_timeout, test_registry, RecvTimeoutError, TestPayload, SHORT_TEST_TIMEOUT,
};

const NOW: i64 = 1_700_000_000_000;

fn service(clock: Arc<ManualClock>) -> StorageService {
    StorageService::builder(test_registry()).with_clock(clock).build()
}

fn text(author: u8, body: &str, seq: u32) -> AddRequest {
    let kp = keypair(author);
    AddRequest::sign(ProtectedData::authenticated(TextMessage::new(body, &kp.public_key())), seq, NOW, &kp)
}

#[test]
fn test_add_refresh_remove_sequence() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let kp = keypair(1);
    let req = text(1, "hello mesh", 1);
    let key = req.map_key();

    assert_eq!(service.get_sequence_number(&key), 0);
    service.add(&req).unwrap();
    assert_eq!(service.get_sequence_number(&key), 1);

    service.refresh(&RefreshRequest::sign(key, 2, NOW, &kp)).unwrap();
    assert_eq!(service.get_sequence_number(&key), 2);

    service.remove(&RemoveRequest::sign(key, 3, NOW, &kp)).unwrap();
    assert_eq!(service.get_sequence_number(&key), 3);
    assert!(service.get(&key).unwrap().is_tombstone());
}

#[test]
fn test_replayed_mutations_rejected() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let kp = keypair(1);
    let add = text(1, "replay me", 1);
    let key = add.map_key();
    let refresh = RefreshRequest::sign(key, 2, NOW, &kp);

    service.add(&add).unwrap();
    service.refresh(&refresh).unwrap();

    assert!(matches!(service.add(&add), Err(MutationError::SequenceTooLow { current: 2, incoming: 1, .. })));
    assert!(matches!(service.refresh(&refresh), Err(MutationError::AlreadyReceived { .. })));

    let gap = RefreshRequest::sign(key, 5, NOW, &kp);
    assert!(matches!(service.refresh(&gap), Err(MutationError::SequenceGap { current: 2, incoming: 5, .. })));
    assert_eq!(service.get_sequence_number(&key), 2);
}

#[test]
fn test_refresh_or_remove_without_add() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let kp = keypair(1);
    let key = text(1, "never added", 1).map_key();

    assert!(matches!(
        service.refresh(&RefreshRequest::sign(key, 1, NOW, &kp)),
        Err(MutationError::UnknownEntryForRefreshOrRemove { .. })
    ));
    assert!(matches!(
        service.remove(&RemoveRequest::sign(key, 1, NOW, &kp)),
        Err(MutationError::UnknownEntryForRefreshOrRemove { .. })
    ));
}

#[test]
fn test_refresh_after_remove() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let kp = keypair(1);
    let add = text(1, "short lived", 1);
    let key = add.map_key();

    service.add(&add).unwrap();
    service.remove(&RemoveRequest::sign(key, 2, NOW, &kp)).unwrap();

    assert!(matches!(
        service.refresh(&RefreshRequest::sign(key, 3, NOW, &kp)),
        Err(MutationError::AlreadyRemoved { .. })
    ));
    assert!(matches!(
        service.remove(&RemoveRequest::sign(key, 3, NOW, &kp)),
        Err(MutationError::AlreadyRemoved { .. })
    ));
}

#[test]
fn test_racing_first_add_has_one_winner() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let payload = TestPayload::new("contested");
    let contenders: Vec<AddRequest> = (1..=8u8)
        .map(|id| AddRequest::sign(ProtectedData::authenticated(payload.clone()), 1, NOW, &keypair(id)))
        .collect();
    let key = contenders[0].map_key();

    let service = &service;
    let results: Vec<Result<_, MutationError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = contenders
            .iter()
            .map(|req| scope.spawn(move || service.add(req).map(|entry| entry.author_public_key)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let winner = *winners[0];

    for id in 1..=8u8 {
        let kp = keypair(id);
        let result = service.refresh(&RefreshRequest::sign(key, 2, NOW, &kp));
        if kp.public_key() == winner {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(MutationError::AuthorKeyMismatch { .. })));
        }
    }
    assert_eq!(service.get_sequence_number(&key), 2);
}

#[test]
fn test_authorized_tier_requires_privileged_key() {
    let privileged = keypair(10);
    let outsider = keypair(11);
    let author = keypair(12);
    let service = StorageService::builder(test_registry())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_privileged_keys(AlertNotice::TYPE_NAME, Arc::new(PrivilegedKeys::with_keys([privileged.public_key()])))
        .build();

    let alert = AlertNotice::new(AlertLevel::Warning, NOW, "maintenance tonight");
    let forged = AddRequest::sign(ProtectedData::authorized(alert.clone(), &outsider, false), 1, NOW, &author);
    assert!(matches!(service.add(&forged), Err(MutationError::PrivilegedKeyMismatch { .. })));

    let signed = AddRequest::sign(ProtectedData::authorized(alert.clone(), &privileged, false), 1, NOW, &author);
    service.add(&signed).unwrap();

    let plain = AddRequest::sign(ProtectedData::authenticated(alert), 1, NOW, &author);
    assert!(matches!(service.add(&plain), Err(MutationError::PayloadInvalid { .. })));
}

#[test]
fn test_static_and_dynamic_privileged_keys() {
    let static_key = keypair(20);
    let dynamic_key = keypair(21);
    let author = keypair(22);
    let keys = Arc::new(PrivilegedKeys::new().with_static_keys([static_key.public_key()]));
    let service = StorageService::builder(test_registry())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_privileged_keys(AlertNotice::TYPE_NAME, Arc::clone(&keys))
        .build();

    let alert = |msg: &str| AlertNotice::new(AlertLevel::Info, NOW, msg);

    let by_static = AddRequest::sign(ProtectedData::authorized(alert("a"), &static_key, true), 1, NOW, &author);
    service.add(&by_static).unwrap();

    // The static set is only consulted when the envelope says so
    let wrong_set = AddRequest::sign(ProtectedData::authorized(alert("b"), &static_key, false), 1, NOW, &author);
    assert!(matches!(service.add(&wrong_set), Err(MutationError::PrivilegedKeyMismatch { .. })));

    let by_dynamic = AddRequest::sign(ProtectedData::authorized(alert("c"), &dynamic_key, false), 1, NOW, &author);
    assert!(service.add(&by_dynamic).is_err());
    keys.insert(dynamic_key.public_key());
    service.add(&by_dynamic).unwrap();
}

#[tokio::test]
async fn test_mailbox_delivery() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let sender = keypair(1);
    let receiver = keypair(2);
    let mut events = service.subscribe();

    let msg = PrivateMessage::new("for your eyes", &sender.public_key());
    let req = AddRequest::sign(ProtectedData::mailbox(msg, receiver.public_key()), 1, NOW, &sender);
    let key = req.map_key();
    service.add(&req).unwrap();

    let forged = MailboxDelivery::sign(key, &sender);
    assert!(matches!(service.confirm_mailbox_delivery(&forged), Err(MutationError::ReceiverMismatch { .. })));

    service.confirm_mailbox_delivery(&MailboxDelivery::sign(key, &receiver)).unwrap();
    assert!(service.get(&key).is_none());

    let events_seen = collect_events(&mut events, 2, SHORT_TEST_TIMEOUT).await.unwrap();
    let kinds: Vec<(ChangeKind, MutationOrigin)> = events_seen.iter().map(|e| (e.kind, e.origin)).collect();
    assert_eq!(
        kinds,
        vec![(ChangeKind::Added, MutationOrigin::Request), (ChangeKind::Removed, MutationOrigin::Delivery)]
    );
    assert_eq!(recv_event_timeout(&mut events, SHORT_TEST_TIMEOUT).await.unwrap_err(), RecvTimeoutError::Timeout);
}

#[tokio::test]
async fn test_rewritten_mailbox_receiver_rejected() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let sender = keypair(1);
    let receiver = keypair(2);
    let relay = keypair(3);
    let mut events = service.subscribe();

    let msg = PrivateMessage::new("for your eyes", &sender.public_key());
    let req = AddRequest::sign(ProtectedData::mailbox(msg, receiver.public_key()), 1, NOW, &sender);

    let mut readdressed = req.clone();
    if let ProtectedData::Mailbox(mailbox) = &mut readdressed.data {
        mailbox.receiver_public_key = relay.public_key();
    }
    assert_ne!(readdressed.map_key(), req.map_key());
    assert!(matches!(service.add(&readdressed), Err(MutationError::SignatureInvalid { .. })));
    assert!(service.get(&readdressed.map_key()).is_none());
    assert_eq!(recv_event_timeout(&mut events, SHORT_TEST_TIMEOUT).await.unwrap_err(), RecvTimeoutError::Timeout);

    let key = req.map_key();
    service.add(&req).unwrap();
    let by_relay = service.confirm_mailbox_delivery(&MailboxDelivery::sign(key, &relay));
    assert!(matches!(by_relay, Err(MutationError::ReceiverMismatch { .. })));
    service.confirm_mailbox_delivery(&MailboxDelivery::sign(key, &receiver)).unwrap();
}

#[test]
fn test_rewritten_co_signer_rejected() {
    let first = keypair(30);
    let second = keypair(31);
    let author = keypair(32);
    let keys = PrivilegedKeys::with_keys([first.public_key(), second.public_key()])
        .with_static_keys([first.public_key()]);
    let service = StorageService::builder(test_registry())
        .with_clock(Arc::new(ManualClock::new(NOW)))
        .with_privileged_keys(AlertNotice::TYPE_NAME, Arc::new(keys))
        .build();

    let alert = AlertNotice::new(AlertLevel::Emergency, NOW, "evacuate");
    let req = AddRequest::sign(ProtectedData::authorized(alert.clone(), &first, false), 1, NOW, &author);

    // Co-signature swapped for another valid privileged one
    let mut swapped = req.clone();
    swapped.data = ProtectedData::authorized(alert, &second, false);
    assert!(matches!(service.add(&swapped), Err(MutationError::SignatureInvalid { .. })));

    let mut flipped = req.clone();
    if let ProtectedData::Authorized(authorized) = &mut flipped.data {
        authorized.static_public_keys_provided = true;
    }
    assert!(matches!(service.add(&flipped), Err(MutationError::SignatureInvalid { .. })));

    service.add(&req).unwrap();
    assert_eq!(service.len(), 1);
}

#[test]
fn test_mailbox_delivery_for_non_mailbox_entry() {
    let service = service(Arc::new(ManualClock::new(NOW)));
    let req = text(1, "public", 1);
    service.add(&req).unwrap();

    let result = service.confirm_mailbox_delivery(&MailboxDelivery::sign(req.map_key(), &keypair(2)));
    assert!(matches!(result, Err(MutationError::NotMailboxData { .. })));
}

#[test]
fn test_expired_entry_reaped_and_key_reusable() {
    let clock = Arc::new(ManualClock::new(NOW));
    let mut registry = test_registry();
    registry.register(MetaData::new("Ephemeral", 0, 1_024));
    let service = Arc::new(StorageService::builder(registry).with_clock(clock.clone()).build());
    let kp = keypair(1);

    let payload = TestPayload::with_meta("blink", DataTier::Authenticated, MetaData::new("Ephemeral", 0, 1_024));
    let req = AddRequest::sign(ProtectedData::authenticated(payload.clone()), 1, NOW, &kp);
    let key = req.map_key();
    service.add(&req).unwrap();

    clock.advance(Duration::from_millis(1));
    let reaper = TtlReaper::new(Arc::clone(&service), Duration::from_secs(60));
    assert_eq!(reaper.sweep(), 1);
    assert!(service.get(&key).is_none());

    let again = AddRequest::sign(ProtectedData::authenticated(payload), 1, NOW + 1, &kp);
    service.add(&again).unwrap();
    assert_eq!(service.get_sequence_number(&key), 1);
}

#[test]
fn test_tombstone_expires_too() {
    let clock = Arc::new(ManualClock::new(NOW));
    let service = service(clock.clone());
    let kp = keypair(1);
    let req = text(1, "gone soon", 1);
    let key = req.map_key();

    service.add(&req).unwrap();
    service.remove(&RemoveRequest::sign(key, 2, NOW, &kp)).unwrap();

    clock.advance(Duration::from_secs(11 * 24 * 3600));
    assert_eq!(service.prune_expired(), 1);
    assert_eq!(service.get_sequence_number(&key), 0);
}
