/*
    DataStore - concurrent versioned map for one data type

    Responsibilities:
    `store.rs` holds the latest accepted mutation per MapKey and is the only
    place where entries change. It handles:
    - add / refresh / remove from live requests (strict sequence discipline)
    - records applied from peer inventories and snapshots (monotonic discipline)
    - TTL eviction, mailbox delivery eviction
    - change events for local subscribers

    Concurrency:
    The map holds one `Slot` per key, each with its own mutex. Mutations on the
    same key serialize on the slot; mutations on different keys only share a
    short read lock on the map. The map write lock is taken to create or evict
    a slot, always after the slot lock when both are held. An evicted slot is
    flagged so a writer that raced the eviction retries against a fresh slot.

    Inputs:
    - AddRequest / RefreshRequest / RemoveRequest
    - VersionedEntry records from peers or snapshots
    - MailboxDelivery confirmations

    Outputs:
    - typed accept/reject results
    - StoreEvent notifications
*/

use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::authorization::PrivilegedKeys;
use super::clock::Clock;
use super::entry::{MutationKind, VersionedEntry};
use super::errors::MutationError;
use super::events::{ChangeKind, EventBus, MutationOrigin, StoreEvent};
use super::mailbox::MailboxDelivery;
use super::map_key::MapKey;
use super::meta_data::MetaData;
use super::request::{AddRequest, RefreshRequest, RemoveRequest};
use super::validator::{Candidate, MutationValidator, SequencePolicy};

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    entry: Option<Arc<VersionedEntry>>,
    /// Set once the slot is unlinked from the map
    evicted: bool,
}

/// Versioned store for a single data type
pub struct DataStore {
    validator: MutationValidator,
    slots: RwLock<HashMap<MapKey, Arc<Slot>>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    max_map_size: usize,
}

impl DataStore {
    pub fn new(
        meta: MetaData,
        privileged_keys: Arc<PrivilegedKeys>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        max_map_size: usize,
    ) -> Self {
        DataStore {
            validator: MutationValidator::new(meta, privileged_keys, Arc::clone(&clock)),
            slots: RwLock::new(HashMap::new()),
            events,
            clock,
            max_map_size,
        }
    }

    pub fn meta_data(&self) -> &MetaData {
        self.validator.meta_data()
    }

    pub fn type_name(&self) -> &str {
        &self.meta_data().type_name
    }

    pub fn privileged_keys(&self) -> &Arc<PrivilegedKeys> {
        self.validator.privileged_keys()
    }

    pub fn validator(&self) -> &MutationValidator {
        &self.validator
    }

    pub fn max_map_size(&self) -> usize {
        self.max_map_size
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Add a payload. Accepted if the slot is new (sequence 1) or the request
    /// is the next sequence number of the same author.
    pub fn add(&self, req: &AddRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        let map_key = req.map_key();
        let candidate = Candidate::add(req, map_key);
        let result = self.mutate(&candidate, SequencePolicy::Strict, MutationOrigin::Request, |_| {
            VersionedEntry {
                map_key,
                kind: MutationKind::Add,
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
                meta_data: self.meta_data().clone(),
                data: Some(req.data.clone()),
            }
        });
        self.record(&candidate, result)
    }

    /// Re-sign an existing live entry, resetting its TTL. The payload is kept.
    pub fn refresh(&self, req: &RefreshRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        let candidate = Candidate::refresh(req);
        let result = self.mutate(&candidate, SequencePolicy::Strict, MutationOrigin::Request, |current| {
            VersionedEntry {
                map_key: req.map_key,
                kind: MutationKind::Refresh,
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
                meta_data: self.meta_data().clone(),
                data: current.and_then(|entry| entry.data.clone()),
            }
        });
        self.record(&candidate, result)
    }

    /// Replace an existing entry with a tombstone
    pub fn remove(&self, req: &RemoveRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        let candidate = Candidate::remove(req);
        let result = self.mutate(&candidate, SequencePolicy::Strict, MutationOrigin::Request, |_| {
            VersionedEntry {
                map_key: req.map_key,
                kind: MutationKind::Remove,
                sequence_number: req.sequence_number,
                created_at_millis: req.created_at_millis,
                author_public_key: req.author_public_key,
                signature: req.signature.clone(),
                meta_data: self.meta_data().clone(),
                data: None,
            }
        });
        self.record(&candidate, result)
    }

    /// Apply a self-certifying record received from a peer.
    ///
    /// Any sequence number above the local one is accepted, so a node that
    /// missed intermediate mutations still converges. Tombstones for unknown
    /// keys are stored to block later resurrection.
    pub fn apply_synced(&self, entry: VersionedEntry) -> Result<Arc<VersionedEntry>, MutationError> {
        let mut entry = entry;
        entry.meta_data = self.meta_data().clone();
        let candidate = Candidate::from_entry(&entry);
        let result =
            self.mutate(&candidate, SequencePolicy::Monotonic, MutationOrigin::Sync, |_| entry.clone());
        self.record(&candidate, result)
    }

    /// Sequence number of the stored entry, 0 if absent
    pub fn get_sequence_number(&self, map_key: &MapKey) -> u32 {
        self.get(map_key).map(|entry| entry.sequence_number).unwrap_or(0)
    }

    pub fn get(&self, map_key: &MapKey) -> Option<Arc<VersionedEntry>> {
        let slot = self.slot(map_key)?;
        let state = slot.state.lock();
        state.entry.clone()
    }

    pub fn contains(&self, map_key: &MapKey) -> bool {
        self.get(map_key).is_some()
    }

    /// Snapshot of all stored entries, tombstones included
    pub fn entries(&self) -> Vec<Arc<VersionedEntry>> {
        self.snapshot_slots()
            .into_iter()
            .filter_map(|(_, slot)| {
                let state = slot.state.lock();
                state.entry.clone()
            })
            .collect()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every entry past its TTL. Live entries emit a `Removed` event,
    /// tombstones disappear silently. Returns the number of evicted slots.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut evicted = 0;

        for (map_key, slot) in self.snapshot_slots() {
            let mut state = slot.state.lock();
            let expired = state.entry.as_ref().map(|entry| entry.is_expired(now)).unwrap_or(false);
            if !expired {
                continue;
            }

            let removed = state.entry.take();
            self.unlink(&map_key, &slot, &mut state);
            evicted += 1;

            if let Some(entry) = removed {
                trace!(map_key = %map_key, type_name = %self.type_name(), "Evicted expired entry");
                if !entry.is_tombstone() {
                    self.emit(ChangeKind::Removed, MutationOrigin::Expiry, &entry, None);
                }
            }
        }

        if evicted > 0 {
            counter!("store.entries.expired").increment(evicted as u64);
            debug!(type_name = %self.type_name(), evicted, "Pruned expired entries");
        }
        evicted
    }

    /// Delete a mailbox entry once its receiver confirms delivery
    pub fn confirm_delivery(&self, delivery: &MailboxDelivery) -> Result<(), MutationError> {
        let map_key = delivery.map_key;
        let result = self.try_confirm_delivery(delivery);

        match &result {
            Ok(()) => {
                counter!("store.mutations.accepted", "kind" => "delivery").increment(1);
                debug!(map_key = %map_key, "Mailbox entry delivered");
            }
            Err(e) => {
                counter!("store.mutations.rejected", "error" => e.kind()).increment(1);
                warn!(map_key = %map_key, error = e.kind(), "Rejected delivery confirmation: {}", e);
            }
        }
        result
    }

    fn try_confirm_delivery(&self, delivery: &MailboxDelivery) -> Result<(), MutationError> {
        let map_key = delivery.map_key;
        let unknown = || MutationError::UnknownEntryForRefreshOrRemove { map_key };

        let slot = self.slot(&map_key).ok_or_else(unknown)?;
        let mut state = slot.state.lock();
        let entry = state.entry.clone().ok_or_else(unknown)?;

        let receiver = entry
            .data
            .as_ref()
            .and_then(|data| data.receiver())
            .copied()
            .ok_or(MutationError::NotMailboxData { map_key })?;
        if receiver != delivery.receiver_public_key {
            return Err(MutationError::ReceiverMismatch { map_key });
        }
        if !delivery.verify() {
            return Err(MutationError::SignatureInvalid { map_key });
        }

        state.entry = None;
        self.unlink(&map_key, &slot, &mut state);
        self.emit(ChangeKind::Removed, MutationOrigin::Delivery, &entry, None);
        Ok(())
    }

    /// Load entries from a snapshot.
    ///
    /// Expired entries and authorized entries whose privileged key is no longer
    /// accepted are dropped; of the rest, only the newest `max_map_size` are
    /// kept. Returns the number of restored entries.
    pub fn restore(&self, entries: Vec<VersionedEntry>) -> usize {
        let now = self.clock.now_millis();
        let total = entries.len();

        let mut kept: Vec<VersionedEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_expired(now))
            .filter(|entry| entry.data.as_ref().map(|d| self.validator.is_authorized(d)).unwrap_or(true))
            .collect();
        kept.sort_by(|a, b| b.created_at_millis.cmp(&a.created_at_millis));
        kept.truncate(self.max_map_size);

        let mut restored = 0;
        for entry in kept {
            let candidate = Candidate::from_entry(&entry);
            let result =
                self.mutate(&candidate, SequencePolicy::Monotonic, MutationOrigin::Sync, |_| entry.clone());
            match result {
                Ok(_) => restored += 1,
                Err(e) => debug!(map_key = %entry.map_key, error = e.kind(), "Skipped snapshot entry"),
            }
        }

        debug!(type_name = %self.type_name(), total, restored, "Restored snapshot");
        restored
    }

    fn mutate(
        &self,
        candidate: &Candidate<'_>,
        policy: SequencePolicy,
        origin: MutationOrigin,
        build: impl Fn(Option<&VersionedEntry>) -> VersionedEntry,
    ) -> Result<Arc<VersionedEntry>, MutationError> {
        let map_key = candidate.map_key;

        loop {
            let slot = match self.slot(&map_key) {
                Some(slot) => slot,
                None => {
                    // Reject against the empty state before touching the map
                    self.validator.validate(None, candidate, policy)?;
                    self.create_slot(map_key)?
                }
            };

            let mut state = slot.state.lock();
            if state.evicted {
                continue;
            }

            let current = state.entry.clone();
            if let Err(e) = self.validator.validate(current.as_deref(), candidate, policy) {
                if state.entry.is_none() {
                    self.unlink(&map_key, &slot, &mut state);
                }
                return Err(e);
            }

            let entry = Arc::new(build(current.as_deref()));
            state.entry = Some(Arc::clone(&entry));

            let change = match entry.kind {
                MutationKind::Add => ChangeKind::Added,
                MutationKind::Refresh => ChangeKind::Refreshed,
                MutationKind::Remove => ChangeKind::Removed,
            };
            // Emitted under the slot lock so subscribers see per-key order
            self.emit(change, origin, &entry, current.as_deref());
            return Ok(entry);
        }
    }

    fn record(
        &self,
        candidate: &Candidate<'_>,
        result: Result<Arc<VersionedEntry>, MutationError>,
    ) -> Result<Arc<VersionedEntry>, MutationError> {
        match &result {
            Ok(entry) => {
                counter!("store.mutations.accepted", "kind" => entry.kind.as_str()).increment(1);
                trace!(
                    map_key = %entry.map_key,
                    type_name = %self.type_name(),
                    kind = %entry.kind,
                    sequence_number = entry.sequence_number,
                    "Accepted mutation"
                );
            }
            Err(e) => {
                counter!("store.mutations.rejected", "error" => e.kind()).increment(1);
                let current = self.get_sequence_number(&candidate.map_key);
                if e.is_benign() {
                    debug!(
                        map_key = %candidate.map_key,
                        sequence_number = candidate.sequence_number,
                        "Mutation already received"
                    );
                } else {
                    warn!(
                        map_key = %candidate.map_key,
                        type_name = %self.type_name(),
                        kind = %candidate.kind,
                        current,
                        incoming = candidate.sequence_number,
                        error = e.kind(),
                        "Rejected mutation: {}",
                        e
                    );
                }
            }
        }
        result
    }

    fn emit(
        &self,
        kind: ChangeKind,
        origin: MutationOrigin,
        entry: &Arc<VersionedEntry>,
        previous: Option<&VersionedEntry>,
    ) {
        let payload = entry
            .data
            .as_ref()
            .or_else(|| previous.and_then(|p| p.data.as_ref()))
            .map(|data| Arc::clone(data.data()));

        self.events.emit(StoreEvent {
            map_key: entry.map_key,
            type_name: self.type_name().to_string(),
            kind,
            origin,
            sequence_number: entry.sequence_number,
            payload,
            entry: Some(Arc::clone(entry)),
        });
    }

    fn slot(&self, map_key: &MapKey) -> Option<Arc<Slot>> {
        self.slots.read().get(map_key).cloned()
    }

    fn snapshot_slots(&self) -> Vec<(MapKey, Arc<Slot>)> {
        self.slots.read().iter().map(|(key, slot)| (*key, Arc::clone(slot))).collect()
    }

    fn create_slot(&self, map_key: MapKey) -> Result<Arc<Slot>, MutationError> {
        let mut slots = self.slots.write();
        if let Some(existing) = slots.get(&map_key) {
            return Ok(Arc::clone(existing));
        }
        if slots.len() >= self.max_map_size {
            return Err(MutationError::StoreFull {
                type_name: self.type_name().to_string(),
                max: self.max_map_size,
            });
        }

        let slot = Arc::new(Slot::default());
        slots.insert(map_key, Arc::clone(&slot));
        gauge!("store.entries", "type_name" => self.type_name().to_string()).set(slots.len() as f64);
        Ok(slot)
    }

    /// Unlink a slot from the map. Caller holds the slot lock.
    fn unlink(&self, map_key: &MapKey, slot: &Arc<Slot>, state: &mut SlotState) {
        state.evicted = true;
        let mut slots = self.slots.write();
        if slots.get(map_key).map(|s| Arc::ptr_eq(s, slot)).unwrap_or(false) {
            slots.remove(map_key);
        }
        gauge!("store.entries", "type_name" => self.type_name().to_string()).set(slots.len() as f64);
    }
}
