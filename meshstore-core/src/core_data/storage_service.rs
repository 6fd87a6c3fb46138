/*
    StorageService - one DataStore per registered data type

    Routes requests to the store of the payload's declared type. Refresh and
    remove requests carry no payload, so they are routed to whichever store
    holds the MapKey. All stores share one EventBus and one clock.
*/

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics::{Timer, SNAPSHOT_SAVE_MS};

use super::authorization::PrivilegedKeys;
use super::clock::{Clock, SystemClock};
use super::entry::VersionedEntry;
use super::errors::{MutationError, PersistenceError};
use super::events::{EventBus, Subscription};
use super::mailbox::MailboxDelivery;
use super::map_key::MapKey;
use super::meta_data::MetaDataRegistry;
use super::persistence::SnapshotPersistence;
use super::request::{AddRequest, MutationRequest, RefreshRequest, RemoveRequest};
use super::store::DataStore;

pub const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

pub struct StorageServiceBuilder {
    registry: MetaDataRegistry,
    max_map_size: usize,
    clock: Arc<dyn Clock>,
    privileged_keys: HashMap<String, Arc<PrivilegedKeys>>,
    events: EventBus,
}

impl StorageServiceBuilder {
    pub fn with_max_map_size(mut self, max_map_size: usize) -> Self {
        self.max_map_size = max_map_size;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Key sets for an authorized type. Types without one get an empty set.
    pub fn with_privileged_keys(mut self, type_name: impl Into<String>, keys: Arc<PrivilegedKeys>) -> Self {
        self.privileged_keys.insert(type_name.into(), keys);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn build(mut self) -> StorageService {
        let mut stores = HashMap::new();
        for meta in self.registry.iter() {
            let keys = self.privileged_keys.remove(&meta.type_name).unwrap_or_default();
            let store = DataStore::new(
                meta.clone(),
                keys,
                self.events.clone(),
                Arc::clone(&self.clock),
                self.max_map_size,
            );
            stores.insert(meta.type_name.clone(), Arc::new(store));
        }

        StorageService { registry: self.registry, stores, events: self.events, clock: self.clock }
    }
}

pub struct StorageService {
    registry: MetaDataRegistry,
    stores: HashMap<String, Arc<DataStore>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
}

impl StorageService {
    pub fn builder(registry: MetaDataRegistry) -> StorageServiceBuilder {
        StorageServiceBuilder {
            registry,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
            clock: Arc::new(SystemClock),
            privileged_keys: HashMap::new(),
            events: EventBus::new(),
        }
    }

    pub fn registry(&self) -> &MetaDataRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn store(&self, type_name: &str) -> Option<&Arc<DataStore>> {
        self.stores.get(type_name)
    }

    /// Stores ordered by type name
    pub fn stores(&self) -> Vec<&Arc<DataStore>> {
        let mut stores: Vec<&Arc<DataStore>> = self.stores.values().collect();
        stores.sort_by(|a, b| a.type_name().cmp(b.type_name()));
        stores
    }

    pub fn privileged_keys(&self, type_name: &str) -> Option<&Arc<PrivilegedKeys>> {
        self.store(type_name).map(|store| store.privileged_keys())
    }

    pub fn add(&self, req: &AddRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        self.store_for_type(req.data.type_name())?.add(req)
    }

    pub fn refresh(&self, req: &RefreshRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        self.store_for_key(&req.map_key)?.refresh(req)
    }

    pub fn remove(&self, req: &RemoveRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        self.store_for_key(&req.map_key)?.remove(req)
    }

    pub fn apply(&self, request: &MutationRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        match request {
            MutationRequest::Add(req) => self.add(req),
            MutationRequest::Refresh(req) => self.refresh(req),
            MutationRequest::Remove(req) => self.remove(req),
        }
    }

    /// Apply a record from a peer inventory
    pub fn apply_synced(&self, entry: VersionedEntry) -> Result<Arc<VersionedEntry>, MutationError> {
        self.store_for_type(entry.type_name())?.apply_synced(entry)
    }

    pub fn confirm_mailbox_delivery(&self, delivery: &MailboxDelivery) -> Result<(), MutationError> {
        self.store_for_key(&delivery.map_key)?.confirm_delivery(delivery)
    }

    pub fn get(&self, map_key: &MapKey) -> Option<Arc<VersionedEntry>> {
        self.stores.values().find_map(|store| store.get(map_key))
    }

    pub fn get_sequence_number(&self, map_key: &MapKey) -> u32 {
        self.get(map_key).map(|entry| entry.sequence_number).unwrap_or(0)
    }

    /// Total occupied slots across all stores
    pub fn len(&self) -> usize {
        self.stores.values().map(|store| store.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a TTL sweep over every store
    pub fn prune_expired(&self) -> usize {
        self.stores().into_iter().map(|store| store.prune_expired()).sum()
    }

    /// Restore every store from its snapshot. Returns the number of restored entries.
    pub async fn load_from(&self, persistence: &dyn SnapshotPersistence) -> Result<usize, PersistenceError> {
        let mut restored = 0;
        for store in self.stores() {
            let entries = persistence.load_snapshot(store.type_name()).await?;
            restored += store.restore(entries);
        }
        info!(restored, "Loaded snapshots");
        Ok(restored)
    }

    /// Persist every store. Returns the number of saved entries.
    pub async fn save_to(&self, persistence: &dyn SnapshotPersistence) -> Result<usize, PersistenceError> {
        let timer = Timer::new(SNAPSHOT_SAVE_MS);
        let mut saved = 0;
        for store in self.stores() {
            let entries = store.entries();
            persistence.save_snapshot(store.type_name(), &entries).await?;
            saved += entries.len();
        }
        timer.stop();
        debug!(saved, "Saved snapshots");
        Ok(saved)
    }

    fn store_for_type(&self, type_name: &str) -> Result<&Arc<DataStore>, MutationError> {
        self.stores.get(type_name).ok_or_else(|| {
            warn!(type_name, "Rejected mutation for unknown data type");
            metrics::counter!("store.mutations.rejected", "error" => "unknown_data_type").increment(1);
            MutationError::UnknownDataType { type_name: type_name.to_string() }
        })
    }

    fn store_for_key(&self, map_key: &MapKey) -> Result<&Arc<DataStore>, MutationError> {
        self.stores.values().find(|store| store.contains(map_key)).ok_or_else(|| {
            warn!(map_key = %map_key, "Rejected mutation for unknown entry");
            metrics::counter!("store.mutations.rejected", "error" => "unknown_entry").increment(1);
            MutationError::UnknownEntryForRefreshOrRemove { map_key: *map_key }
        })
    }
}
