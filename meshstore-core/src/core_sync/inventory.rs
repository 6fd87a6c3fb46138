/*
    Synchronizer - answers peer reconciliation requests

    Two bounded primitives over the local StorageService:
    - filter-based delta: everything the requester's filter says it lacks
    - windowed pagination: newest-first pages for bootstrapping peers

    Both cap the response at `max_items` and report how many eligible entries
    were left out, so the requester can follow up. Mailbox entries are never
    served through the general inventory, only to their receiver.
*/

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::core_data::{
    DataStore, DataTier, MapKey, MetaData, MutationError, StorageService, VersionedEntry,
};
use crate::core_identity::PublicKey;
use crate::metrics::{Timer, INVENTORY_BUILD_MS};

use super::errors::SyncError;
use super::filter::ProtectedDataFilter;
use super::pagination::{get_subset, Subset};

/// Bounded response to a reconciliation request
#[derive(Debug, Clone)]
pub struct Inventory {
    pub type_name: String,
    pub entries: Vec<Arc<VersionedEntry>>,
    /// Eligible entries left out because of the `max_items` cap
    pub num_dropped: usize,
}

impl Inventory {
    pub fn empty(type_name: impl Into<String>) -> Self {
        Inventory { type_name: type_name.into(), entries: Vec::new(), num_dropped: 0 }
    }

    /// True when the response holds everything the requester was missing
    pub fn no_data_missing(&self) -> bool {
        self.num_dropped == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of applying a peer's inventory locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub accepted: usize,
    /// Entries we already had at the same version
    pub duplicates: usize,
    pub rejected: usize,
}

pub struct Synchronizer {
    service: Arc<StorageService>,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(service: Arc<StorageService>, config: SyncConfig) -> Self {
        Synchronizer { service, config }
    }

    pub fn service(&self) -> &Arc<StorageService> {
        &self.service
    }

    /// Response cap for a type: bounded by item count and by total bytes
    pub fn max_items_for(&self, meta: &MetaData) -> usize {
        let by_size = self.config.max_inventory_bytes / meta.max_size_bytes.max(1);
        self.config.max_items.min(by_size.max(1))
    }

    /// Filter describing our own store, for sending to a peer
    pub fn build_filter(&self, type_name: &str) -> Result<ProtectedDataFilter, SyncError> {
        let store = self.store(type_name)?;
        Ok(ProtectedDataFilter::from_store(store, self.config.max_filter_entries))
    }

    pub fn get_inventory(&self, filter: &ProtectedDataFilter) -> Result<Inventory, SyncError> {
        let store = self.store(&filter.type_name)?;
        let max_items = self.max_items_for(store.meta_data());
        self.get_inventory_with_limit(filter, max_items)
    }

    /// Entries the requester lacks or holds at a lower sequence number.
    /// Live entries come first, newest first, then tombstones.
    pub fn get_inventory_with_limit(
        &self,
        filter: &ProtectedDataFilter,
        max_items: usize,
    ) -> Result<Inventory, SyncError> {
        let store = self.store(&filter.type_name)?;
        counter!("sync.inventory.requests").increment(1);
        let timer = Timer::new(INVENTORY_BUILD_MS);

        if filter.len() > self.config.max_filter_entries {
            warn!(
                type_name = %filter.type_name,
                entries = filter.len(),
                max = self.config.max_filter_entries,
                "Filter exceeds the advertised entry limit"
            );
        }

        let eligible: Vec<Arc<VersionedEntry>> = store
            .entries()
            .into_iter()
            .filter(|entry| !is_mailbox(entry))
            .filter(|entry| filter.is_eligible(entry))
            .collect();

        let inventory = self.truncate(&filter.type_name, eligible, max_items);
        timer.stop();
        Ok(inventory)
    }

    /// Mailbox entries addressed to `recipient` that the filter lacks
    pub fn get_mailbox_inventory(
        &self,
        filter: &ProtectedDataFilter,
        recipient: &PublicKey,
    ) -> Result<Inventory, SyncError> {
        let store = self.store(&filter.type_name)?;
        counter!("sync.inventory.requests").increment(1);

        let eligible: Vec<Arc<VersionedEntry>> = store
            .entries()
            .into_iter()
            .filter(|entry| {
                entry.data.as_ref().and_then(|data| data.receiver()).map(|r| r == recipient).unwrap_or(false)
            })
            .filter(|entry| filter.is_eligible(entry))
            .collect();

        let max_items = self.max_items_for(store.meta_data());
        Ok(self.truncate(&filter.type_name, eligible, max_items))
    }

    /// One newest-first page of a partition for a peer with no prior state
    pub fn get_bootstrap_page(
        &self,
        type_name: &str,
        offset: usize,
        range: usize,
    ) -> Result<Subset<Arc<VersionedEntry>>, SyncError> {
        let store = self.store(type_name)?;
        let entries: Vec<Arc<VersionedEntry>> =
            store.entries().into_iter().filter(|entry| !is_mailbox(entry)).collect();
        get_subset(&entries, offset, range, self.max_items_for(store.meta_data()))
    }

    /// Number of entries a bootstrap transfer of `type_name` pages over
    pub fn bootstrap_size(&self, type_name: &str) -> Result<usize, SyncError> {
        let store = self.store(type_name)?;
        Ok(store.entries().iter().filter(|entry| !is_mailbox(entry)).count())
    }

    /// Apply every record of a peer's inventory through the validator
    pub fn apply_inventory(&self, inventory: Inventory) -> ApplyReport {
        let mut report = ApplyReport::default();
        for entry in inventory.entries {
            let map_key = entry.map_key;
            match self.service.apply_synced(VersionedEntry::clone(&entry)) {
                Ok(_) => report.accepted += 1,
                Err(MutationError::AlreadyReceived { .. }) => report.duplicates += 1,
                Err(e) => {
                    report.rejected += 1;
                    debug!(map_key = %map_key, error = e.kind(), "Inventory entry rejected");
                }
            }
        }

        debug!(
            type_name = %inventory.type_name,
            accepted = report.accepted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "Applied inventory"
        );
        report
    }

    fn truncate(&self, type_name: &str, mut eligible: Vec<Arc<VersionedEntry>>, max_items: usize) -> Inventory {
        eligible.sort_by(|a, b| {
            a.is_tombstone()
                .cmp(&b.is_tombstone())
                .then_with(|| b.created_at_millis.cmp(&a.created_at_millis))
        });

        let num_dropped = eligible.len().saturating_sub(max_items);
        eligible.truncate(max_items);

        if num_dropped > 0 {
            counter!("sync.inventory.dropped").increment(num_dropped as u64);
            debug!(type_name, included = eligible.len(), num_dropped, "Inventory truncated");
        }

        Inventory { type_name: type_name.to_string(), entries: eligible, num_dropped }
    }

    fn store(&self, type_name: &str) -> Result<&Arc<DataStore>, SyncError> {
        self.service
            .store(type_name)
            .ok_or_else(|| SyncError::UnknownDataType { type_name: type_name.to_string() })
    }
}

fn is_mailbox(entry: &VersionedEntry) -> bool {
    entry.data.as_ref().map(|data| data.tier() == DataTier::Mailbox).unwrap_or(false)
}

/// Keys and sequence numbers of an inventory, handy for logging and tests
pub fn inventory_keys(inventory: &Inventory) -> Vec<(MapKey, u32)> {
    inventory.entries.iter().map(|entry| (entry.map_key, entry.sequence_number)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_data::{AddRequest, ManualClock, MetaDataRegistry, ProtectedData, RemoveRequest};
    use crate::core_identity::Keypair;
    use crate::core_sync::filter::FilterEntry;
    use crate::test_utils::fixtures::{test_meta, TestPayload};

    const NOW: i64 = 1_700_000_000_000;

    fn synchronizer(config: SyncConfig) -> Synchronizer {
        let service = StorageService::builder(MetaDataRegistry::from_iter([test_meta()]))
            .with_clock(Arc::new(ManualClock::new(NOW)))
            .build();
        Synchronizer::new(Arc::new(service), config)
    }

    fn add(sync: &Synchronizer, kp: &Keypair, body: &str, created: i64) -> MapKey {
        let req = AddRequest::sign(ProtectedData::authenticated(TestPayload::new(body)), 1, created, kp);
        sync.service().add(&req).unwrap();
        req.map_key()
    }

    #[test]
    fn test_max_items_for() {
        let sync = synchronizer(SyncConfig { max_items: 1_000, max_inventory_bytes: 1_000_000, max_filter_entries: 10 });
        assert_eq!(sync.max_items_for(&MetaData::new("a", 1, 10_000)), 100);
        assert_eq!(sync.max_items_for(&MetaData::new("b", 1, 100)), 1_000);
        assert_eq!(sync.max_items_for(&MetaData::new("c", 1, 10_000_000)), 1);
    }

    #[test]
    fn test_filter_excludes_known_sequence() {
        let sync = synchronizer(SyncConfig::default());
        let kp = Keypair::generate();
        let key = add(&sync, &kp, "a", NOW);

        let known = ProtectedDataFilter::with_entries(
            TestPayload::TYPE_NAME,
            [FilterEntry { map_key: key, sequence_number: 1 }],
        );
        assert!(sync.get_inventory(&known).unwrap().is_empty());

        let stale = ProtectedDataFilter::with_entries(
            TestPayload::TYPE_NAME,
            [FilterEntry { map_key: key, sequence_number: 0 }],
        );
        assert_eq!(sync.get_inventory(&stale).unwrap().len(), 1);
    }

    #[test]
    fn test_live_entries_before_tombstones() {
        let sync = synchronizer(SyncConfig::default());
        let kp = Keypair::generate();
        let removed = add(&sync, &kp, "old", NOW - 10);
        sync.service().remove(&RemoveRequest::sign(removed, 2, NOW, &kp)).unwrap();
        let live_old = add(&sync, &kp, "b", NOW - 5);
        let live_new = add(&sync, &kp, "c", NOW - 1);

        let inventory = sync.get_inventory(&ProtectedDataFilter::new(TestPayload::TYPE_NAME)).unwrap();
        let keys: Vec<MapKey> = inventory.entries.iter().map(|e| e.map_key).collect();
        assert_eq!(keys, vec![live_new, live_old, removed]);
    }

    #[test]
    fn test_num_dropped() {
        let sync = synchronizer(SyncConfig::default());
        let kp = Keypair::generate();
        for i in 0..7 {
            add(&sync, &kp, &format!("item-{}", i), NOW - i);
        }

        let inventory = sync
            .get_inventory_with_limit(&ProtectedDataFilter::new(TestPayload::TYPE_NAME), 5)
            .unwrap();
        assert_eq!(inventory.len(), 5);
        assert_eq!(inventory.num_dropped, 2);
        assert!(!inventory.no_data_missing());
    }

    #[test]
    fn test_unknown_type() {
        let sync = synchronizer(SyncConfig::default());
        let result = sync.get_inventory(&ProtectedDataFilter::new("Nope"));
        assert!(matches!(result, Err(SyncError::UnknownDataType { .. })));
    }
}
