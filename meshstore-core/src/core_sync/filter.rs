/*
    ProtectedDataFilter - what a requesting peer already holds

    For one type partition the requester advertises `(map key, sequence)` pairs.
    The responder includes an entry unless the requester already has it at the
    same or a newer sequence number.
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core_data::{DataStore, MapKey, VersionedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterEntry {
    pub map_key: MapKey,
    pub sequence_number: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedDataFilter {
    pub type_name: String,
    known_items: HashMap<MapKey, u32>,
}

impl ProtectedDataFilter {
    /// Empty filter: the requester knows nothing
    pub fn new(type_name: impl Into<String>) -> Self {
        ProtectedDataFilter { type_name: type_name.into(), known_items: HashMap::new() }
    }

    pub fn with_entries(type_name: impl Into<String>, entries: impl IntoIterator<Item = FilterEntry>) -> Self {
        let mut filter = Self::new(type_name);
        for entry in entries {
            filter.insert(entry);
        }
        filter
    }

    /// Filter describing the local store, newest entries first, capped at `max_entries`
    pub fn from_store(store: &DataStore, max_entries: usize) -> Self {
        let mut entries = store.entries();
        entries.sort_by(|a, b| b.created_at_millis.cmp(&a.created_at_millis));

        Self::with_entries(
            store.type_name(),
            entries.iter().take(max_entries).map(|entry| FilterEntry {
                map_key: entry.map_key,
                sequence_number: entry.sequence_number,
            }),
        )
    }

    /// Keeps the highest sequence number seen for a key
    pub fn insert(&mut self, entry: FilterEntry) {
        let known = self.known_items.entry(entry.map_key).or_insert(0);
        *known = (*known).max(entry.sequence_number);
    }

    pub fn known_sequence(&self, map_key: &MapKey) -> Option<u32> {
        self.known_items.get(map_key).copied()
    }

    /// Whether the requester is missing this entry or holds an older version
    pub fn is_eligible(&self, entry: &VersionedEntry) -> bool {
        match self.known_items.get(&entry.map_key) {
            Some(known) => *known < entry.sequence_number,
            None => true,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = FilterEntry> + '_ {
        self.known_items
            .iter()
            .map(|(map_key, sequence_number)| FilterEntry { map_key: *map_key, sequence_number: *sequence_number })
    }

    pub fn len(&self) -> usize {
        self.known_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_items.is_empty()
    }
}
