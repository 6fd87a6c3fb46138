/*
    MetaData - per data-type constants

    Every payload type declares a `MetaData`: its time-to-live, the largest
    serialized size the store accepts for it, and a broadcast priority. The
    `type_name` partitions the store; filters and inventories are scoped to it.

    MetaData is read-only after startup. The registry is built once and shared.
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TTL_1_DAY: i64 = 24 * 60 * 60 * 1000;
pub const TTL_10_DAYS: i64 = 10 * TTL_1_DAY;
pub const TTL_15_DAYS: i64 = 15 * TTL_1_DAY;
pub const TTL_30_DAYS: i64 = 30 * TTL_1_DAY;
pub const TTL_100_DAYS: i64 = 100 * TTL_1_DAY;

pub const MAX_SIZE_1_KB: usize = 1_000;
pub const MAX_SIZE_10_KB: usize = 10_000;
pub const MAX_SIZE_20_KB: usize = 20_000;
pub const MAX_SIZE_50_KB: usize = 50_000;

pub const LOW_PRIORITY: u8 = 0;
pub const DEFAULT_PRIORITY: u8 = 1;
pub const HIGH_PRIORITY: u8 = 2;

/// Per data-type constants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    /// Partition key for stores, filters and inventories
    pub type_name: String,
    pub ttl_millis: i64,
    pub max_size_bytes: usize,
    /// Higher priority entries are gossiped first
    pub priority: u8,
}

impl MetaData {
    pub fn new(type_name: impl Into<String>, ttl_millis: i64, max_size_bytes: usize) -> Self {
        MetaData {
            type_name: type_name.into(),
            ttl_millis,
            max_size_bytes,
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// `now - created > ttl`
    pub fn is_expired(&self, created_at_millis: i64, now_millis: i64) -> bool {
        now_millis.saturating_sub(created_at_millis) > self.ttl_millis
    }
}

/// Registry of known data types, keyed by type name
#[derive(Debug, Clone, Default)]
pub struct MetaDataRegistry {
    types: HashMap<String, MetaData>,
}

impl MetaDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Re-registering a type name replaces the previous entry.
    pub fn register(&mut self, meta: MetaData) -> &mut Self {
        self.types.insert(meta.type_name.clone(), meta);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&MetaData> {
        self.types.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetaData> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FromIterator<MetaData> for MetaDataRegistry {
    fn from_iter<I: IntoIterator<Item = MetaData>>(iter: I) -> Self {
        let mut registry = MetaDataRegistry::new();
        for meta in iter {
            registry.register(meta);
        }
        registry
    }
}
