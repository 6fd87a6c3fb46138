//! Metrics descriptions and helpers
//!
//! Library code records through the `metrics` facade. Which recorder receives
//! the values (Prometheus, none) is decided by the binary.

use metrics::{describe_counter, describe_gauge, describe_histogram, histogram};
use std::time::Instant;

pub const MUTATIONS_ACCEPTED: &str = "store.mutations.accepted";
pub const MUTATIONS_REJECTED: &str = "store.mutations.rejected";
pub const ENTRIES_EXPIRED: &str = "store.entries.expired";
pub const ENTRIES: &str = "store.entries";
pub const INVENTORY_REQUESTS: &str = "sync.inventory.requests";
pub const INVENTORY_DROPPED: &str = "sync.inventory.dropped";
pub const INVENTORY_BUILD_MS: &str = "sync.inventory.build_ms";
pub const SNAPSHOT_SAVE_MS: &str = "store.snapshot.save_ms";

/// Register descriptions for every metric the crate emits
pub fn init_metrics() {
    describe_counter!(MUTATIONS_ACCEPTED, "Accepted mutations, labelled by kind");
    describe_counter!(MUTATIONS_REJECTED, "Rejected mutations, labelled by error kind");
    describe_counter!(ENTRIES_EXPIRED, "Entries evicted by the TTL reaper");
    describe_gauge!(ENTRIES, "Occupied slots per data type, tombstones included");

    describe_counter!(INVENTORY_REQUESTS, "Inventory requests served");
    describe_counter!(INVENTORY_DROPPED, "Eligible entries left out of inventory responses");
    describe_histogram!(INVENTORY_BUILD_MS, "Time to build an inventory response in milliseconds");

    describe_histogram!(SNAPSHOT_SAVE_MS, "Time to persist all snapshots in milliseconds");
}

/// Records its lifetime into a histogram when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    pub fn stop(self) {
        histogram!(self.name).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
