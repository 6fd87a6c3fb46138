/*
    TtlReaper - periodic eviction of expired entries

    Runs on its own tokio task. Each sweep walks a snapshot of every store's
    slots and evicts expired ones key by key, so no lock is ever held across
    a whole map. Losing a race against an in-flight write is harmless: the
    writer simply recreates the slot.
*/

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::shutdown::ShutdownSignal;

use super::storage_service::StorageService;

pub struct TtlReaper {
    service: Arc<StorageService>,
    interval: Duration,
}

impl TtlReaper {
    pub fn new(service: Arc<StorageService>, interval: Duration) -> Self {
        TtlReaper { service, interval }
    }

    /// One pass over all stores. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let evicted = self.service.prune_expired();
        debug!(evicted, "TTL sweep finished");
        evicted
    }

    /// Sweep every `interval` until a shutdown signal arrives
    pub fn spawn(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately
            ticker.tick().await;
            info!(interval = ?self.interval, "TTL reaper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    _ = shutdown.recv() => {
                        info!("TTL reaper stopping");
                        break;
                    }
                }
            }
        })
    }
}
