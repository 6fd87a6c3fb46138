/*
    SnapshotSaver - periodic persistence of every store

    Same task shape as the TTL reaper. A graceful shutdown triggers one final
    save before the task exits; an immediate one exits right away.
*/

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::shutdown::ShutdownSignal;

use super::persistence::SnapshotPersistence;
use super::storage_service::StorageService;

pub struct SnapshotSaver {
    service: Arc<StorageService>,
    persistence: Arc<dyn SnapshotPersistence>,
    interval: Duration,
}

impl SnapshotSaver {
    pub fn new(service: Arc<StorageService>, persistence: Arc<dyn SnapshotPersistence>, interval: Duration) -> Self {
        SnapshotSaver { service, persistence, interval }
    }

    /// Persist all stores once. Failures are logged, the next tick retries.
    pub async fn save(&self) -> usize {
        match self.service.save_to(self.persistence.as_ref()).await {
            Ok(saved) => saved,
            Err(e) => {
                error!("Snapshot save failed: {}", e);
                0
            }
        }
    }

    pub fn spawn(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            info!(interval = ?self.interval, "Snapshot saver started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.save().await;
                    }
                    signal = shutdown.recv() => {
                        if matches!(signal, Ok(ShutdownSignal::Graceful)) {
                            let saved = self.save().await;
                            info!(saved, "Final snapshot written");
                        }
                        break;
                    }
                }
            }
        })
    }
}
