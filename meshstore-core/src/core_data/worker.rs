/*
    AsyncStorage - mutation path for async callers

    Signature verification and hashing are CPU bound, so mutations are run on
    tokio's blocking pool and the result is awaited. The event loop never
    verifies a signature itself.
*/

use std::sync::Arc;
use tracing::debug;

use super::entry::VersionedEntry;
use super::errors::MutationError;
use super::mailbox::MailboxDelivery;
use super::request::MutationRequest;
use super::storage_service::StorageService;

#[derive(Clone)]
pub struct AsyncStorage {
    service: Arc<StorageService>,
}

impl AsyncStorage {
    pub fn new(service: Arc<StorageService>) -> Self {
        AsyncStorage { service }
    }

    pub fn service(&self) -> &Arc<StorageService> {
        &self.service
    }

    pub async fn apply(&self, request: MutationRequest) -> Result<Arc<VersionedEntry>, MutationError> {
        self.run(move |service| service.apply(&request)).await
    }

    pub async fn apply_synced(&self, entry: VersionedEntry) -> Result<Arc<VersionedEntry>, MutationError> {
        self.run(move |service| service.apply_synced(entry)).await
    }

    /// Apply a batch of peer records in one blocking task. One result per
    /// record, in input order.
    pub async fn apply_synced_batch(
        &self,
        entries: Vec<VersionedEntry>,
    ) -> Vec<Result<Arc<VersionedEntry>, MutationError>> {
        let count = entries.len();
        let service = Arc::clone(&self.service);
        let joined = tokio::task::spawn_blocking(move || {
            entries.into_iter().map(|entry| service.apply_synced(entry)).collect::<Vec<_>>()
        })
        .await;

        match joined {
            Ok(results) => results,
            Err(e) => {
                let reason = e.to_string();
                (0..count).map(|_| Err(MutationError::WorkerFailed(reason.clone()))).collect()
            }
        }
    }

    pub async fn confirm_mailbox_delivery(&self, delivery: MailboxDelivery) -> Result<(), MutationError> {
        self.run(move |service| service.confirm_mailbox_delivery(&delivery)).await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, MutationError>
    where
        F: FnOnce(&StorageService) -> Result<T, MutationError> + Send + 'static,
        T: Send + 'static,
    {
        let service = Arc::clone(&self.service);
        match tokio::task::spawn_blocking(move || f(&service)).await {
            Ok(result) => result,
            Err(e) => {
                debug!("Storage worker task failed: {}", e);
                Err(MutationError::WorkerFailed(e.to_string()))
            }
        }
    }
}
