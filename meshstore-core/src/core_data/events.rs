//! Change events
//!
//! Local subscribers (chat, offers, UI) learn about accepted mutations through
//! an `EventBus`. Each subscription owns an unbounded channel, so a slow
//! subscriber never causes events to be dropped for it: delivery is
//! at-least-once for the lifetime of the subscription. Dropping the
//! `Subscription` handle unsubscribes.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use super::distributed_data::DataRef;
use super::entry::VersionedEntry;
use super::map_key::MapKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Refreshed,
    Removed,
}

/// What caused a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOrigin {
    /// Live add/refresh/remove request
    Request,
    /// Record applied from a peer inventory or a snapshot
    Sync,
    /// TTL reaper eviction
    Expiry,
    /// Mailbox delivery confirmation
    Delivery,
}

#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub map_key: MapKey,
    pub type_name: String,
    pub kind: ChangeKind,
    pub origin: MutationOrigin,
    pub sequence_number: u32,
    /// Payload of the affected entry, if it still had one
    pub payload: Option<DataRef>,
    pub entry: Option<Arc<VersionedEntry>>,
}

type Subscribers = RwLock<HashMap<u64, mpsc::UnboundedSender<StoreEvent>>>;

/// Publish/subscribe hub shared by all stores of a node
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event to all subscribers
    ///
    /// # Returns
    /// Number of subscribers the event was delivered to
    pub fn emit(&self, event: StoreEvent) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for tx in subscribers.values() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Register a subscriber. Events emitted after this call are delivered
    /// until the returned handle is dropped or unsubscribed.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().insert(id, tx);

        Subscription { id, rx, subscribers: Arc::downgrade(&self.subscribers) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Subscription capability. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<StoreEvent>,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Wait for the next event. `None` once the bus is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().remove(&self.id);
        }
    }
}
