/*
    PrivilegedKeys - the key sets gating the Authorized tier

    Two sets, one check:
    - static keys are well-known constants fixed at startup
    - dynamic keys follow bonded-role state and change at runtime

    The dynamic set is replaced asynchronously while mutations are being
    validated. Readers take a cheap snapshot (an `Arc` clone under a short read
    lock) and never hold the lock during verification.
*/

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use crate::core_identity::PublicKey;

#[derive(Debug, Default)]
pub struct PrivilegedKeys {
    static_keys: HashSet<PublicKey>,
    keys: RwLock<Arc<HashSet<PublicKey>>>,
}

impl PrivilegedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dynamic set seeded with `keys`
    pub fn with_keys(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        PrivilegedKeys {
            static_keys: HashSet::new(),
            keys: RwLock::new(Arc::new(keys.into_iter().collect())),
        }
    }

    pub fn with_static_keys(mut self, keys: impl IntoIterator<Item = PublicKey>) -> Self {
        self.static_keys = keys.into_iter().collect();
        self
    }

    /// Check `key` against the static or the dynamic set
    pub fn accepts(&self, key: &PublicKey, static_keys_provided: bool) -> bool {
        if static_keys_provided {
            self.static_keys.contains(key)
        } else {
            self.contains(key)
        }
    }

    pub fn static_keys(&self) -> &HashSet<PublicKey> {
        &self.static_keys
    }

    /// Current key set; later updates do not affect the returned snapshot
    pub fn snapshot(&self) -> Arc<HashSet<PublicKey>> {
        self.keys.read().clone()
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.read().contains(key)
    }

    /// Replace the whole set
    pub fn replace(&self, keys: impl IntoIterator<Item = PublicKey>) {
        let next: HashSet<PublicKey> = keys.into_iter().collect();
        *self.keys.write() = Arc::new(next);
    }

    pub fn insert(&self, key: PublicKey) {
        let mut guard = self.keys.write();
        let mut next = HashSet::clone(&guard);
        next.insert(key);
        *guard = Arc::new(next);
    }

    pub fn remove(&self, key: &PublicKey) -> bool {
        let mut guard = self.keys.write();
        if !guard.contains(key) {
            return false;
        }
        let mut next = HashSet::clone(&guard);
        next.remove(key);
        *guard = Arc::new(next);
        true
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
