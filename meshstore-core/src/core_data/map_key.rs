/*
    MapKey - identity of a store slot

    A MapKey is the blake3 hash of a protected payload: its canonical serialization
    plus the tier data around it. It is stable across add/refresh/remove of the same
    payload, so refresh and remove requests can address a slot without re-sending it.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// 256-bit hash identifying a store slot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapKey([u8; 32]);

impl MapKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MapKey(bytes)
    }

    /// Hash arbitrary bytes into a MapKey
    pub fn hash(data: &[u8]) -> Self {
        MapKey(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are enough to tell keys apart in logs
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapKey({})", self)
    }
}

impl From<[u8; 32]> for MapKey {
    fn from(bytes: [u8; 32]) -> Self {
        MapKey(bytes)
    }
}

impl From<MapKey> for [u8; 32] {
    fn from(key: MapKey) -> Self {
        key.0
    }
}
