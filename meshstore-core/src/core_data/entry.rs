/*
    VersionedEntry - the latest accepted mutation stored under a MapKey

    The store keeps no history, only the newest entry per slot:
    - Add      payload present, sequence starts at 1
    - Refresh  payload carried over, re-signed with a newer created_at
    - Remove   tombstone, payload dropped, sequence retained

    Every entry is self-certifying: the author signature covers the mutation kind,
    the sequence number, the creation time and the MapKey, so a record received
    through anti-entropy can be verified without any local context.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_identity::{PublicKey, Signature};

use super::distributed_data::ProtectedData;
use super::map_key::MapKey;
use super::meta_data::MetaData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Add,
    Refresh,
    Remove,
}

impl MutationKind {
    /// Domain separation tag prefixed to the signed bytes
    pub fn tag(&self) -> &'static [u8] {
        match self {
            MutationKind::Add => b"ADD",
            MutationKind::Refresh => b"REFRESH",
            MutationKind::Remove => b"REMOVE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Refresh => "refresh",
            MutationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes an author signs for a mutation:
/// `kind tag || sequence (u32 BE) || created_at (i64 BE) || map key`
pub fn signing_bytes(
    kind: MutationKind,
    sequence_number: u32,
    created_at_millis: i64,
    map_key: &MapKey,
) -> Vec<u8> {
    let tag = kind.tag();
    let mut bytes = Vec::with_capacity(tag.len() + 4 + 8 + 32);
    bytes.extend_from_slice(tag);
    bytes.extend_from_slice(&sequence_number.to_be_bytes());
    bytes.extend_from_slice(&created_at_millis.to_be_bytes());
    bytes.extend_from_slice(map_key.as_bytes());
    bytes
}

/// Latest accepted state of a store slot
#[derive(Debug, Clone)]
pub struct VersionedEntry {
    pub map_key: MapKey,
    pub kind: MutationKind,
    pub sequence_number: u32,
    pub created_at_millis: i64,
    pub author_public_key: PublicKey,
    pub signature: Signature,
    pub meta_data: MetaData,
    /// `None` for tombstones
    pub data: Option<ProtectedData>,
}

impl VersionedEntry {
    pub fn is_tombstone(&self) -> bool {
        self.kind == MutationKind::Remove
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.meta_data.is_expired(self.created_at_millis, now_millis)
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(self.kind, self.sequence_number, self.created_at_millis, &self.map_key)
    }

    pub fn verify_signature(&self) -> bool {
        self.author_public_key.verify(&self.signing_bytes(), &self.signature)
    }

    pub fn type_name(&self) -> &str {
        &self.meta_data.type_name
    }

    /// Serialized payload size, 0 for tombstones
    pub fn payload_size(&self) -> usize {
        self.data.as_ref().map(|d| d.data().serialize().len()).unwrap_or(0)
    }
}
