/*
    Wire messages exchanged between peers during reconciliation

    Filters are plain serde values. Inventories carry entries as `WireEntry`
    and need a PayloadCodec to turn them back into typed records. Entries a
    node cannot decode are skipped so one unknown record does not poison the
    whole response.
*/

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::core_data::codec::{from_bytes, to_bytes, WireEntry};
use crate::core_data::{CodecError, PayloadCodec};

use super::filter::ProtectedDataFilter;
use super::inventory::Inventory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireInventory {
    pub type_name: String,
    pub entries: Vec<WireEntry>,
    pub num_dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    InventoryRequest(ProtectedDataFilter),
    InventoryResponse(WireInventory),
    BootstrapRequest { type_name: String, offset: u64, range: u64 },
}

pub fn encode_inventory(codec: &PayloadCodec, inventory: &Inventory) -> WireInventory {
    WireInventory {
        type_name: inventory.type_name.clone(),
        entries: inventory.entries.iter().map(|entry| codec.encode_entry(entry)).collect(),
        num_dropped: inventory.num_dropped as u64,
    }
}

pub fn decode_inventory(codec: &PayloadCodec, wire: WireInventory) -> Inventory {
    let mut entries = Vec::with_capacity(wire.entries.len());
    for entry in wire.entries {
        let map_key = entry.map_key;
        match codec.decode_entry(entry) {
            Ok(entry) => entries.push(Arc::new(entry)),
            Err(e) => warn!(map_key = %map_key, type_name = %wire.type_name, "Skipping undecodable inventory entry: {}", e),
        }
    }

    Inventory { type_name: wire.type_name, entries, num_dropped: wire.num_dropped as usize }
}

pub fn message_to_bytes(message: &SyncMessage) -> Result<Vec<u8>, CodecError> {
    to_bytes(message)
}

pub fn message_from_bytes(bytes: &[u8]) -> Result<SyncMessage, CodecError> {
    from_bytes(bytes)
}
