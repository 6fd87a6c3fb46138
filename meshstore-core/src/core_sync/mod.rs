pub mod errors;
pub mod filter;
pub mod inventory;
pub mod pagination;
pub mod wire;

pub use errors::SyncError;
pub use filter::{FilterEntry, ProtectedDataFilter};
pub use inventory::{inventory_keys, ApplyReport, Inventory, Synchronizer};
pub use pagination::{get_subset, Subset, Timestamped};
pub use wire::{decode_inventory, encode_inventory, SyncMessage, WireInventory};
