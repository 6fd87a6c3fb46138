//! meshstore - a node-local replicated data store
//!
//! Every node holds typed, signed, versioned entries partitioned by data type.
//! Writers mutate entries with strictly increasing per-key sequence numbers;
//! peers converge through filter-based anti-entropy and windowed bootstrap
//! pagination. Entries expire by TTL.

pub mod config;
pub mod core_data;
pub mod core_identity;
pub mod core_sync;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod test_utils;

pub use config::Config;
pub use core_data::{MutationError, StorageService};
pub use core_sync::{SyncError, Synchronizer};
pub use logging::{init_logging, LogLevel};
