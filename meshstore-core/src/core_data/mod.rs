//! Data store
//!
//! Signed, versioned, per-type key-value storage with trust tiers, TTL
//! expiry and change events.

pub mod authorization;
pub mod clock;
pub mod codec;
pub mod distributed_data;
pub mod entry;
pub mod errors;
pub mod events;
pub mod mailbox;
pub mod map_key;
pub mod meta_data;
pub mod payloads;
pub mod persistence;
pub mod reaper;
pub mod request;
pub mod snapshot_saver;
pub mod storage_service;
pub mod store;
pub mod validator;
pub mod worker;

pub use authorization::PrivilegedKeys;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{PayloadCodec, PayloadDecoder, WireData, WireEntry, WireRequest, WireTier};
pub use distributed_data::{AuthorizedData, DataRef, DataTier, DistributedData, MailboxData, ProtectedData};
pub use entry::{signing_bytes, MutationKind, VersionedEntry};
pub use errors::{CodecError, MutationError, PersistenceError};
pub use events::{ChangeKind, EventBus, MutationOrigin, StoreEvent, Subscription};
pub use mailbox::MailboxDelivery;
pub use map_key::MapKey;
pub use meta_data::{MetaData, MetaDataRegistry};
pub use persistence::{FileSnapshotPersistence, MemorySnapshotPersistence, SnapshotPersistence};
pub use reaper::TtlReaper;
pub use request::{AddRequest, MutationRequest, RefreshRequest, RemoveRequest};
pub use snapshot_saver::SnapshotSaver;
pub use storage_service::{StorageService, StorageServiceBuilder};
pub use store::DataStore;
pub use validator::{Candidate, MutationValidator, SequencePolicy};
pub use worker::AsyncStorage;
