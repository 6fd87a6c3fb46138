/*
    errors.rs - Error types for the data store

    Every rejection a peer can trigger is a recoverable, typed result. Nothing on
    the mutation path panics.
*/

use thiserror::Error;

use super::map_key::MapKey;

/// Reasons a mutation is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("invalid author signature for {map_key}")]
    SignatureInvalid { map_key: MapKey },

    #[error("payload {map_key} is not signed by an accepted privileged key")]
    PrivilegedKeyMismatch { map_key: MapKey },

    #[error("author of {map_key} does not match the stored entry")]
    AuthorKeyMismatch { map_key: MapKey },

    #[error("sequence number too low for {map_key}: current {current}, incoming {incoming}")]
    SequenceTooLow { map_key: MapKey, current: u32, incoming: u32 },

    #[error("sequence gap for {map_key}: current {current}, incoming {incoming}")]
    SequenceGap { map_key: MapKey, current: u32, incoming: u32 },

    /// Same sequence number and signature as the stored entry
    #[error("mutation {sequence_number} for {map_key} already received")]
    AlreadyReceived { map_key: MapKey, sequence_number: u32 },

    #[error("no entry for {map_key} to refresh or remove")]
    UnknownEntryForRefreshOrRemove { map_key: MapKey },

    #[error("entry {map_key} is already removed")]
    AlreadyRemoved { map_key: MapKey },

    #[error("invalid payload {map_key}: {reason}")]
    PayloadInvalid { map_key: MapKey, reason: String },

    #[error("payload {map_key} too large: {size} > {max} bytes")]
    PayloadTooLarge { map_key: MapKey, size: usize, max: usize },

    #[error("mutation for {map_key} is already past its time-to-live")]
    Expired { map_key: MapKey },

    #[error("store {type_name} is full ({max} entries)")]
    StoreFull { type_name: String, max: usize },

    #[error("unknown data type: {type_name}")]
    UnknownDataType { type_name: String },

    #[error("delivery confirmation for {map_key} is not from its receiver")]
    ReceiverMismatch { map_key: MapKey },

    #[error("entry {map_key} is not mailbox data")]
    NotMailboxData { map_key: MapKey },

    #[error("storage worker failed: {0}")]
    WorkerFailed(String),
}

impl MutationError {
    /// Stable label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            MutationError::SignatureInvalid { .. } => "signature_invalid",
            MutationError::PrivilegedKeyMismatch { .. } => "privileged_key_mismatch",
            MutationError::AuthorKeyMismatch { .. } => "author_key_mismatch",
            MutationError::SequenceTooLow { .. } => "sequence_too_low",
            MutationError::SequenceGap { .. } => "sequence_gap",
            MutationError::AlreadyReceived { .. } => "already_received",
            MutationError::UnknownEntryForRefreshOrRemove { .. } => "unknown_entry",
            MutationError::AlreadyRemoved { .. } => "already_removed",
            MutationError::PayloadInvalid { .. } => "payload_invalid",
            MutationError::PayloadTooLarge { .. } => "payload_too_large",
            MutationError::Expired { .. } => "expired",
            MutationError::StoreFull { .. } => "store_full",
            MutationError::UnknownDataType { .. } => "unknown_data_type",
            MutationError::ReceiverMismatch { .. } => "receiver_mismatch",
            MutationError::NotMailboxData { .. } => "not_mailbox_data",
            MutationError::WorkerFailed(_) => "worker_failed",
        }
    }

    /// Benign rejections are not worth a warning
    pub fn is_benign(&self) -> bool {
        matches!(self, MutationError::AlreadyReceived { .. })
    }
}

/// Wire encoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("unknown data type: {0}")]
    UnknownDataType(String),

    #[error("invalid payload for {type_name}: {reason}")]
    InvalidPayload { type_name: String, reason: String },

    #[error("malformed field {field}")]
    MalformedField { field: &'static str },
}

/// Snapshot load/save errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Snapshot corrupted: {0}")]
    Corrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        let key = MapKey::hash(b"k");
        assert_eq!(
            MutationError::SequenceGap { map_key: key, current: 1, incoming: 3 }.kind(),
            "sequence_gap"
        );
        assert_eq!(MutationError::WorkerFailed("boom".into()).kind(), "worker_failed");
    }

    #[test]
    fn test_error_display_contains_sequence_numbers() {
        let key = MapKey::hash(b"k");
        let msg = MutationError::SequenceTooLow { map_key: key, current: 4, incoming: 2 }.to_string();
        assert!(msg.contains("current 4"));
        assert!(msg.contains("incoming 2"));
    }

    #[test]
    fn test_only_duplicates_are_benign() {
        let key = MapKey::hash(b"k");
        assert!(MutationError::AlreadyReceived { map_key: key, sequence_number: 1 }.is_benign());
        assert!(!MutationError::SignatureInvalid { map_key: key }.is_benign());
    }
}
