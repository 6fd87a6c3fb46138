/*
    errors.rs - Error types for anti-entropy synchronization
*/

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Caller asked for a window outside the collection. A contract violation
    /// of the calling sync logic, never a peer-triggerable condition.
    #[error("pagination out of range: offset {offset}, range {range}, size {size}")]
    PaginationOutOfRange { offset: usize, range: usize, size: usize },

    #[error("unknown data type: {type_name}")]
    UnknownDataType { type_name: String },
}
