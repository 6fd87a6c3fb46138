/*
    Windowed pagination for bootstrap transfer

    A peer with no prior knowledge pulls a whole partition in chunks. Items are
    ordered newest first and the window `[offset, offset + range)` is returned,
    truncated to `max_items`. The truncation is reported, not an error.

    A window outside the collection is a bug in the calling sync logic and is
    reported loudly as `PaginationOutOfRange` rather than clamped.
*/

use std::sync::Arc;
use tracing::error;

use crate::core_data::VersionedEntry;

use super::errors::SyncError;

/// Anything that can be ordered by creation time
pub trait Timestamped {
    fn created_at_millis(&self) -> i64;
}

impl Timestamped for VersionedEntry {
    fn created_at_millis(&self) -> i64 {
        self.created_at_millis
    }
}

impl<T: Timestamped + ?Sized> Timestamped for Arc<T> {
    fn created_at_millis(&self) -> i64 {
        (**self).created_at_millis()
    }
}

/// One page of a windowed transfer
#[derive(Debug, Clone)]
pub struct Subset<T> {
    pub items: Vec<T>,
    /// Items inside the window that did not fit under `max_items`
    pub num_dropped: usize,
}

pub fn get_subset<T: Timestamped + Clone>(
    items: &[T],
    offset: usize,
    range: usize,
    max_items: usize,
) -> Result<Subset<T>, SyncError> {
    let size = items.len();
    let end = offset.checked_add(range);

    if range > size || end.map(|end| end > size).unwrap_or(true) {
        error!(offset, range, size, "Pagination request out of range");
        return Err(SyncError::PaginationOutOfRange { offset, range, size });
    }
    let end = offset + range;

    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| b.created_at_millis().cmp(&a.created_at_millis()));

    let window = &sorted[offset..end];
    let included = window.len().min(max_items);
    Ok(Subset {
        items: window[..included].iter().map(|item| (*item).clone()).collect(),
        num_dropped: window.len() - included,
    })
}
