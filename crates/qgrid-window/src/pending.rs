#![forbid(unsafe_code)]

//! Page offsets with a fetch in flight.
//!
//! The set is the coalescer's duplicate-suppression record: an offset enters
//! when its fetch is dispatched and leaves exactly once, when that fetch
//! settles (success or failure). Overlapping range requests that touch the
//! same page never add a second entry.

use std::collections::BTreeSet;

/// Set of in-flight page offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingPageSet {
    offsets: BTreeSet<usize>,
}

impl PendingPageSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `offset` as in flight. Returns `false` if it already was.
    pub fn insert(&mut self, offset: usize) -> bool {
        self.offsets.insert(offset)
    }

    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        self.offsets.contains(&offset)
    }

    /// Release `offset` on settlement. Returns `false` if it was not pending.
    pub fn settle(&mut self, offset: usize) -> bool {
        self.offsets.remove(&offset)
    }

    /// Whether the page holding `index` is in flight.
    #[must_use]
    pub fn covers(&self, index: usize, page_size: usize) -> bool {
        page_size > 0 && self.contains(index - index % page_size)
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// In-flight offsets in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.offsets.iter().copied()
    }
}
