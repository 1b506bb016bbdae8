#![forbid(unsafe_code)]

//! Sparse row cache for one execution.
//!
//! [`RowWindow`] maps row indices to rows without pre-allocating: a viewport
//! that jumps from row 0 to row 900 000 stores two pages, not 900 000 slots.
//! Indices that were never fetched are holes; an explicit `null` row is a
//! loaded entry and is reported by [`RowWindow::has`].
//!
//! # Example
//!
//! ```
//! use qgrid_core::Row;
//! use qgrid_window::RowWindow;
//!
//! let mut window = RowWindow::new();
//! window.merge(100, vec![Row::null(), Row::null()]);
//!
//! assert!(window.has(100));
//! assert!(window.has(101));
//! assert!(!window.has(0)); // hole
//! assert_eq!(window.len(), 2);
//! ```
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `has` / `get` | O(log n) |
//! | `merge(k rows)` | O(k log n) |
//! | `contains_all(range)` | O(r log n) with early exit |
//! | `reset` | O(n) |
//!
//! The window does not know the execution's total row count. Callers that
//! need "how many rows exist" ask the execution; `len` is occupancy only.

use std::collections::BTreeMap;
use std::ops::Range;

use qgrid_core::Row;

/// Sparse index → row map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowWindow {
    rows: BTreeMap<usize, Row>,
}

impl RowWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a row is present at `index`.
    #[must_use]
    pub fn has(&self, index: usize) -> bool {
        self.rows.contains_key(&index)
    }

    /// Row at `index`, or `None` for a hole.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(&index)
    }

    /// Write `rows[k]` at `offset + k`, overwriting existing entries.
    ///
    /// Entries outside `offset .. offset + rows.len()` are untouched, so merges
    /// at disjoint offsets commute. Returns the number of entries written.
    pub fn merge(&mut self, offset: usize, rows: impl IntoIterator<Item = Row>) -> usize {
        let mut written = 0;
        for (k, row) in rows.into_iter().enumerate() {
            let Some(index) = offset.checked_add(k) else {
                break;
            };
            self.rows.insert(index, row);
            written += 1;
        }
        written
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    /// Whether every index in `range` is present. Vacuously true when empty.
    #[must_use]
    pub fn contains_all(&self, range: Range<usize>) -> bool {
        range.into_iter().all(|index| self.rows.contains_key(&index))
    }

    /// Number of loaded entries within `range`.
    #[must_use]
    pub fn loaded_in(&self, range: Range<usize>) -> usize {
        if range.is_empty() {
            return 0;
        }
        self.rows.range(range).count()
    }

    /// Iterate `range` in index order, yielding `None` for holes.
    ///
    /// This is the render-side view: every slot of the viewport is reported,
    /// loaded or not.
    pub fn iter_range(&self, range: Range<usize>) -> impl Iterator<Item = (usize, Option<&Row>)> {
        range.map(move |index| (index, self.rows.get(&index)))
    }

    /// Iterate loaded entries in index order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &Row)> {
        self.rows.iter().map(|(index, row)| (*index, row))
    }

    /// Number of loaded entries (occupancy, not result size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest loaded index.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.rows.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(tag: &str, count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| Row::from(json!({"tag": tag, "i": i})))
            .collect()
    }

    #[test]
    fn new_window_is_empty() {
        let window = RowWindow::new();
        assert!(window.is_empty());
        assert_eq!(window.len(), 0);
        assert_eq!(window.last_index(), None);
        assert!(!window.has(0));
        assert!(window.get(0).is_none());
    }

    #[test]
    fn merge_places_rows_at_offset() {
        let mut window = RowWindow::new();
        let written = window.merge(50, rows("a", 3));

        assert_eq!(written, 3);
        assert!(!window.has(49));
        assert_eq!(window.get(50).unwrap().get("i"), Some(&json!(0)));
        assert_eq!(window.get(52).unwrap().get("i"), Some(&json!(2)));
        assert!(!window.has(53));
    }

    #[test]
    fn merge_overwrites_existing_entries() {
        let mut window = RowWindow::new();
        window.merge(0, rows("old", 4));
        window.merge(2, rows("new", 4));

        assert_eq!(window.get(1).unwrap().get("tag"), Some(&json!("old")));
        assert_eq!(window.get(2).unwrap().get("tag"), Some(&json!("new")));
        assert_eq!(window.get(5).unwrap().get("tag"), Some(&json!("new")));
        assert_eq!(window.len(), 6);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = RowWindow::new();
        once.merge(10, rows("p", 5));

        let mut twice = RowWindow::new();
        twice.merge(10, rows("p", 5));
        twice.merge(10, rows("p", 5));

        assert_eq!(once, twice);
    }

    #[test]
    fn disjoint_merges_commute() {
        let mut ab = RowWindow::new();
        ab.merge(0, rows("a", 50));
        ab.merge(50, rows("b", 50));

        let mut ba = RowWindow::new();
        ba.merge(50, rows("b", 50));
        ba.merge(0, rows("a", 50));

        assert_eq!(ab, ba);
    }

    #[test]
    fn null_row_is_loaded_not_a_hole() {
        let mut window = RowWindow::new();
        window.merge(7, vec![Row::null()]);

        assert!(window.has(7));
        assert!(window.get(7).unwrap().is_null());
        assert!(!window.has(8));
    }

    #[test]
    fn sparse_far_jump() {
        let mut window = RowWindow::new();
        window.merge(0, rows("top", 50));
        window.merge(900_000, rows("far", 50));

        assert_eq!(window.len(), 100);
        assert_eq!(window.last_index(), Some(900_049));
        assert_eq!(window.loaded_in(50..900_000), 0);
    }

    #[test]
    fn contains_all_checks_every_index() {
        let mut window = RowWindow::new();
        window.merge(0, rows("a", 10));

        assert!(window.contains_all(0..10));
        assert!(!window.contains_all(0..11));
        assert!(window.contains_all(5..5));
    }

    #[test]
    fn iter_range_reports_holes() {
        let mut window = RowWindow::new();
        window.merge(1, rows("a", 1));

        let slots: Vec<_> = window
            .iter_range(0..3)
            .map(|(index, row)| (index, row.is_some()))
            .collect();
        assert_eq!(slots, vec![(0, false), (1, true), (2, false)]);
    }

    #[test]
    fn loaded_in_counts_partial_pages() {
        let mut window = RowWindow::new();
        window.merge(0, rows("a", 30));
        assert_eq!(window.loaded_in(0..50), 30);
        assert_eq!(window.loaded_in(20..25), 5);
        assert_eq!(window.loaded_in(10..10), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut window = RowWindow::new();
        window.merge(0, rows("a", 10));
        window.reset();

        assert!(window.is_empty());
        assert!(!window.has(0));
    }

    #[test]
    fn empty_merge_writes_nothing() {
        let mut window = RowWindow::new();
        assert_eq!(window.merge(5, Vec::new()), 0);
        assert!(window.is_empty());
    }
}
