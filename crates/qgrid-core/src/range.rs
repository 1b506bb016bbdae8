#![forbid(unsafe_code)]

//! Inclusive row-index ranges and the clamping rules applied at the caller
//! boundary.
//!
//! Renderers compute visible ranges from scroll offsets and overscan, which
//! can produce negative starts, ends past the last row, or inverted pairs.
//! Everything below the boundary works on non-empty, in-bounds ranges, so
//! normalization happens once here: an empty result is `None`, never an error.

/// Inclusive range of row indices, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRange {
    start: usize,
    end: usize,
}

impl RowRange {
    /// Build a range, returning `None` when `start > end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Option<Self> {
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// Clamp `[start, end]` to `[0, total - 1]`.
    ///
    /// Returns `None` when the clamped range is empty (including `total == 0`).
    #[must_use]
    pub fn clamp(start: usize, end: usize, total: usize) -> Option<Self> {
        let last = total.checked_sub(1)?;
        Self::new(start.min(last), end.min(last)).filter(|_| start <= end && start <= last)
    }

    /// Signed variant of [`RowRange::clamp`] for callers that subtract overscan.
    #[must_use]
    pub fn clamp_signed(start: i64, end: i64, total: usize) -> Option<Self> {
        if end < 0 || start > end {
            return None;
        }
        let start = usize::try_from(start.max(0)).ok()?;
        let end = usize::try_from(end).unwrap_or(usize::MAX);
        Self::clamp(start, end, total)
    }

    #[must_use]
    pub const fn start(self) -> usize {
        self.start
    }

    /// Last index, inclusive.
    #[must_use]
    pub const fn end(self) -> usize {
        self.end
    }

    /// Number of indices covered, saturating at `usize::MAX`.
    #[must_use]
    pub const fn len(self) -> usize {
        (self.end - self.start).saturating_add(1)
    }

    /// Ranges are never empty; provided for clippy's `len_without_is_empty`.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        false
    }

    #[must_use]
    pub const fn contains(self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    /// Half-open equivalent for coverage queries.
    ///
    /// An end of `usize::MAX` saturates, so that index is excluded; iterate
    /// the range itself to visit every index.
    #[must_use]
    pub const fn as_std(self) -> std::ops::Range<usize> {
        self.start..self.end.saturating_add(1)
    }
}

impl std::fmt::Display for RowRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

impl IntoIterator for RowRange {
    type Item = usize;
    type IntoIter = std::ops::RangeInclusive<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..=self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_inverted() {
        assert!(RowRange::new(5, 4).is_none());
        let r = RowRange::new(4, 4).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn clamp_trims_to_total() {
        let r = RowRange::clamp(40, 500, 120).unwrap();
        assert_eq!((r.start(), r.end()), (40, 119));
    }

    #[test]
    fn clamp_empty_total_is_none() {
        assert!(RowRange::clamp(0, 10, 0).is_none());
    }

    #[test]
    fn clamp_start_past_end_of_data_is_none() {
        assert!(RowRange::clamp(200, 300, 120).is_none());
    }

    #[test]
    fn clamp_inverted_is_none() {
        assert!(RowRange::clamp(70, 40, 120).is_none());
    }

    #[test]
    fn clamp_signed_handles_negative_start() {
        let r = RowRange::clamp_signed(-10, 20, 120).unwrap();
        assert_eq!((r.start(), r.end()), (0, 20));
        assert!(RowRange::clamp_signed(-10, -1, 120).is_none());
        assert!(RowRange::clamp_signed(30, 20, 120).is_none());
    }

    #[test]
    fn iteration_is_inclusive() {
        let r = RowRange::new(3, 5).unwrap();
        assert_eq!(r.into_iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(r.as_std(), 3..6);
        assert!(r.contains(5));
        assert!(!r.contains(6));
        assert_eq!(r.to_string(), "[3, 5]");
    }

    #[test]
    fn end_at_usize_max_saturates() {
        let r = RowRange::new(0, usize::MAX).unwrap();
        assert_eq!(r.len(), usize::MAX);
        assert_eq!(r.as_std(), 0..usize::MAX);
        assert!(r.contains(usize::MAX));

        let top = RowRange::new(usize::MAX, usize::MAX).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top.into_iter().collect::<Vec<_>>(), vec![usize::MAX]);
    }
}
