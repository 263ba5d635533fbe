//! Ordered free-range lists.
//!
//! Both the metadata table (free slot indices) and the data region (free
//! byte offsets) track their free space as a sorted list of half-open
//! `[start, end)` intervals. Intervals never overlap and never touch:
//! adjacent ranges are coalesced on insert.

use bytemuck::{Pod, Zeroable};

/// A half-open `[start, end)` interval, as stored in the arena.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FreeRange {
    pub start: u32,
    pub end: u32,
}

impl FreeRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    pub const fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

/// Sorted, coalescing list of free intervals.
///
/// # Examples
///
/// ```rust
/// use statarena::ranges::{FreeRange, RangeSet};
///
/// let mut set = RangeSet::new();
/// set.insert(0, 8);
/// set.insert(16, 24);
/// set.insert(8, 16); // bridges both neighbours
/// assert_eq!(set.as_slice(), &[FreeRange::new(0, 24)]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<FreeRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-sorted ranges, rejecting overlaps, touching
    /// neighbours, empty ranges, and anything past `bound`.
    pub fn from_sorted(ranges: Vec<FreeRange>, bound: u32) -> Option<Self> {
        let mut prev_end: Option<u32> = None;
        for r in &ranges {
            if r.is_empty() || r.end > bound {
                return None;
            }
            if let Some(end) = prev_end {
                if r.start <= end {
                    return None;
                }
            }
            prev_end = Some(r.end);
        }
        Some(Self { ranges })
    }

    pub fn as_slice(&self) -> &[FreeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Sum of all free lengths.
    pub fn total(&self) -> u64 {
        self.ranges.iter().map(|r| r.len() as u64).sum()
    }

    /// Return `[start, end)` to the set, merging with neighbours.
    ///
    /// Empty intervals are ignored.
    pub fn insert(&mut self, start: u32, end: u32) {
        if end <= start {
            return;
        }
        let idx = self.ranges.partition_point(|r| r.start < start);
        debug_assert!(
            idx == 0 || self.ranges[idx - 1].end <= start,
            "freed range overlaps its predecessor"
        );
        debug_assert!(
            idx == self.ranges.len() || end <= self.ranges[idx].start,
            "freed range overlaps its successor"
        );

        let merge_prev = idx > 0 && self.ranges[idx - 1].end == start;
        let merge_next = idx < self.ranges.len() && self.ranges[idx].start == end;

        match (merge_prev, merge_next) {
            (true, true) => {
                self.ranges[idx - 1].end = self.ranges[idx].end;
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx - 1].end = end,
            (false, true) => self.ranges[idx].start = start,
            (false, false) => self.ranges.insert(idx, FreeRange::new(start, end)),
        }
    }

    /// Carve `len` units from the lowest range that fits.
    pub fn take_first_fit(&mut self, len: u32) -> Option<u32> {
        let idx = self.ranges.iter().position(|r| r.len() >= len)?;
        let start = self.ranges[idx].start;
        self.carve(idx, len);
        Some(start)
    }

    /// Carve exactly `[start, start + len)` if a free range begins at
    /// `start` and is long enough. Used for in-place growth.
    pub fn take_at(&mut self, start: u32, len: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.start < start);
        match self.ranges.get(idx) {
            Some(r) if r.start == start && r.len() >= len => {
                self.carve(idx, len);
                true
            }
            _ => false,
        }
    }

    /// Length of the free range ending exactly at `end`, if any.
    pub fn len_ending_at(&self, end: u32) -> u32 {
        match self.ranges.last() {
            Some(r) if r.end == end => r.len(),
            _ => 0,
        }
    }

    fn carve(&mut self, idx: usize, len: u32) {
        let range = &mut self.ranges[idx];
        range.start += len;
        if range.is_empty() {
            self.ranges.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order() {
        let mut set = RangeSet::new();
        set.insert(20, 30);
        set.insert(0, 5);
        set.insert(10, 12);
        assert_eq!(
            set.as_slice(),
            &[
                FreeRange::new(0, 5),
                FreeRange::new(10, 12),
                FreeRange::new(20, 30)
            ]
        );
        assert_eq!(set.total(), 17);
    }

    #[test]
    fn test_coalesce_prev_and_next() {
        let mut set = RangeSet::new();
        set.insert(0, 4);
        set.insert(4, 8);
        assert_eq!(set.as_slice(), &[FreeRange::new(0, 8)]);
        set.insert(12, 16);
        set.insert(8, 12);
        assert_eq!(set.as_slice(), &[FreeRange::new(0, 16)]);
    }

    #[test]
    fn test_take_first_fit_carves_lowest() {
        let mut set = RangeSet::new();
        set.insert(0, 4);
        set.insert(10, 40);
        assert_eq!(set.take_first_fit(8), Some(10));
        assert_eq!(
            set.as_slice(),
            &[FreeRange::new(0, 4), FreeRange::new(18, 40)]
        );
        assert_eq!(set.take_first_fit(4), Some(0));
        assert_eq!(set.as_slice(), &[FreeRange::new(18, 40)]);
        assert_eq!(set.take_first_fit(100), None);
    }

    #[test]
    fn test_take_at_requires_exact_start() {
        let mut set = RangeSet::new();
        set.insert(16, 32);
        assert!(!set.take_at(8, 8));
        assert!(!set.take_at(16, 32));
        assert!(set.take_at(16, 8));
        assert_eq!(set.as_slice(), &[FreeRange::new(24, 32)]);
    }

    #[test]
    fn test_from_sorted_rejects_touching() {
        let ok = RangeSet::from_sorted(vec![FreeRange::new(0, 4), FreeRange::new(5, 8)], 8);
        assert!(ok.is_some());
        let touching = RangeSet::from_sorted(vec![FreeRange::new(0, 4), FreeRange::new(4, 8)], 8);
        assert!(touching.is_none());
        let out_of_bounds = RangeSet::from_sorted(vec![FreeRange::new(0, 9)], 8);
        assert!(out_of_bounds.is_none());
    }

    #[test]
    fn test_len_ending_at() {
        let mut set = RangeSet::new();
        set.insert(8, 16);
        assert_eq!(set.len_ending_at(16), 8);
        assert_eq!(set.len_ending_at(20), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn inserted_blocks_always_coalesce(
                order in Just((0u32..32).collect::<Vec<_>>()).prop_shuffle(),
            ) {
                let mut set = RangeSet::new();
                for block in order {
                    set.insert(block * 4, block * 4 + 4);
                }
                prop_assert_eq!(set.as_slice(), &[FreeRange::new(0, 128)]);
            }

            #[test]
            fn ranges_stay_sorted_and_disjoint(
                blocks in proptest::collection::hash_set(0u32..64, 0..40),
            ) {
                let mut set = RangeSet::new();
                for &b in &blocks {
                    set.insert(b * 2, b * 2 + 2);
                }
                prop_assert_eq!(set.total(), blocks.len() as u64 * 2);
                for pair in set.as_slice().windows(2) {
                    prop_assert!(pair[0].end < pair[1].start);
                }
            }
        }
    }
}
