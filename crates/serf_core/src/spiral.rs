//! Spiral neighbour tables.
//!
//! Spatial searches ("nearest free spot", resource search radius, ...) walk
//! tiles outward from a center in a fixed order. The order comes from
//! [`SpiralPattern`]: one center entry followed by 49 rotation groups, each
//! group holding a base offset and its five rotations by 60 degrees.
//! Groups are listed in non-decreasing ring distance, so any prefix of the
//! table covers a solid disc (up to the far groups at the end).
//!
//! The pattern is pure data built once per process. [`SpiralPosTable`] is
//! the same pattern pre-encoded for one [`MapGeometry`] and must be rebuilt
//! whenever the map dimensions change.

use std::sync::OnceLock;

use crate::map::{hex_distance, MapGeometry, MapPos};

/// Number of rotation groups after the center entry.
pub const SPIRAL_GROUPS: usize = 49;

/// Rotations per group.
pub const GROUP_SIZE: usize = 6;

/// Total number of entries: the center plus every rotation of every group.
pub const SPIRAL_LEN: usize = 1 + SPIRAL_GROUPS * GROUP_SIZE;

/// One representative offset per group, in scan order.
///
/// Rings 1 through 8 are complete. Ring 9 lacks the (9, 8) group. The last
/// five groups are sparse far rings for long-range queries.
#[rustfmt::skip]
const GROUP_BASES: [(i32, i32); SPIRAL_GROUPS] = [
    (1, 0),
    (2, 1), (2, 0),
    (3, 1), (3, 2), (3, 0),
    (4, 2), (4, 1), (4, 3), (4, 0),
    (5, 2), (5, 3), (5, 1), (5, 4), (5, 0),
    (6, 3), (6, 2), (6, 4), (6, 1), (6, 5), (6, 0),
    (7, 3), (7, 4), (7, 2), (7, 5), (7, 1), (7, 6), (7, 0),
    (8, 4), (8, 3), (8, 5), (8, 2), (8, 6), (8, 1), (8, 7), (8, 0),
    (9, 4), (9, 5), (9, 3), (9, 6), (9, 2), (9, 7), (9, 1), (9, 0),
    (16, 0), (16, 8),
    (24, 0), (24, 8), (24, 16),
];

/// Six-fold rotation seed: row `j` maps `(x, y)` to
/// `(x*m[0] + y*m[2], x*m[1] + y*m[3])`.
const ROTATION_MATRIX: [[i32; 4]; GROUP_SIZE] = [
    [1, 0, 0, 1],
    [1, 1, -1, 0],
    [0, 1, -1, -1],
    [-1, 0, 0, -1],
    [-1, -1, 1, 0],
    [0, -1, 1, 1],
];

/// Relative tile offsets in outward scan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiralPattern {
    offsets: [(i32, i32); SPIRAL_LEN],
}

impl SpiralPattern {
    /// Generate the pattern from the group bases and rotation matrix.
    #[must_use]
    pub fn build() -> Self {
        let mut offsets = [(0, 0); SPIRAL_LEN];
        for (group, &(x, y)) in GROUP_BASES.iter().enumerate() {
            for (rotation, m) in ROTATION_MATRIX.iter().enumerate() {
                offsets[1 + group * GROUP_SIZE + rotation] =
                    (x * m[0] + y * m[2], x * m[1] + y * m[3]);
            }
        }
        Self { offsets }
    }

    /// All offsets, center first.
    #[must_use]
    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    /// Offset at a scan index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(i32, i32)> {
        self.offsets.get(index).copied()
    }

    /// The center entry, always `(0, 0)`.
    #[must_use]
    pub fn center(&self) -> (i32, i32) {
        self.offsets[0]
    }

    /// The six rotations of group `group` (1-based, `1..=SPIRAL_GROUPS`).
    #[must_use]
    pub fn group(&self, group: usize) -> Option<&[(i32, i32)]> {
        if group == 0 || group > SPIRAL_GROUPS {
            return None;
        }
        let start = 1 + (group - 1) * GROUP_SIZE;
        Some(&self.offsets[start..start + GROUP_SIZE])
    }

    /// Ring distance of the entry at `index`.
    #[must_use]
    pub fn ring_of(&self, index: usize) -> Option<u32> {
        self.get(index).map(|(dx, dy)| hex_distance(dx, dy))
    }

    /// Number of leading entries whose ring distance is at most `radius`.
    ///
    /// Scanning `0..entries_within(r)` visits every tile within `r` steps
    /// for `r <= 8`.
    #[must_use]
    pub fn entries_within(&self, radius: u32) -> usize {
        self.offsets
            .partition_point(|&(dx, dy)| hex_distance(dx, dy) <= radius)
    }

    /// Number of entries (always [`SPIRAL_LEN`]).
    #[must_use]
    pub const fn len(&self) -> usize {
        SPIRAL_LEN
    }

    /// Never empty; present for API symmetry with slices.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

/// The process-wide spiral pattern, built on first use.
pub fn spiral_pattern() -> &'static SpiralPattern {
    static PATTERN: OnceLock<SpiralPattern> = OnceLock::new();
    PATTERN.get_or_init(|| {
        tracing::debug!(entries = SPIRAL_LEN, "Building spiral pattern");
        SpiralPattern::build()
    })
}

/// Spiral offsets encoded as positions for one map geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiralPosTable {
    geometry: MapGeometry,
    positions: Vec<MapPos>,
}

impl SpiralPosTable {
    /// Encode every offset of `pattern` for `geometry`.
    #[must_use]
    pub fn new(pattern: &SpiralPattern, geometry: MapGeometry) -> Self {
        let positions = pattern
            .offsets()
            .iter()
            .map(|&(dx, dy)| geometry.encode(dx, dy))
            .collect();
        Self {
            geometry,
            positions,
        }
    }

    /// Rebuild the whole table for a new geometry.
    pub fn regenerate(&mut self, geometry: MapGeometry) {
        tracing::debug!(
            cols = geometry.cols(),
            rows = geometry.rows(),
            "Regenerating spiral position table"
        );
        *self = Self::new(spiral_pattern(), geometry);
    }

    /// Geometry the table was encoded for.
    #[must_use]
    pub const fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    /// Encoded offsets in scan order.
    #[must_use]
    pub fn positions(&self) -> &[MapPos] {
        &self.positions
    }

    /// Absolute positions around `center` in scan order.
    pub fn around(&self, center: MapPos) -> impl Iterator<Item = MapPos> + '_ {
        self.positions
            .iter()
            .map(move |&offset| self.geometry.add(center, offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_length() {
        let pattern = SpiralPattern::build();
        assert_eq!(pattern.offsets().len(), 295);
        assert_eq!(pattern.len(), SPIRAL_LEN);
    }

    #[test]
    fn test_center_is_single_origin_entry() {
        let pattern = SpiralPattern::build();
        assert_eq!(pattern.center(), (0, 0));
        let origin_count = pattern
            .offsets()
            .iter()
            .filter(|&&offset| offset == (0, 0))
            .count();
        assert_eq!(origin_count, 1);
    }

    #[test]
    fn test_first_group_is_the_six_neighbours() {
        let pattern = SpiralPattern::build();
        let expected: Vec<(i32, i32)> = crate::map::Direction::ALL
            .iter()
            .map(|dir| dir.offset())
            .collect();
        assert_eq!(pattern.group(1).unwrap(), expected.as_slice());
    }

    #[test]
    fn test_known_rotations() {
        let pattern = SpiralPattern::build();
        // Group 2 has base (2, 1).
        assert_eq!(
            pattern.group(2).unwrap(),
            &[(2, 1), (1, 2), (-1, 1), (-2, -1), (-1, -2), (1, -1)]
        );
        assert_eq!(pattern.group(0), None);
        assert_eq!(pattern.group(SPIRAL_GROUPS + 1), None);
    }

    #[test]
    fn test_group_rotations_are_distinct() {
        // A non-zero offset is never fixed by a non-trivial rotation, so no
        // group has coincident entries.
        let pattern = SpiralPattern::build();
        for group in 1..=SPIRAL_GROUPS {
            let rotations = pattern.group(group).unwrap();
            let unique: HashSet<_> = rotations.iter().collect();
            assert_eq!(unique.len(), GROUP_SIZE, "group {group}");
        }
    }

    #[test]
    fn test_all_entries_distinct() {
        let pattern = SpiralPattern::build();
        let unique: HashSet<_> = pattern.offsets().iter().collect();
        assert_eq!(unique.len(), SPIRAL_LEN);
    }

    #[test]
    fn test_rings_non_decreasing() {
        let pattern = SpiralPattern::build();
        let rings: Vec<u32> = (0..SPIRAL_LEN)
            .map(|i| pattern.ring_of(i).unwrap())
            .collect();
        assert!(rings.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(rings[0], 0);
        assert_eq!(*rings.last().unwrap(), 24);
    }

    #[test]
    fn test_every_group_shares_one_ring() {
        let pattern = SpiralPattern::build();
        for group in 1..=SPIRAL_GROUPS {
            let rings: HashSet<u32> = pattern
                .group(group)
                .unwrap()
                .iter()
                .map(|&(dx, dy)| hex_distance(dx, dy))
                .collect();
            assert_eq!(rings.len(), 1, "group {group}");
        }
    }

    #[test]
    fn test_entries_within_complete_rings() {
        let pattern = SpiralPattern::build();
        // A complete ring r holds 6r tiles.
        assert_eq!(pattern.entries_within(0), 1);
        assert_eq!(pattern.entries_within(1), 7);
        assert_eq!(pattern.entries_within(2), 19);
        assert_eq!(pattern.entries_within(8), 1 + 3 * 8 * 9);
        // Ring 9 is missing one group.
        assert_eq!(pattern.entries_within(9), 1 + 3 * 9 * 10 - GROUP_SIZE);
        assert_eq!(pattern.entries_within(100), SPIRAL_LEN);
    }

    #[test]
    fn test_shared_pattern_matches_build() {
        assert_eq!(spiral_pattern(), &SpiralPattern::build());
        assert!(std::ptr::eq(spiral_pattern(), spiral_pattern()));
    }

    #[test]
    fn test_pos_table_encodes_with_masks() {
        let geometry = MapGeometry::new(6, 6).unwrap();
        let table = SpiralPosTable::new(spiral_pattern(), geometry);
        assert_eq!(table.positions().len(), SPIRAL_LEN);
        assert_eq!(table.positions()[0], MapPos::ORIGIN);
        // (-1, -1) wraps to the far corner.
        let up_left = 1 + 4;
        assert_eq!(table.positions()[up_left], geometry.encode(63, 63));
    }

    #[test]
    fn test_pos_table_regenerates_for_new_geometry() {
        let small = MapGeometry::new(5, 5).unwrap();
        let large = MapGeometry::new(7, 6).unwrap();
        let mut table = SpiralPosTable::new(spiral_pattern(), small);
        table.regenerate(large);
        assert_eq!(table.geometry(), large);
        assert_eq!(table, SpiralPosTable::new(spiral_pattern(), large));
        assert_ne!(table, SpiralPosTable::new(spiral_pattern(), small));
    }

    #[test]
    fn test_around_matches_direct_offsets() {
        let geometry = MapGeometry::new(6, 6).unwrap();
        let table = SpiralPosTable::new(spiral_pattern(), geometry);
        let center = geometry.encode(62, 1);
        for (pos, &(dx, dy)) in table.around(center).zip(spiral_pattern().offsets()) {
            assert_eq!(pos, geometry.offset(center, dx, dy));
        }
    }
}
