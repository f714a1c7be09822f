//! Position codec for the toroidal hex map.
//!
//! The map is a torus of `2^col_bits` columns by `2^row_bits` rows. A
//! [`MapPos`] packs a (column, row) pair into one dense integer
//! (`row * cols + col`) so tables can be addressed directly. Encoding masks
//! each axis independently, which makes every integer input valid: negative
//! and oversized coordinates wrap around exactly like the map does.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Largest supported map size class.
pub const MAX_MAP_SIZE: u32 = 10;

/// Largest bit width accepted for a single axis.
pub const MAX_AXIS_BITS: u32 = 15;

/// Dense map position, always in `[0, cols * rows)` for its geometry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct MapPos(u32);

impl MapPos {
    /// Top-left tile.
    pub const ORIGIN: Self = Self(0);

    /// Wrap a raw packed value.
    ///
    /// No masking happens here; use [`MapGeometry::encode`] for coordinates.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw packed value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Value usable as an index into per-tile tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for MapPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dimensions of the current map, stored as per-axis bit widths.
///
/// Deserialized values go through [`MapGeometry::new`], so a geometry
/// always has axis widths in `1..=MAX_AXIS_BITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct MapGeometry {
    col_bits: u32,
    row_bits: u32,
}

/// Unchecked wire form of [`MapGeometry`].
#[derive(Deserialize)]
struct RawGeometry {
    col_bits: u32,
    row_bits: u32,
}

impl TryFrom<RawGeometry> for MapGeometry {
    type Error = GameError;

    fn try_from(raw: RawGeometry) -> Result<Self> {
        Self::new(raw.col_bits, raw.row_bits)
    }
}

impl MapGeometry {
    /// Create a geometry from axis bit widths.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if either width is zero or
    /// larger than [`MAX_AXIS_BITS`].
    pub fn new(col_bits: u32, row_bits: u32) -> Result<Self> {
        let valid = |bits: u32| bits > 0 && bits <= MAX_AXIS_BITS;
        if !valid(col_bits) || !valid(row_bits) {
            return Err(GameError::InvalidState(format!(
                "Map axis widths out of range: {col_bits}x{row_bits} bits"
            )));
        }
        Ok(Self { col_bits, row_bits })
    }

    /// Geometry for a map size class in `0..=MAX_MAP_SIZE`.
    ///
    /// Columns grow first, so class 3 is 64x64 and class 4 is 128x64.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidMapSize`] for classes above [`MAX_MAP_SIZE`].
    pub fn from_size_class(size: u32) -> Result<Self> {
        if size > MAX_MAP_SIZE {
            return Err(GameError::InvalidMapSize(size));
        }
        Self::new(5 + size / 2, 5 + size.saturating_sub(1) / 2)
    }

    /// Column bit width.
    #[must_use]
    pub const fn col_bits(&self) -> u32 {
        self.col_bits
    }

    /// Row bit width.
    #[must_use]
    pub const fn row_bits(&self) -> u32 {
        self.row_bits
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> u32 {
        1 << self.col_bits
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        1 << self.row_bits
    }

    /// Mask applied to column values.
    #[must_use]
    pub const fn col_mask(&self) -> u32 {
        self.cols() - 1
    }

    /// Mask applied to row values.
    #[must_use]
    pub const fn row_mask(&self) -> u32 {
        self.rows() - 1
    }

    /// Total number of tiles.
    #[must_use]
    pub const fn tile_count(&self) -> usize {
        (self.cols() as usize) * (self.rows() as usize)
    }

    /// Encode a coordinate pair, wrapping both axes.
    #[inline]
    #[must_use]
    pub const fn encode(&self, x: i32, y: i32) -> MapPos {
        let col = (x as u32) & self.col_mask();
        let row = (y as u32) & self.row_mask();
        MapPos((row << self.col_bits) | col)
    }

    /// Decode a position into `(col, row)`.
    #[inline]
    #[must_use]
    pub const fn decode(&self, pos: MapPos) -> (u32, u32) {
        (self.col(pos), self.row(pos))
    }

    /// Column of a position.
    #[inline]
    #[must_use]
    pub const fn col(&self, pos: MapPos) -> u32 {
        pos.0 & self.col_mask()
    }

    /// Row of a position.
    #[inline]
    #[must_use]
    pub const fn row(&self, pos: MapPos) -> u32 {
        (pos.0 >> self.col_bits) & self.row_mask()
    }

    /// Add two positions axis by axis.
    ///
    /// Used with precomputed offset positions (see the spiral position
    /// table), where `offset` is itself an encoded relative offset.
    #[inline]
    #[must_use]
    pub const fn add(&self, pos: MapPos, offset: MapPos) -> MapPos {
        let col = self.col(pos).wrapping_add(self.col(offset)) & self.col_mask();
        let row = self.row(pos).wrapping_add(self.row(offset)) & self.row_mask();
        MapPos((row << self.col_bits) | col)
    }

    /// Move a position by a signed offset.
    #[inline]
    #[must_use]
    pub const fn offset(&self, pos: MapPos, dx: i32, dy: i32) -> MapPos {
        let col = self.col(pos).wrapping_add(dx as u32) & self.col_mask();
        let row = self.row(pos).wrapping_add(dy as u32) & self.row_mask();
        MapPos((row << self.col_bits) | col)
    }

    /// Step to the neighbouring tile in `dir`.
    #[must_use]
    pub const fn move_in(&self, pos: MapPos, dir: Direction) -> MapPos {
        let (dx, dy) = dir.offset();
        self.offset(pos, dx, dy)
    }

    /// Whether a raw position lies inside this map.
    #[must_use]
    pub const fn contains(&self, pos: MapPos) -> bool {
        (pos.0 as usize) < self.tile_count()
    }
}

/// The six neighbour directions of a hex tile.
///
/// Ordered clockwise; each offset is the previous one rotated by 60 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// (+1, 0)
    Right,
    /// (+1, +1)
    DownRight,
    /// (0, +1)
    Down,
    /// (-1, 0)
    Left,
    /// (-1, -1)
    UpLeft,
    /// (0, -1)
    Up,
}

impl Direction {
    /// All directions in clockwise order.
    pub const ALL: [Self; 6] = [
        Self::Right,
        Self::DownRight,
        Self::Down,
        Self::Left,
        Self::UpLeft,
        Self::Up,
    ];

    /// Column/row offset of one step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::DownRight => (1, 1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::UpLeft => (-1, -1),
            Self::Up => (0, -1),
        }
    }

    /// The opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::DownRight => Self::UpLeft,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::UpLeft => Self::DownRight,
            Self::Up => Self::Down,
        }
    }
}

/// Number of steps between two tiles separated by `(dx, dy)`.
///
/// Moving along both axes at once with the same sign costs one step
/// (`DownRight`/`UpLeft`), mixed signs cost one step per unit.
#[must_use]
pub const fn hex_distance(dx: i32, dy: i32) -> u32 {
    let ax = dx.unsigned_abs();
    let ay = dy.unsigned_abs();
    if (dx >= 0) == (dy >= 0) {
        if ax > ay {
            ax
        } else {
            ay
        }
    } else {
        ax + ay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry_64() -> MapGeometry {
        MapGeometry::new(6, 6).unwrap()
    }

    #[test]
    fn test_negative_column_wraps() {
        let geo = geometry_64();
        assert_eq!(geo.encode(-1, 0), geo.encode(63, 0));
        assert_eq!(geo.decode(geo.encode(-1, 0)), (63, 0));
    }

    #[test]
    fn test_encode_layout() {
        let geo = MapGeometry::new(6, 5).unwrap();
        assert_eq!(geo.cols(), 64);
        assert_eq!(geo.rows(), 32);
        // row * cols + col
        assert_eq!(geo.encode(3, 2).raw(), 2 * 64 + 3);
        assert_eq!(geo.encode(64, 32), MapPos::ORIGIN);
    }

    #[test]
    fn test_size_classes() {
        let tiny = MapGeometry::from_size_class(0).unwrap();
        assert_eq!((tiny.cols(), tiny.rows()), (32, 32));

        let standard = MapGeometry::from_size_class(3).unwrap();
        assert_eq!((standard.cols(), standard.rows()), (64, 64));

        let wide = MapGeometry::from_size_class(4).unwrap();
        assert_eq!((wide.cols(), wide.rows()), (128, 64));

        assert!(matches!(
            MapGeometry::from_size_class(MAX_MAP_SIZE + 1),
            Err(GameError::InvalidMapSize(11))
        ));
    }

    #[test]
    fn test_invalid_axis_widths() {
        assert!(MapGeometry::new(0, 6).is_err());
        assert!(MapGeometry::new(6, MAX_AXIS_BITS + 1).is_err());
    }

    #[test]
    fn test_deserialize_validates_axis_widths() {
        let geo: MapGeometry = ron::from_str("(col_bits: 7, row_bits: 6)").unwrap();
        assert_eq!((geo.cols(), geo.rows()), (128, 64));

        for bad in [
            "(col_bits: 40, row_bits: 6)",
            "(col_bits: 0, row_bits: 20)",
            "(col_bits: 20, row_bits: 20)",
        ] {
            let err = ron::from_str::<MapGeometry>(bad).unwrap_err();
            assert!(err.to_string().contains("out of range"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_move_wraps_around_edges() {
        let geo = geometry_64();
        let corner = geo.encode(0, 0);
        assert_eq!(geo.move_in(corner, Direction::Left), geo.encode(63, 0));
        assert_eq!(geo.move_in(corner, Direction::UpLeft), geo.encode(63, 63));
        assert_eq!(geo.move_in(corner, Direction::Up), geo.encode(0, 63));
    }

    #[test]
    fn test_direction_reverse_returns_home() {
        let geo = geometry_64();
        let start = geo.encode(10, 20);
        for dir in Direction::ALL {
            let there = geo.move_in(start, dir);
            assert_ne!(there, start);
            assert_eq!(geo.move_in(there, dir.reverse()), start);
        }
    }

    #[test]
    fn test_add_matches_offset() {
        let geo = geometry_64();
        let pos = geo.encode(60, 1);
        let delta = geo.encode(-5, 7);
        assert_eq!(geo.add(pos, delta), geo.offset(pos, -5, 7));
        assert_eq!(geo.add(pos, delta), geo.encode(55, 8));
    }

    #[test]
    fn test_hex_distance() {
        assert_eq!(hex_distance(0, 0), 0);
        for dir in Direction::ALL {
            let (dx, dy) = dir.offset();
            assert_eq!(hex_distance(dx, dy), 1);
        }
        assert_eq!(hex_distance(3, 2), 3);
        assert_eq!(hex_distance(-2, -4), 4);
        assert_eq!(hex_distance(2, -1), 3);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            col_bits in 1u32..=10,
            row_bits in 1u32..=10,
            x in any::<i32>(),
            y in any::<i32>(),
        ) {
            let geo = MapGeometry::new(col_bits, row_bits).unwrap();
            let pos = geo.encode(x, y);
            prop_assert!(geo.contains(pos));
            let expected = (
                x.rem_euclid(geo.cols() as i32) as u32,
                y.rem_euclid(geo.rows() as i32) as u32,
            );
            prop_assert_eq!(geo.decode(pos), expected);
        }

        #[test]
        fn prop_offset_matches_independent_wrap(
            x in -5000i32..5000,
            y in -5000i32..5000,
            dx in -300i32..300,
            dy in -300i32..300,
        ) {
            let geo = MapGeometry::from_size_class(5).unwrap();
            let moved = geo.offset(geo.encode(x, y), dx, dy);
            prop_assert_eq!(moved, geo.encode(x + dx, y + dy));
        }
    }
}
