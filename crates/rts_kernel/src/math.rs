//! Fixed-point math utilities for deterministic simulation.
//!
//! All scenario state uses fixed-point arithmetic so that every client
//! advancing the same command stream computes bit-identical results.
//! Positions are measured in cells; a quad tile spans [`QUAD_TILE_CELLS`]
//! cells along each axis.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Number of cells along one edge of a quad tile.
pub const QUAD_TILE_CELLS: i32 = 4;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point values written by hand in data files.
///
/// Descriptors are authored as decimal numbers (`speed: 1.5`) rather than raw
/// bits, so this module goes through `f64` at the data boundary only.
pub mod fixed_decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a decimal into a fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Fixed::from_num(value))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Whether both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// The result is the largest representable value whose square does not
/// exceed `value`, so perfect squares come out exact.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = value.max(Fixed::ONE).saturating_add(Fixed::DELTA);

    while high - low > Fixed::DELTA {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid.saturating_mul(mid) <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Axis-aligned rectangle in cell coordinates.
///
/// The rectangle is half-open: it contains `left <= x < right` and
/// `top <= y < bottom`. A rectangle with zero width or height is empty
/// and intersects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RectFixed {
    /// Top-left corner.
    pub origin: Vec2Fixed,
    /// Width and height.
    pub size: Vec2Fixed,
}

impl RectFixed {
    /// Create a rectangle from its top-left corner and size.
    #[must_use]
    pub const fn new(origin: Vec2Fixed, size: Vec2Fixed) -> Self {
        Self { origin, size }
    }

    /// Create a rectangle of the given size centered on a point.
    #[must_use]
    pub fn centered(center: Vec2Fixed, size: Vec2Fixed) -> Self {
        let half = Fixed::from_num(2);
        Self::new(
            Vec2Fixed::new(center.x - size.x / half, center.y - size.y / half),
            size,
        )
    }

    /// Left edge.
    #[must_use]
    pub fn left(&self) -> Fixed {
        self.origin.x
    }

    /// Top edge.
    #[must_use]
    pub fn top(&self) -> Fixed {
        self.origin.y
    }

    /// Right edge (exclusive).
    #[must_use]
    pub fn right(&self) -> Fixed {
        self.origin.x + self.size.x
    }

    /// Bottom edge (exclusive).
    #[must_use]
    pub fn bottom(&self) -> Fixed {
        self.origin.y + self.size.y
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Vec2Fixed {
        let half = Fixed::from_num(2);
        Vec2Fixed::new(
            self.origin.x + self.size.x / half,
            self.origin.y + self.size.y / half,
        )
    }

    /// Whether the rectangle covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size.x <= Fixed::ZERO || self.size.y <= Fixed::ZERO
    }

    /// Whether the point lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x >= self.left()
            && point.x < self.right()
            && point.y >= self.top()
            && point.y < self.bottom()
    }

    /// Whether two rectangles overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    /// Grow the rectangle by `amount` on every side.
    #[must_use]
    pub fn inflate(&self, amount: Fixed) -> Self {
        let twice = amount + amount;
        Self::new(
            Vec2Fixed::new(self.origin.x - amount, self.origin.y - amount),
            Vec2Fixed::new(self.size.x + twice, self.size.y + twice),
        )
    }
}

/// Position of a quad tile on the map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct QuadPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl QuadPos {
    /// Create a new quad tile position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The quad tile containing a cell position.
    #[must_use]
    pub fn containing(position: Vec2Fixed) -> Self {
        let cells = Fixed::from_num(QUAD_TILE_CELLS);
        Self::new(
            (position.x / cells).floor().to_num::<i32>(),
            (position.y / cells).floor().to_num::<i32>(),
        )
    }

    /// Top-left corner of the quad tile in cells.
    #[must_use]
    pub fn corner(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.x * QUAD_TILE_CELLS, self.y * QUAD_TILE_CELLS)
    }

    /// Area covered by a `width` x `height` block of quad tiles starting here.
    #[must_use]
    pub fn area(self, width: u32, height: u32) -> RectFixed {
        RectFixed::new(
            self.corner(),
            Vec2Fixed::from_ints(
                width as i32 * QUAD_TILE_CELLS,
                height as i32 * QUAD_TILE_CELLS,
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let dist_sq = v(3, 0).distance_squared(v(0, 4));
        assert_eq!(dist_sq, Fixed::from_num(25));
    }

    #[test]
    fn test_vec2_distance_is_exact_for_pythagorean_triples() {
        assert_eq!(v(0, 0).distance(v(3, 4)), Fixed::from_num(5));
        assert_eq!(fixed_sqrt(Fixed::ONE), Fixed::ONE);
        assert_eq!(fixed_sqrt(Fixed::from_num(0.25)), Fixed::from_num(0.5));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(72);
        let b = Fixed::from_num(1) / Fixed::from_num(72);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_vec2_lerp() {
        let mid = v(0, 0).lerp(v(10, 20), Fixed::from_num(0.5));
        assert_eq!(mid, v(5, 10));
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = v(3, 4).normalize();
        let len_sq = norm.dot(norm);
        let epsilon = Fixed::ONE / Fixed::from_num(10000);
        assert!((len_sq - Fixed::ONE).abs() < epsilon, "got {len_sq:?}");
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_rect_intersection_is_half_open() {
        let a = RectFixed::new(v(0, 0), v(4, 4));
        let touching = RectFixed::new(v(4, 0), v(4, 4));
        let overlapping = RectFixed::new(v(3, 3), v(4, 4));
        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
        assert!(a.contains(v(0, 0)));
        assert!(!a.contains(v(4, 0)));
    }

    #[test]
    fn test_empty_rect_intersects_nothing() {
        let empty = RectFixed::new(v(1, 1), v(0, 0));
        let a = RectFixed::new(v(0, 0), v(4, 4));
        assert!(!empty.intersects(&a));
        assert!(!a.intersects(&empty));
    }

    #[test]
    fn test_quad_pos_conversion() {
        assert_eq!(QuadPos::containing(v(9, 3)), QuadPos::new(2, 0));
        assert_eq!(QuadPos::new(2, 1).corner(), v(8, 4));
        let area = QuadPos::new(1, 1).area(2, 1);
        assert_eq!(area, RectFixed::new(v(4, 4), v(8, 4)));
    }
}
