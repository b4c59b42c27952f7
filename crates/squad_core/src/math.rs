//! Grid coordinates and deterministic math helpers.
//!
//! Distances on the grid are compared squared so no square roots (and no
//! platform-dependent float rounding) are involved. The line tracer uses
//! fixed-point arithmetic for the same reason.

use std::fmt;
use std::ops::{Add, Sub};

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type used where fractional math is unavoidable.
///
/// 32 integer bits and 32 fractional bits.
pub type Fixed = I32F32;

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance.
    #[must_use]
    pub const fn distance_squared(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }

    /// Manhattan distance (pathfinding heuristic).
    #[must_use]
    pub const fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True if `other` is one of the eight cells surrounding `self`.
    ///
    /// Equivalent to a Euclidean distance in `(0, 1.5)`.
    #[must_use]
    pub const fn is_adjacent(self, other: Self) -> bool {
        let d = self.distance_squared(other);
        d > 0 && d <= 2
    }

    /// True if `other` lies within `radius` (inclusive) of `self`.
    #[must_use]
    pub const fn within_radius(self, other: Self, radius: u32) -> bool {
        self.distance_squared(other) <= (radius as i64) * (radius as i64)
    }

    /// True if `other` lies strictly closer than `radius` to `self`.
    #[must_use]
    pub const fn closer_than(self, other: Self, radius: u32) -> bool {
        self.distance_squared(other) < (radius as i64) * (radius as i64)
    }

    /// The four orthogonal neighbours, in fixed order (S, N, E, W).
    #[must_use]
    pub const fn orthogonal_neighbors(self) -> [Self; 4] {
        [
            Self::new(self.x, self.y + 1),
            Self::new(self.x, self.y - 1),
            Self::new(self.x + 1, self.y),
            Self::new(self.x - 1, self.y),
        ]
    }
}

impl Add for GridPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for GridPos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(i32, i32)> for GridPos {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Interpolate sample `step` of `steps` between `from` and `to`, rounded to
/// the nearest integer with ties going to the even neighbour.
///
/// `steps` must be non-zero.
#[must_use]
pub fn lerp_round(from: i32, to: i32, step: i32, steps: i32) -> i32 {
    let offset = Fixed::from_num(step * (to - from)) / Fixed::from_num(steps);
    (Fixed::from_num(from) + offset)
        .round_ties_even()
        .to_num::<i32>()
}
