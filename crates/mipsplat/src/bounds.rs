//! Axis-aligned bounds of the local and the global (all-rank) point set.

use crate::comm::{ProcessGroup, ReduceOp};
use crate::error::CommError;
use rayon::prelude::*;

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    /// Identity of the min/max reduction: contributes nothing when merged.
    pub const EMPTY: Bounds = Bounds {
        min: [f64::INFINITY; 3],
        max: [f64::NEG_INFINITY; 3],
    };

    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// `true` if no point has been merged (any axis has `min > max`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.min[a] > self.max[a])
    }

    #[inline]
    pub fn merge(self, other: Bounds) -> Bounds {
        Bounds {
            min: [
                self.min[0].min(other.min[0]),
                self.min[1].min(other.min[1]),
                self.min[2].min(other.min[2]),
            ],
            max: [
                self.max[0].max(other.max[0]),
                self.max[1].max(other.max[1]),
                self.max[2].max(other.max[2]),
            ],
        }
    }

    /// Parallel AABB over a slice of points of either precision.
    pub fn of_points<T>(points: &[[T; 3]]) -> Bounds
    where
        T: Copy + Into<f64> + Sync,
    {
        points
            .par_iter()
            .map(|p| {
                let q = [p[0].into(), p[1].into(), p[2].into()];
                Bounds { min: q, max: q }
            })
            .reduce(|| Bounds::EMPTY, Bounds::merge)
    }

    /// `[min_x, max_x, min_y, max_y, min_z, max_z]`.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min[0], self.max[0], self.min[1], self.max[1], self.min[2], self.max[2],
        ]
    }

    pub fn from_array(b: [f64; 6]) -> Self {
        Self {
            min: [b[0], b[2], b[4]],
            max: [b[1], b[3], b[5]],
        }
    }

    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Length of the box diagonal; zero for empty bounds.
    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let d = [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ];
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }
}

/// Combines the local bounds of every rank. Collective: every rank in
/// `group` must call this, in the same order as its other collectives.
/// Without a group the local bounds are returned unchanged.
pub fn global_bounds(
    local: Bounds,
    group: Option<&dyn ProcessGroup>,
) -> Result<Bounds, CommError> {
    let Some(group) = group else {
        return Ok(local);
    };

    let mins = group.all_reduce(&local.min, ReduceOp::Min)?;
    let maxes = group.all_reduce(&local.max, ReduceOp::Max)?;

    Ok(Bounds {
        min: [mins[0], mins[1], mins[2]],
        max: [maxes[0], maxes[1], maxes[2]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_of_points() {
        let b = Bounds::of_points(&[[1.0f32, -2.0, 3.0], [-1.0, 4.0, 0.5]]);
        assert_eq!(b.to_array(), [-1.0, 1.0, -2.0, 4.0, 0.5, 3.0]);
    }

    #[test]
    fn empty_is_merge_identity() {
        let b = Bounds::new([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]);
        assert_eq!(Bounds::EMPTY.merge(b), b);
        assert!(Bounds::of_points::<f64>(&[]).is_empty());
    }

    #[test]
    fn single_process_returns_local_bounds() {
        let b = Bounds::new([-1.5, 0.0, 2.0], [1.5, 8.0, 2.0]);
        assert_eq!(global_bounds(b, None).unwrap(), b);
    }

    #[test]
    fn array_round_trip_layout() {
        let b = Bounds::from_array([0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(b.min, [0.0, 2.0, 4.0]);
        assert_eq!(b.max, [1.0, 3.0, 5.0]);
    }
}
