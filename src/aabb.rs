//! Axis-Aligned Bounding Boxes and Segments
//!
//! [`Aabb`] is the currency of the broad phase; [`Segment`] is the ray-cast
//! query primitive. Both are plain value types.

use crate::math::Vec2;

// ============================================================================
// Aabb
// ============================================================================

/// Axis-aligned bounding box given by its lower and upper corners.
///
/// Invariant: `upper.x >= lower.x && upper.y >= lower.y` for a valid box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Lower (min) corner.
    pub lower: Vec2,
    /// Upper (max) corner.
    pub upper: Vec2,
}

impl Aabb {
    /// Create from corners.
    #[inline]
    #[must_use]
    pub const fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Returns `true` if the corners are ordered and finite.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_finite() && self.upper.is_finite()
    }

    /// Returns `true` if this box fully contains `other`.
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Returns `true` if the two boxes overlap (touching counts).
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lower.x <= other.upper.x
            && other.lower.x <= self.upper.x
            && self.lower.y <= other.upper.y
            && other.lower.y <= self.upper.y
    }

    /// Smallest box containing both inputs.
    #[inline]
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Box center.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    /// Half-widths along each axis.
    #[inline]
    #[must_use]
    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Slab-test ray cast against this box.
    ///
    /// Returns the entry parameter along `segment` in `[0, max_lambda]`, or
    /// `None` if the segment misses. A segment starting inside the box hits
    /// at `0.0`.
    #[must_use]
    pub fn ray_cast(&self, segment: &Segment, max_lambda: f32) -> Option<f32> {
        let d = segment.p2 - segment.p1;
        let mut t_min: f32 = 0.0;
        let mut t_max = max_lambda;

        for axis in 0..2 {
            let (p, dir, lo, hi) = if axis == 0 {
                (segment.p1.x, d.x, self.lower.x, self.upper.x)
            } else {
                (segment.p1.y, d.y, self.lower.y, self.upper.y)
            };
            if dir.abs() < f32::EPSILON {
                // Parallel to this slab
                if p < lo || p > hi {
                    return None;
                }
            } else {
                let inv = 1.0 / dir;
                let mut t1 = (lo - p) * inv;
                let mut t2 = (hi - p) * inv;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }
        Some(t_min)
    }
}

// ============================================================================
// Segment
// ============================================================================

/// Directed line segment from `p1` to `p2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    /// Start point.
    pub p1: Vec2,
    /// End point.
    pub p2: Vec2,
}

impl Segment {
    /// Create from endpoints.
    #[inline]
    #[must_use]
    pub const fn new(p1: Vec2, p2: Vec2) -> Self {
        Self { p1, p2 }
    }

    /// Bounding box of the segment.
    #[inline]
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb {
            lower: self.p1.min(self.p2),
            upper: self.p1.max(self.p2),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_contains_both() {
        let a = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.5, 2.0), Vec2::new(3.0, 4.0));
        let c = a.combine(&b);
        assert!(c.contains(&a));
        assert!(c.contains(&b));
    }

    #[test]
    fn test_overlap_symmetric() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 2.0));
        let b = Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(3.0, 3.0));
        let c = Aabb::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0));
        assert!(a.overlaps(&b) && b.overlaps(&a));
        assert!(!a.overlaps(&c) && !c.overlaps(&a));
    }

    #[test]
    fn test_touching_counts_as_overlap() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn test_is_valid() {
        let good = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let bad = Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(0.0, 0.0));
        assert!(good.is_valid());
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_ray_cast_hit_and_miss() {
        let aabb = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        let hit = Segment::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0));
        let miss = Segment::new(Vec2::new(0.0, 3.0), Vec2::new(4.0, 3.0));

        let lambda = aabb.ray_cast(&hit, 1.0);
        assert!(lambda.is_some());
        let lambda = lambda.unwrap();
        assert!((lambda - 0.25).abs() < 1e-5);
        assert!(aabb.ray_cast(&miss, 1.0).is_none());
    }

    #[test]
    fn test_ray_cast_from_inside() {
        let aabb = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let seg = Segment::new(Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0));
        assert_eq!(aabb.ray_cast(&seg, 1.0), Some(0.0));
    }
}
