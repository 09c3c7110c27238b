//! GJK Distance Query
//!
//! Closest-point computation between two convex shapes via GJK on the
//! Minkowski difference. Works on the shapes' core geometry (polygon hulls,
//! circle centers, edge core segments); circle radii are peeled off the
//! result at the end so the reported distance is between surfaces.
//!
//! The TOI module leans on this: conservative advancement repeatedly asks
//! for the distance and the closest-point normal between two swept shapes.
//!
//! Termination: barycentric simplex solve until the simplex encloses the
//! origin (overlap), the support direction degenerates, a support point
//! repeats (no progress), or the iteration cap is hit.

use crate::math::{Transform, Vec2};
use crate::shape::ShapeKind;

/// Result of a distance query.
#[derive(Clone, Copy, Debug)]
pub struct DistanceOutput {
    /// Closest point on the first shape's surface (world).
    pub point_a: Vec2,
    /// Closest point on the second shape's surface (world).
    pub point_b: Vec2,
    /// Surface distance; `0.0` means overlapping.
    pub distance: f32,
    /// GJK iterations used.
    pub iterations: u32,
}

/// World support point of the core geometry plus its feature index, used for
/// cycling detection.
fn support_point(shape: &ShapeKind, xf: &Transform, d: Vec2) -> (Vec2, u8) {
    match shape {
        ShapeKind::Circle { local_position, .. } | ShapeKind::Point { local_position } => {
            (xf.mul(*local_position), 0)
        }
        ShapeKind::Polygon { vertices, .. } => {
            let d_local = xf.rot.mul_t_vec(d);
            let mut best = 0;
            let mut best_dot = vertices[0].dot(d_local);
            for (i, v) in vertices.iter().enumerate().skip(1) {
                let dot = v.dot(d_local);
                if dot > best_dot {
                    best_dot = dot;
                    best = i;
                }
            }
            (xf.mul(vertices[best]), best as u8)
        }
        ShapeKind::Edge {
            core_v1, core_v2, ..
        } => {
            let d_local = xf.rot.mul_t_vec(d);
            if core_v1.dot(d_local) > core_v2.dot(d_local) {
                (xf.mul(*core_v1), 0)
            } else {
                (xf.mul(*core_v2), 1)
            }
        }
    }
}

// ============================================================================
// Simplex
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    /// Support on A (world).
    w_a: Vec2,
    /// Support on B (world).
    w_b: Vec2,
    /// Minkowski difference point `w_b - w_a`.
    w: Vec2,
    /// Barycentric weight.
    a: f32,
    index_a: u8,
    index_b: u8,
}

#[derive(Clone, Copy, Debug, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    /// Direction from the current closest point toward the origin.
    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12
                    Vec2::new(-e12.y, e12.x)
                } else {
                    Vec2::new(e12.y, -e12.x)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    /// Witness points on both shapes for the current barycentric weights.
    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].w_a, self.v[0].w_b),
            2 => {
                let (v0, v1) = (&self.v[0], &self.v[1]);
                (
                    v0.w_a * v0.a + v1.w_a * v1.a,
                    v0.w_b * v0.a + v1.w_b * v1.a,
                )
            }
            _ => {
                // Overlapping: both witness points coincide
                let p = self.v[0].w_a * self.v[0].a
                    + self.v[1].w_a * self.v[1].a
                    + self.v[2].w_a * self.v[2].a;
                (p, p)
            }
        }
    }

    /// Closest point on a line segment to the origin (barycentric regions).
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let inv = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv;
        self.v[1].a = d12_2 * inv;
        self.count = 2;
    }

    /// Closest point on a triangle to the origin (barycentric regions).
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // Vertex w1
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge w1-w2
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }
        // Edge w1-w3
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.v[1] = self.v[2];
            self.count = 2;
            return;
        }
        // Vertex w2
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[0] = self.v[1];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Vertex w3
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[0] = self.v[2];
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        // Edge w2-w3
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.v[0] = self.v[2];
            self.count = 2;
            return;
        }
        // Interior: the origin is enclosed
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

// ============================================================================
// Distance Query
// ============================================================================

/// Surface distance and closest points between two convex shapes.
#[must_use]
pub fn distance(
    shape_a: &ShapeKind,
    xf_a: &Transform,
    shape_b: &ShapeKind,
    xf_b: &Transform,
    max_iterations: u32,
) -> DistanceOutput {
    let mut simplex = Simplex::default();

    // Seed with a support in the direction between the two transforms
    let mut d = xf_b.position - xf_a.position;
    if d.length_squared() < f32::EPSILON {
        d = Vec2::UNIT_X;
    }
    {
        let (w_a, index_a) = support_point(shape_a, xf_a, -d);
        let (w_b, index_b) = support_point(shape_b, xf_b, d);
        simplex.v[0] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 1.0,
            index_a,
            index_b,
        };
        simplex.count = 1;
    }

    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;

        // Feature indices of the current simplex, for cycling detection
        let mut saved = [(0_u8, 0_u8); 3];
        for i in 0..simplex.count {
            saved[i] = (simplex.v[i].index_a, simplex.v[i].index_b);
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // The simplex contains the origin: shapes overlap
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // Origin on a simplex feature; treat as touching
            break;
        }

        let (w_a, index_a) = support_point(shape_a, xf_a, -d);
        let (w_b, index_b) = support_point(shape_b, xf_b, d);

        // A repeated support point means no further progress
        if saved[..simplex.count]
            .iter()
            .any(|&(ia, ib)| ia == index_a && ib == index_b)
        {
            break;
        }

        simplex.v[simplex.count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_b - point_a).length();

    // Peel off the surface radii
    let r_a = shape_a.surface_radius();
    let r_b = shape_b.surface_radius();
    if dist > r_a + r_b && dist > f32::EPSILON {
        dist -= r_a + r_b;
        let normal = (point_b - point_a).normalize();
        point_a += normal * r_a;
        point_b -= normal * r_b;
    } else {
        let mid = (point_a + point_b) * 0.5;
        point_a = mid;
        point_b = mid;
        dist = 0.0;
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ITERS: u32 = 20;

    #[test]
    fn test_circle_circle_distance() {
        let a = ShapeKind::circle(1.0);
        let b = ShapeKind::circle(0.5);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let out = distance(&a, &xf_a, &b, &xf_b, ITERS);
        assert!((out.distance - 3.5).abs() < 1e-4);
        assert!((out.point_a - Vec2::new(1.0, 0.0)).length() < 1e-4);
        assert!((out.point_b - Vec2::new(4.5, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_overlapping_circles_distance_zero() {
        let a = ShapeKind::circle(1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(0.5, 0.0), 0.0);
        let out = distance(&a, &xf_a, &a.clone(), &xf_b, ITERS);
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn test_box_box_face_distance() {
        let a = ShapeKind::boxed(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(4.0, 0.0), 0.0);
        let out = distance(&a, &xf_a, &a.clone(), &xf_b, ITERS);
        assert!((out.distance - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_box_corner_to_corner() {
        let a = ShapeKind::boxed(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(3.0, 3.0), 0.0);
        let out = distance(&a, &xf_a, &a.clone(), &xf_b, ITERS);
        // Corner (1,1) to corner (2,2)
        let expected = 2.0_f32.sqrt();
        assert!((out.distance - expected).abs() < 1e-3);
    }

    #[test]
    fn test_overlapping_boxes_distance_zero() {
        let a = ShapeKind::boxed(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(1.0, 0.0), 0.0);
        let out = distance(&a, &xf_a, &a.clone(), &xf_b, ITERS);
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn test_point_vs_box() {
        let p = ShapeKind::point(Vec2::ZERO);
        let b = ShapeKind::boxed(1.0, 1.0);
        let xf_p = Transform::new(Vec2::new(3.0, 0.0), 0.0);
        let xf_b = Transform::new(Vec2::ZERO, 0.0);
        let out = distance(&p, &xf_p, &b, &xf_b, ITERS);
        assert!((out.distance - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_circle_vs_box_diagonal() {
        let c = ShapeKind::circle(0.5);
        let b = ShapeKind::boxed(1.0, 1.0);
        let xf_c = Transform::new(Vec2::new(3.0, 3.0), 0.0);
        let xf_b = Transform::new(Vec2::ZERO, 0.0);
        let out = distance(&c, &xf_c, &b, &xf_b, ITERS);
        let expected = 2.0 * 2.0_f32.sqrt() - 0.5;
        assert!((out.distance - expected).abs() < 1e-3);
    }

    #[test]
    fn test_iterations_bounded() {
        let a = ShapeKind::boxed(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.3);
        let xf_b = Transform::new(Vec2::new(2.7, 1.3), -0.8);
        let out = distance(&a, &xf_a, &a.clone(), &xf_b, ITERS);
        assert!(out.iterations <= ITERS);
        assert!(out.distance >= 0.0);
    }
}
