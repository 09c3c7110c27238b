//! Collision Shapes
//!
//! Shapes are convex geometry attached to bodies: circles, convex polygons,
//! one-sided edge segments, and points. Each shape carries material
//! properties (density, friction, restitution), a collision [`Filter`], its
//! broad-phase proxy id, and a cached sweep radius used to bound the TOI
//! search.
//!
//! Geometry is defined in body-local coordinates. Polygon vertices must form
//! a convex hull in counter-clockwise winding; construction validates this
//! and rejects degenerate input instead of producing NaNs later.

use crate::aabb::Aabb;
use crate::error::PhysicsError;
use crate::filter::Filter;
use crate::math::{Transform, Vec2};
use crate::settings::MAX_POLYGON_VERTICES;

/// Endpoint inset used for core vertices and sweep radii, so the TOI search
/// stops a hair short of exact touching.
pub const TOI_SLOP: f32 = 0.04;

/// Sentinel for "no broad-phase proxy" (shape frozen or out of world bounds).
pub const INVALID_PROXY: u16 = u16::MAX;

// ============================================================================
// ShapeKind — Geometry Variants
// ============================================================================

/// Shape geometry, tagged by variant.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeKind {
    /// Circle with a local center offset.
    Circle {
        /// Center in body-local coordinates.
        local_position: Vec2,
        /// Radius, must be positive.
        radius: f32,
    },
    /// Convex polygon, counter-clockwise winding.
    Polygon {
        /// Vertices in CCW order.
        vertices: Vec<Vec2>,
        /// Outward edge normals; `normals[i]` belongs to edge `i -> i+1`.
        normals: Vec<Vec2>,
        /// Area centroid in body-local coordinates.
        centroid: Vec2,
    },
    /// One-sided edge segment. Collides only on its `normal` side.
    Edge {
        /// First endpoint.
        v1: Vec2,
        /// Second endpoint.
        v2: Vec2,
        /// Core endpoints, inset along the segment for TOI robustness.
        core_v1: Vec2,
        /// See `core_v1`.
        core_v2: Vec2,
        /// Outward (collidable-side) normal, unit length.
        normal: Vec2,
        /// Unit direction from `v1` to `v2`.
        direction: Vec2,
        /// Segment length.
        length: f32,
        /// Whether the chain corner at `v1` is convex.
        corner1_convex: bool,
        /// Whether the chain corner at `v2` is convex.
        corner2_convex: bool,
        /// Direction of the previous chain edge (equals `direction` when
        /// this edge has no predecessor).
        prev_direction: Vec2,
        /// Direction of the next chain edge (equals `direction` when this
        /// edge has no successor).
        next_direction: Vec2,
    },
    /// A point mass with no extent.
    Point {
        /// Position in body-local coordinates.
        local_position: Vec2,
    },
}

impl ShapeKind {
    /// Circle centered on the body origin.
    #[must_use]
    pub fn circle(radius: f32) -> Self {
        Self::Circle {
            local_position: Vec2::ZERO,
            radius,
        }
    }

    /// Circle with a local offset.
    #[must_use]
    pub fn circle_at(local_position: Vec2, radius: f32) -> Self {
        Self::Circle {
            local_position,
            radius,
        }
    }

    /// Point at a local offset.
    #[must_use]
    pub fn point(local_position: Vec2) -> Self {
        Self::Point { local_position }
    }

    /// Axis-aligned box with half-extents `hx`, `hy`, centered on the origin.
    #[must_use]
    pub fn boxed(hx: f32, hy: f32) -> Self {
        // Cannot fail for positive extents; fall back to a degenerate-safe
        // minimum so the unchecked constructor stays total.
        let hx = hx.max(f32::EPSILON);
        let hy = hy.max(f32::EPSILON);
        let vertices = vec![
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let normals = vec![
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ];
        Self::Polygon {
            vertices,
            normals,
            centroid: Vec2::ZERO,
        }
    }

    /// Convex polygon from CCW vertices. Validates vertex count, winding,
    /// convexity, and edge lengths.
    pub fn polygon(verts: &[Vec2]) -> Result<Self, PhysicsError> {
        if verts.len() < 3 {
            return Err(PhysicsError::InvalidGeometry {
                reason: "polygon needs at least 3 vertices",
            });
        }
        if verts.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidGeometry {
                reason: "polygon exceeds the maximum vertex count",
            });
        }

        let n = verts.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = verts[(i + 1) % n] - verts[i];
            if edge.length_squared() < f32::EPSILON * f32::EPSILON {
                return Err(PhysicsError::InvalidGeometry {
                    reason: "polygon has a zero-length edge",
                });
            }
            normals.push(Vec2::new(edge.y, -edge.x).normalize());
        }

        // CCW convexity: every vertex must lie on the inner side of every
        // preceding edge plane.
        for i in 0..n {
            let edge = verts[(i + 1) % n] - verts[i];
            let next = verts[(i + 2) % n] - verts[(i + 1) % n];
            if edge.cross(next) <= 0.0 {
                return Err(PhysicsError::InvalidGeometry {
                    reason: "polygon is not convex or not counter-clockwise",
                });
            }
        }

        let centroid = polygon_centroid(verts);
        Ok(Self::Polygon {
            vertices: verts.to_vec(),
            normals,
            centroid,
        })
    }

    /// Single edge segment with no chain neighbors.
    pub fn edge(v1: Vec2, v2: Vec2) -> Result<Self, PhysicsError> {
        let d = v2 - v1;
        let length = d.length();
        if length < f32::EPSILON {
            return Err(PhysicsError::InvalidGeometry {
                reason: "edge endpoints coincide",
            });
        }
        let direction = d / length;
        // Outward normal is to the left of v1->v2.
        let normal = Vec2::new(-direction.y, direction.x);
        Ok(Self::Edge {
            v1,
            v2,
            core_v1: v1 + direction * TOI_SLOP.min(0.5 * length),
            core_v2: v2 - direction * TOI_SLOP.min(0.5 * length),
            normal,
            direction,
            length,
            corner1_convex: false,
            corner2_convex: false,
            prev_direction: direction,
            next_direction: direction,
        })
    }

    /// Farthest point of the shape in world direction `d` (core geometry;
    /// circle and point radii are handled by the caller).
    #[must_use]
    pub fn support(&self, xf: &Transform, d: Vec2) -> Vec2 {
        match self {
            Self::Circle { local_position, .. } | Self::Point { local_position } => {
                xf.mul(*local_position)
            }
            Self::Polygon { vertices, .. } => {
                let d_local = xf.rot.mul_t_vec(d);
                let mut best = vertices[0];
                let mut best_dot = best.dot(d_local);
                for v in &vertices[1..] {
                    let dot = v.dot(d_local);
                    if dot > best_dot {
                        best_dot = dot;
                        best = *v;
                    }
                }
                xf.mul(best)
            }
            Self::Edge {
                core_v1, core_v2, ..
            } => {
                let d_local = xf.rot.mul_t_vec(d);
                if core_v1.dot(d_local) > core_v2.dot(d_local) {
                    xf.mul(*core_v1)
                } else {
                    xf.mul(*core_v2)
                }
            }
        }
    }

    /// Surface radius added around the core geometry (circle radius, zero
    /// otherwise).
    #[inline]
    #[must_use]
    pub fn surface_radius(&self) -> f32 {
        match self {
            Self::Circle { radius, .. } => *radius,
            _ => 0.0,
        }
    }

    /// World-space AABB at a given transform.
    #[must_use]
    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        match self {
            Self::Circle {
                local_position,
                radius,
            } => {
                let p = xf.mul(*local_position);
                let r = Vec2::new(*radius, *radius);
                Aabb::new(p - r, p + r)
            }
            Self::Point { local_position } => {
                let p = xf.mul(*local_position);
                Aabb::new(p, p)
            }
            Self::Polygon { vertices, .. } => {
                let mut lower = xf.mul(vertices[0]);
                let mut upper = lower;
                for v in &vertices[1..] {
                    let p = xf.mul(*v);
                    lower = lower.min(p);
                    upper = upper.max(p);
                }
                Aabb::new(lower, upper)
            }
            Self::Edge { v1, v2, .. } => {
                let p1 = xf.mul(*v1);
                let p2 = xf.mul(*v2);
                Aabb::new(p1.min(p2), p1.max(p2))
            }
        }
    }

    /// AABB covering the shape across a motion from `xf1` to `xf2`.
    #[inline]
    #[must_use]
    pub fn compute_swept_aabb(&self, xf1: &Transform, xf2: &Transform) -> Aabb {
        self.compute_aabb(xf1).combine(&self.compute_aabb(xf2))
    }

    /// Mass, centroid, and rotational inertia about the body origin for the
    /// given density.
    #[must_use]
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Self::Circle {
                local_position,
                radius,
            } => {
                let mass = density * core::f32::consts::PI * radius * radius;
                MassData {
                    mass,
                    center: *local_position,
                    inertia: mass * (0.5 * radius * radius + local_position.length_squared()),
                }
            }
            Self::Point { local_position } => MassData {
                mass: density,
                center: *local_position,
                inertia: density * local_position.length_squared(),
            },
            Self::Polygon { vertices, .. } => polygon_mass(vertices, density),
            Self::Edge { v1, v2, length, .. } => {
                // Thin rod
                let mass = density * length;
                let mid = (*v1 + *v2) * 0.5;
                MassData {
                    mass,
                    center: mid,
                    inertia: mass * (length * length / 12.0 + mid.length_squared()),
                }
            }
        }
    }

    /// Maximum distance from the body's center of mass to any point of the
    /// shape, used to bound the TOI search.
    #[must_use]
    pub fn sweep_radius(&self, local_center: Vec2) -> f32 {
        let r = match self {
            Self::Circle {
                local_position,
                radius,
            } => local_position.distance_to(local_center) + radius,
            Self::Point { local_position } => local_position.distance_to(local_center),
            Self::Polygon { vertices, .. } => {
                let mut best: f32 = 0.0;
                for v in vertices {
                    best = best.max(v.distance_to(local_center));
                }
                best
            }
            Self::Edge { v1, v2, .. } => v1
                .distance_to(local_center)
                .max(v2.distance_to(local_center)),
        };
        (r - TOI_SLOP).max(0.0)
    }
}

/// Mass properties of a shape at a given density.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MassData {
    /// Total mass (kg).
    pub mass: f32,
    /// Centroid in body-local coordinates.
    pub center: Vec2,
    /// Rotational inertia about the body origin (kg·m²).
    pub inertia: f32,
}

/// Area centroid of a convex CCW polygon.
fn polygon_centroid(verts: &[Vec2]) -> Vec2 {
    let n = verts.len();
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    for i in 0..n {
        let p1 = verts[i];
        let p2 = verts[(i + 1) % n];
        let cross = p1.cross(p2);
        area += 0.5 * cross;
        center += (p1 + p2) * (cross / 6.0);
    }
    if area.abs() < f32::EPSILON {
        return verts[0];
    }
    center / area
}

/// Mass, centroid, and inertia (about the body origin) for a convex polygon.
fn polygon_mass(verts: &[Vec2], density: f32) -> MassData {
    let n = verts.len();
    let mut area = 0.0;
    let mut center = Vec2::ZERO;
    let mut inertia = 0.0;

    for i in 0..n {
        let e1 = verts[i];
        let e2 = verts[(i + 1) % n];
        let d = e1.cross(e2);
        let tri_area = 0.5 * d;
        area += tri_area;
        center += (e1 + e2) * (tri_area / 3.0);
        inertia += d * (e1.dot(e1) + e1.dot(e2) + e2.dot(e2)) / 12.0;
    }

    if area < f32::EPSILON {
        return MassData::default();
    }

    MassData {
        mass: density * area,
        center: center / area,
        inertia: density * inertia,
    }
}

// ============================================================================
// Shape — A Placed, Owned Shape
// ============================================================================

/// Construction parameters for a shape.
#[derive(Clone, Debug)]
pub struct ShapeDef {
    /// Geometry in body-local coordinates.
    pub kind: ShapeKind,
    /// Density (kg/m²). Zero contributes no mass.
    pub density: f32,
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Restitution (bounciness, 0..1).
    pub restitution: f32,
    /// Collision filter.
    pub filter: Filter,
}

impl ShapeDef {
    /// Shape definition with default material (density 0, friction 0.2).
    #[must_use]
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
            filter: Filter::DEFAULT,
        }
    }
}

/// A shape attached to a body. Owned by the [`crate::world::World`].
#[derive(Clone, Debug)]
pub struct Shape {
    /// Geometry.
    pub kind: ShapeKind,
    /// Owning body handle index.
    pub(crate) body: u32,
    /// Density (kg/m²).
    pub density: f32,
    /// Friction coefficient.
    pub friction: f32,
    /// Restitution.
    pub restitution: f32,
    /// Collision filter.
    pub filter: Filter,
    /// Broad-phase proxy id, or [`INVALID_PROXY`] when not indexed.
    pub(crate) proxy_id: u16,
    /// Cached max distance from the body center of mass to the shape.
    pub(crate) sweep_radius: f32,
}

impl Shape {
    pub(crate) fn new(def: &ShapeDef, body: u32) -> Self {
        Self {
            kind: def.kind.clone(),
            body,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            filter: def.filter,
            proxy_id: INVALID_PROXY,
            sweep_radius: 0.0,
        }
    }

    /// Handle index of the owning body.
    #[inline]
    #[must_use]
    pub fn body_index(&self) -> u32 {
        self.body
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;

    const EPS: f32 = 1e-4;

    #[test]
    fn test_polygon_validation() {
        // Too few vertices
        assert!(ShapeKind::polygon(&[Vec2::ZERO, Vec2::UNIT_X]).is_err());

        // Clockwise winding rejected
        let cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        assert!(ShapeKind::polygon(&cw).is_err());

        // CCW triangle accepted
        let ccw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
        ];
        assert!(ShapeKind::polygon(&ccw).is_ok());
    }

    #[test]
    fn test_box_normals_outward() {
        if let ShapeKind::Polygon {
            vertices, normals, ..
        } = ShapeKind::boxed(1.0, 1.0)
        {
            assert_eq!(vertices.len(), 4);
            for (i, n) in normals.iter().enumerate() {
                // Each normal points away from the centroid
                let mid = (vertices[i] + vertices[(i + 1) % 4]) * 0.5;
                assert!(n.dot(mid) > 0.0);
                assert!((n.length() - 1.0).abs() < EPS);
            }
        } else {
            panic!("boxed() must build a polygon");
        }
    }

    #[test]
    fn test_circle_mass() {
        let kind = ShapeKind::circle(2.0);
        let md = kind.compute_mass(1.0);
        assert!((md.mass - core::f32::consts::PI * 4.0).abs() < 1e-2);
        assert_eq!(md.center, Vec2::ZERO);
    }

    #[test]
    fn test_box_mass_matches_analytic() {
        let kind = ShapeKind::boxed(0.5, 0.5);
        let md = kind.compute_mass(2.0);
        // 1x1 box, density 2 => mass 2; I about center = m*(w^2+h^2)/12
        assert!((md.mass - 2.0).abs() < EPS);
        assert!(md.center.length() < EPS);
        assert!((md.inertia - 2.0 * (1.0 + 1.0) / 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_circle_aabb() {
        let kind = ShapeKind::circle_at(Vec2::new(1.0, 0.0), 0.5);
        let xf = Transform::new(Vec2::new(2.0, 3.0), 0.0);
        let aabb = kind.compute_aabb(&xf);
        assert!((aabb.lower.x - 2.5).abs() < EPS);
        assert!((aabb.upper.x - 3.5).abs() < EPS);
        assert!((aabb.lower.y - 2.5).abs() < EPS);
    }

    #[test]
    fn test_polygon_support() {
        let kind = ShapeKind::boxed(1.0, 2.0);
        let xf = Transform::IDENTITY;
        let s = kind.support(&xf, Vec2::new(1.0, 1.0));
        assert_eq!(s, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_edge_construction() {
        assert!(ShapeKind::edge(Vec2::ZERO, Vec2::ZERO).is_err());
        let e = ShapeKind::edge(Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert!(e.is_ok());
        if let Ok(ShapeKind::Edge { normal, length, .. }) = e {
            assert!((length - 2.0).abs() < EPS);
            // Left-hand normal of +X direction is +Y
            assert!((normal - Vec2::UNIT_Y).length() < EPS);
        }
    }

    #[test]
    fn test_sweep_radius_bounds_shape() {
        let kind = ShapeKind::boxed(1.0, 1.0);
        let r = kind.sweep_radius(Vec2::ZERO);
        // Corner distance is sqrt(2), minus the TOI inset
        assert!((r - (2.0_f32.sqrt() - TOI_SLOP)).abs() < 1e-3);
    }
}
