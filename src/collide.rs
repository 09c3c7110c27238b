//! Narrow-Phase Collision (Manifold Generation)
//!
//! Produces contact manifolds (up to two points) for circle and convex
//! polygon pairs. Polygon-polygon uses SAT with reference/incident face
//! clipping; the reference-face choice is hysteresis-damped so it does not
//! flip-flop between nearly equal separations across frames.
//!
//! Every manifold point carries a [`ContactId`] naming the features that
//! produced it. Ids are stable across frames for persistent contacts, which
//! is what lets the solver carry accumulated impulses over (warm starting).
//!
//! The manifold normal always points from the first shape toward the second.
//!
//! Author: Moroya Sakamoto

use crate::math::{Transform, Vec2};
use crate::settings::{Tuning, MAX_MANIFOLD_POINTS};

// ============================================================================
// Contact Ids and Manifolds
// ============================================================================

/// Feature tag identifying which face/vertex pair produced a contact point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContactId {
    /// Reference face index.
    pub reference_face: u8,
    /// Incident edge index.
    pub incident_edge: u8,
    /// Incident vertex index.
    pub incident_vertex: u8,
    /// 1 when the reference face belongs to the second shape.
    pub flip: u8,
}

impl ContactId {
    /// Packed key for fast comparison.
    #[inline]
    #[must_use]
    pub fn key(&self) -> u32 {
        u32::from_le_bytes([
            self.reference_face,
            self.incident_edge,
            self.incident_vertex,
            self.flip,
        ])
    }
}

/// One contact point of a manifold.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifoldPoint {
    /// Contact position in world coordinates.
    pub position: Vec2,
    /// Signed distance along the normal; negative means penetrating.
    pub separation: f32,
    /// Accumulated normal impulse (solver state, carried across frames).
    pub normal_impulse: f32,
    /// Accumulated tangent impulse (solver state).
    pub tangent_impulse: f32,
    /// Feature id used to match points across frames.
    pub id: ContactId,
}

/// Contact manifold: a shared normal and up to two points.
#[derive(Clone, Copy, Debug, Default)]
pub struct Manifold {
    /// Contact points; only the first `point_count` are valid.
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Shared unit normal, pointing from the first shape to the second.
    pub normal: Vec2,
    /// Number of valid points (0..=2).
    pub point_count: usize,
}

/// Borrowed view of a polygon's geometry, shared by the polygon routines.
#[derive(Clone, Copy, Debug)]
pub struct PolygonView<'a> {
    /// CCW vertices.
    pub vertices: &'a [Vec2],
    /// Outward edge normals.
    pub normals: &'a [Vec2],
    /// Area centroid.
    pub centroid: Vec2,
}

/// A vertex in the clipping pipeline, tagged with its feature id.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ClipVertex {
    pub v: Vec2,
    pub id: ContactId,
}

// ============================================================================
// Circle Pairs
// ============================================================================

/// Circle-vs-circle manifold. Also serves points (radius 0).
pub fn collide_circles(
    manifold: &mut Manifold,
    p1: Vec2,
    r1: f32,
    xf1: &Transform,
    p2: Vec2,
    r2: f32,
    xf2: &Transform,
) {
    manifold.point_count = 0;

    let c1 = xf1.mul(p1);
    let c2 = xf2.mul(p2);
    let d = c2 - c1;
    let dist_sqr = d.length_squared();
    let r = r1 + r2;
    if dist_sqr > r * r {
        return;
    }

    let (separation, normal) = if dist_sqr < f32::EPSILON {
        // Concentric: any direction will do
        (-r, Vec2::UNIT_Y)
    } else {
        let dist = dist_sqr.sqrt();
        (dist - r, d / dist)
    };

    manifold.normal = normal;
    manifold.point_count = 1;
    let p = &mut manifold.points[0];
    p.position = ((c1 + normal * r1) + (c2 - normal * r2)) * 0.5;
    p.separation = separation;
    p.id = ContactId::default();
}

/// Polygon-vs-circle manifold. Also serves polygon-vs-point (radius 0).
pub fn collide_polygon_circle(
    manifold: &mut Manifold,
    poly: &PolygonView<'_>,
    xf1: &Transform,
    p2: Vec2,
    r2: f32,
    xf2: &Transform,
) {
    manifold.point_count = 0;

    // Circle center in the polygon's frame
    let c = xf2.mul(p2);
    let c_local = xf1.mul_t(c);

    let n = poly.vertices.len();
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..n {
        let s = poly.normals[i].dot(c_local - poly.vertices[i]);
        if s > r2 {
            return;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = poly.vertices[normal_index];
    let v2 = poly.vertices[(normal_index + 1) % n];

    if separation < f32::EPSILON {
        // Center is inside: use the shallowest face normal
        let normal = xf1.rot.mul_vec(poly.normals[normal_index]);
        manifold.normal = normal;
        manifold.point_count = 1;
        let p = &mut manifold.points[0];
        p.position = c - normal * r2;
        p.separation = separation - r2;
        p.id = ContactId {
            reference_face: normal_index as u8,
            ..ContactId::default()
        };
        return;
    }

    // Voronoi regions of the closest face
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    let (closest, face) = if u1 <= 0.0 {
        (v1, normal_index)
    } else if u2 <= 0.0 {
        (v2, (normal_index + 1) % n)
    } else {
        // Interior of the face
        let dist = (c_local - v1).dot(poly.normals[normal_index]);
        if dist > r2 {
            return;
        }
        let normal = xf1.rot.mul_vec(poly.normals[normal_index]);
        manifold.normal = normal;
        manifold.point_count = 1;
        let p = &mut manifold.points[0];
        p.position = c - normal * r2;
        p.separation = dist - r2;
        p.id = ContactId {
            reference_face: normal_index as u8,
            ..ContactId::default()
        };
        return;
    };

    let d = c_local - closest;
    let dist_sqr = d.length_squared();
    if dist_sqr > r2 * r2 {
        return;
    }
    let dist = dist_sqr.sqrt();
    let normal_local = if dist < f32::EPSILON {
        poly.normals[normal_index]
    } else {
        d / dist
    };
    let normal = xf1.rot.mul_vec(normal_local);

    manifold.normal = normal;
    manifold.point_count = 1;
    let p = &mut manifold.points[0];
    p.position = c - normal * r2;
    p.separation = dist - r2;
    p.id = ContactId {
        reference_face: face as u8,
        incident_vertex: face as u8,
        ..ContactId::default()
    };
}

// ============================================================================
// Polygon Pairs (SAT + Clipping)
// ============================================================================

/// Separation of polygon 2 from edge `edge` of polygon 1, measured along the
/// edge's world normal against 2's support point.
fn edge_separation(
    poly1: &PolygonView<'_>,
    xf1: &Transform,
    edge: usize,
    poly2: &PolygonView<'_>,
    xf2: &Transform,
) -> f32 {
    // Edge normal in poly2's frame
    let normal_world = xf1.rot.mul_vec(poly1.normals[edge]);
    let normal_local2 = xf2.rot.mul_t_vec(normal_world);

    // Deepest vertex of poly2 against the normal
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, v) in poly2.vertices.iter().enumerate() {
        let dot = v.dot(normal_local2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let v1 = xf1.mul(poly1.vertices[edge]);
    let v2 = xf2.mul(poly2.vertices[index]);
    (v2 - v1).dot(normal_world)
}

/// Maximum separation of poly2 over all of poly1's edges, found by hill
/// climbing from the edge best aligned with the center-to-center direction.
fn find_max_separation(
    poly1: &PolygonView<'_>,
    xf1: &Transform,
    poly2: &PolygonView<'_>,
    xf2: &Transform,
) -> (f32, usize) {
    let count = poly1.vertices.len();

    // Direction from 1's centroid to 2's centroid, in 1's frame
    let d = xf2.mul(poly2.centroid) - xf1.mul(poly1.centroid);
    let d_local = xf1.rot.mul_t_vec(d);

    let mut edge = 0;
    let mut max_dot = f32::MIN;
    for (i, n) in poly1.normals.iter().enumerate() {
        let dot = n.dot(d_local);
        if dot > max_dot {
            max_dot = dot;
            edge = i;
        }
    }

    let s = edge_separation(poly1, xf1, edge, poly2, xf2);
    if s > 0.0 {
        return (s, edge);
    }

    let prev_edge = (edge + count - 1) % count;
    let s_prev = edge_separation(poly1, xf1, prev_edge, poly2, xf2);
    if s_prev > 0.0 {
        return (s_prev, prev_edge);
    }

    let next_edge = (edge + 1) % count;
    let s_next = edge_separation(poly1, xf1, next_edge, poly2, xf2);
    if s_next > 0.0 {
        return (s_next, next_edge);
    }

    // Walk in the improving direction until separation stops increasing
    let (mut best_edge, mut best_s, increment) = if s_prev > s && s_prev > s_next {
        (prev_edge, s_prev, count - 1) // walk backwards (mod count)
    } else if s_next > s {
        (next_edge, s_next, 1)
    } else {
        return (s, edge);
    };

    loop {
        let candidate = (best_edge + increment) % count;
        let s_cand = edge_separation(poly1, xf1, candidate, poly2, xf2);
        if s_cand > 0.0 {
            return (s_cand, candidate);
        }
        if s_cand > best_s {
            best_edge = candidate;
            best_s = s_cand;
        } else {
            return (best_s, best_edge);
        }
    }
}

/// Incident edge of poly2: the edge most anti-parallel to the reference
/// normal, returned as two tagged clip vertices.
fn find_incident_edge(
    poly1: &PolygonView<'_>,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonView<'_>,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    let count2 = poly2.vertices.len();

    // Reference normal in poly2's frame
    let normal1 = xf2.rot.mul_t_vec(xf1.rot.mul_vec(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in poly2.normals.iter().enumerate() {
        let dot = n.dot(normal1);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (index + 1) % count2;

    [
        ClipVertex {
            v: xf2.mul(poly2.vertices[i1]),
            id: ContactId {
                reference_face: edge1 as u8,
                incident_edge: i1 as u8,
                incident_vertex: i1 as u8,
                flip: 0,
            },
        },
        ClipVertex {
            v: xf2.mul(poly2.vertices[i2]),
            id: ContactId {
                reference_face: edge1 as u8,
                incident_edge: i1 as u8,
                incident_vertex: i2 as u8,
                flip: 0,
            },
        },
    ]
}

/// Sutherland-Hodgman clip of a two-vertex segment against a half-plane
/// `dot(normal, p) <= offset`. Returns the number of surviving vertices.
pub(crate) fn clip_segment_to_line(
    out: &mut [ClipVertex; 2],
    input: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
) -> usize {
    let mut num_out = 0;

    let distance0 = normal.dot(input[0].v) - offset;
    let distance1 = normal.dot(input[1].v) - offset;

    if distance0 <= 0.0 {
        out[num_out] = input[0];
        num_out += 1;
    }
    if distance1 <= 0.0 {
        out[num_out] = input[1];
        num_out += 1;
    }

    // Crossing: interpolate and inherit the clipped vertex's id
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        out[num_out].v = input[0].v.lerp(input[1].v, interp);
        out[num_out].id = if distance0 > 0.0 {
            input[0].id
        } else {
            input[1].id
        };
        num_out += 1;
    }

    num_out
}

/// Polygon-vs-polygon manifold via SAT and reference-face clipping.
pub fn collide_polygons(
    manifold: &mut Manifold,
    poly_a: &PolygonView<'_>,
    xf_a: &Transform,
    poly_b: &PolygonView<'_>,
    xf_b: &Transform,
    tuning: &Tuning,
) {
    manifold.point_count = 0;

    let (separation_a, edge_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > 0.0 {
        return;
    }
    let (separation_b, edge_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > 0.0 {
        return;
    }

    // Prefer the deeper axis, with hysteresis toward keeping A as reference
    let (poly1, xf1, edge1, poly2, xf2, flip) =
        if separation_b > tuning.sat_relative_tol * separation_a + tuning.sat_absolute_tol {
            (poly_b, xf_b, edge_b, poly_a, xf_a, true)
        } else {
            (poly_a, xf_a, edge_a, poly_b, xf_b, false)
        };

    let mut incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);
    if flip {
        incident_edge[0].id.flip = 1;
        incident_edge[1].id.flip = 1;
    }

    let count1 = poly1.vertices.len();
    let v11 = xf1.mul(poly1.vertices[edge1]);
    let v12 = xf1.mul(poly1.vertices[(edge1 + 1) % count1]);

    let tangent = (v12 - v11).normalize();
    let front_normal = Vec2::new(tangent.y, -tangent.x);

    let front_offset = front_normal.dot(v11);
    let side_offset1 = -tangent.dot(v11);
    let side_offset2 = tangent.dot(v12);

    // Clip incident edge to the side planes of the reference edge
    let mut clip1 = [ClipVertex::default(); 2];
    if clip_segment_to_line(&mut clip1, &incident_edge, -tangent, side_offset1) < 2 {
        return;
    }
    let mut clip2 = [ClipVertex::default(); 2];
    if clip_segment_to_line(&mut clip2, &clip1, tangent, side_offset2) < 2 {
        return;
    }

    manifold.normal = if flip { -front_normal } else { front_normal };

    let mut point_count = 0;
    for cv in &clip2 {
        let separation = front_normal.dot(cv.v) - front_offset;
        if separation <= 0.0 {
            let p = &mut manifold.points[point_count];
            p.separation = separation;
            p.position = cv.v;
            p.id = cv.id;
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
}

// ============================================================================
// Tests
// ============================================================================
