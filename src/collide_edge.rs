//! Edge Collision (One-Sided Segments)
//!
//! Edges collide on their normal side only; approaches from behind generate
//! no contact, so bodies sliding along the back of a ground chain never pop
//! through. Chained edges carry their neighbors' directions so contacts in a
//! shared-vertex region are produced by exactly one of the two edges.

use crate::collide::{collide_polygons, ContactId, Manifold, PolygonView};
use crate::math::{Transform, Vec2};
use crate::settings::Tuning;
use crate::shape::ShapeKind;

/// Borrowed view of an edge's geometry.
#[derive(Clone, Copy, Debug)]
pub struct EdgeView {
    pub v1: Vec2,
    pub v2: Vec2,
    /// Collidable-side unit normal.
    pub normal: Vec2,
    /// Unit direction from `v1` to `v2`.
    pub direction: Vec2,
    pub length: f32,
    /// Previous chain edge's direction; equals `direction` when unchained.
    pub prev_direction: Vec2,
    /// Next chain edge's direction; equals `direction` when unchained.
    pub next_direction: Vec2,
    pub corner1_convex: bool,
    pub corner2_convex: bool,
}

impl EdgeView {
    /// View over an edge shape variant.
    ///
    /// # Panics
    /// Panics if `kind` is not an edge. Callers dispatch on the variant
    /// first.
    #[must_use]
    pub fn of(kind: &ShapeKind) -> Self {
        match kind {
            ShapeKind::Edge {
                v1,
                v2,
                normal,
                direction,
                length,
                prev_direction,
                next_direction,
                corner1_convex,
                corner2_convex,
                ..
            } => Self {
                v1: *v1,
                v2: *v2,
                normal: *normal,
                direction: *direction,
                length: *length,
                prev_direction: *prev_direction,
                next_direction: *next_direction,
                corner1_convex: *corner1_convex,
                corner2_convex: *corner2_convex,
            },
            _ => panic!("EdgeView::of on a non-edge shape"),
        }
    }

    #[inline]
    fn has_prev(&self) -> bool {
        self.prev_direction != self.direction
    }

    #[inline]
    fn has_next(&self) -> bool {
        self.next_direction != self.direction
    }
}

/// Edge-vs-circle manifold. Also serves edge-vs-point (radius 0).
///
/// The manifold normal points from the edge toward the circle.
pub fn collide_edge_circle(
    manifold: &mut Manifold,
    edge: &EdgeView,
    xf1: &Transform,
    p2: Vec2,
    r2: f32,
    xf2: &Transform,
) {
    manifold.point_count = 0;

    let c = xf2.mul(p2);
    let c_local = xf1.mul_t(c);

    let d = c_local - edge.v1;

    // Behind the one-sided face: no contact
    if d.dot(edge.normal) < 0.0 {
        return;
    }

    let dd = d.dot(edge.direction);

    let (closest, in_vertex_region) = if dd <= 0.0 {
        // v1 vertex region; a chained predecessor owns points behind its end
        if edge.has_prev() && d.dot(edge.prev_direction) < 0.0 {
            return;
        }
        (edge.v1, true)
    } else if dd >= edge.length {
        let d2 = c_local - edge.v2;
        if edge.has_next() && d2.dot(edge.next_direction) > 0.0 {
            return;
        }
        (edge.v2, true)
    } else {
        (edge.v1 + edge.direction * dd, false)
    };

    let offset = c_local - closest;
    let dist_sqr = offset.length_squared();
    if dist_sqr > r2 * r2 {
        return;
    }
    let dist = dist_sqr.sqrt();

    let normal_local = if !in_vertex_region || dist < f32::EPSILON {
        edge.normal
    } else {
        offset / dist
    };
    let normal = xf1.rot.mul_vec(normal_local);

    manifold.normal = normal;
    manifold.point_count = 1;
    let p = &mut manifold.points[0];
    p.position = c - normal * r2;
    p.separation = dist - r2;
    p.id = ContactId {
        incident_vertex: u8::from(in_vertex_region && dd > 0.0),
        ..ContactId::default()
    };
}

/// Edge-vs-polygon manifold via SAT, treating the edge as a degenerate
/// two-vertex polygon. The manifold normal points from the edge toward the
/// polygon.
pub fn collide_edge_polygon(
    manifold: &mut Manifold,
    edge: &EdgeView,
    xf1: &Transform,
    poly: &PolygonView<'_>,
    xf2: &Transform,
    tuning: &Tuning,
) {
    manifold.point_count = 0;

    // The clipping pipeline takes each face's outward normal to lie to the
    // right of the face direction, so face 0 (the collidable side, normal
    // to the left of v1->v2) must run v2->v1.
    let edge_vertices = [edge.v2, edge.v1];
    let edge_normals = [edge.normal, -edge.normal];
    let edge_poly = PolygonView {
        vertices: &edge_vertices,
        normals: &edge_normals,
        centroid: (edge.v1 + edge.v2) * 0.5,
    };

    let mut m = Manifold::default();
    collide_polygons(&mut m, &edge_poly, xf1, poly, xf2, tuning);
    if m.point_count == 0 {
        return;
    }

    // One-sided: the polygon must be pushing against the collidable face
    let world_normal = xf1.rot.mul_vec(edge.normal);
    if m.normal.dot(world_normal) < 0.0 {
        return;
    }

    // Convex chain corners: the neighboring edge produces the corner
    // contact, so points past our span are dropped here.
    let mut kept = 0;
    for i in 0..m.point_count {
        let local = xf1.mul_t(m.points[i].position);
        let t = (local - edge.v1).dot(edge.direction);
        let past_v1 = t < 0.0 && edge.has_prev() && edge.corner1_convex;
        let past_v2 = t > edge.length && edge.has_next() && edge.corner2_convex;
        if !(past_v1 || past_v2) {
            m.points[kept] = m.points[i];
            kept += 1;
        }
    }
    m.point_count = kept;

    if m.point_count > 0 {
        *manifold = m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_edge() -> EdgeView {
        // Ground segment from (-2,0) to (2,0), normal +Y
        let kind = ShapeKind::edge(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0)).unwrap();
        EdgeView::of(&kind)
    }

    #[test]
    fn test_circle_resting_on_edge() {
        let edge = flat_edge();
        let xf1 = Transform::IDENTITY;
        let xf2 = Transform::new(Vec2::new(0.0, 0.4), 0.0);
        let mut m = Manifold::default();
        collide_edge_circle(&mut m, &edge, &xf1, Vec2::ZERO, 0.5, &xf2);
        assert_eq!(m.point_count, 1);
        assert!((m.normal - Vec2::UNIT_Y).length() < 1e-5);
        assert!((m.points[0].separation + 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_circle_behind_edge_ignored() {
        let edge = flat_edge();
        let xf1 = Transform::IDENTITY;
        // Center below the one-sided face, overlapping geometrically
        let xf2 = Transform::new(Vec2::new(0.0, -0.2), 0.0);
        let mut m = Manifold::default();
        collide_edge_circle(&mut m, &edge, &xf1, Vec2::ZERO, 0.5, &xf2);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_circle_on_edge_endpoint() {
        let edge = flat_edge();
        let xf1 = Transform::IDENTITY;
        // Just past v2, diagonal contact with the endpoint
        let xf2 = Transform::new(Vec2::new(2.2, 0.2), 0.0);
        let mut m = Manifold::default();
        collide_edge_circle(&mut m, &edge, &xf1, Vec2::ZERO, 0.5, &xf2);
        assert_eq!(m.point_count, 1);
        let expected = Vec2::new(0.2, 0.2).normalize();
        assert!((m.normal - expected).length() < 1e-4);
    }

    #[test]
    fn test_chained_edge_defers_to_predecessor() {
        let mut edge = flat_edge();
        // Predecessor ran along -X toward v1, i.e. direction +X as well but
        // angled down: circle behind v1 along the previous edge belongs to it
        edge.prev_direction = Vec2::new(1.0, 1.0).normalize();
        let xf1 = Transform::IDENTITY;
        // In the v1 region and behind the predecessor's end
        let xf2 = Transform::new(Vec2::new(-2.3, 0.1), 0.0);
        let mut m = Manifold::default();
        collide_edge_circle(&mut m, &edge, &xf1, Vec2::ZERO, 0.5, &xf2);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_edge() {
        let edge = flat_edge();
        let kind = ShapeKind::boxed(0.5, 0.5);
        let poly = match &kind {
            ShapeKind::Polygon {
                vertices,
                normals,
                centroid,
            } => PolygonView {
                vertices,
                normals,
                centroid: *centroid,
            },
            _ => unreachable!(),
        };
        let xf1 = Transform::IDENTITY;
        let xf2 = Transform::new(Vec2::new(0.0, 0.45), 0.0);
        let mut m = Manifold::default();
        collide_edge_polygon(&mut m, &edge, &xf1, &poly, &xf2, &Tuning::default());
        assert_eq!(m.point_count, 2);
        assert!(m.normal.y > 0.99);
        for p in &m.points[..m.point_count] {
            assert!((p.separation + 0.05).abs() < 1e-4);
        }
    }

    #[test]
    fn test_box_behind_edge_ignored() {
        let edge = flat_edge();
        let kind = ShapeKind::boxed(0.5, 0.5);
        let poly = match &kind {
            ShapeKind::Polygon {
                vertices,
                normals,
                centroid,
            } => PolygonView {
                vertices,
                normals,
                centroid: *centroid,
            },
            _ => unreachable!(),
        };
        let xf1 = Transform::IDENTITY;
        let xf2 = Transform::new(Vec2::new(0.0, -0.45), 0.0);
        let mut m = Manifold::default();
        collide_edge_polygon(&mut m, &edge, &xf1, &poly, &xf2, &Tuning::default());
        assert_eq!(m.point_count, 0);
    }
}
