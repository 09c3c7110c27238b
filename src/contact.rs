//! Persistent Contacts
//!
//! A [`Contact`] lives as long as the broad phase reports its shape pair
//! overlapping. Each step it re-evaluates the manifold for the pair's shape
//! kinds, matches the new points to the old ones by feature id, and carries
//! the accumulated solver impulses across so the solver can warm-start.
//!
//! Point lifecycle events (begin / persist / end) are emitted into the
//! world's [`EventBuffer`] during evaluation.
//!
//! Author: Moroya Sakamoto

use crate::collide::{
    collide_circles, collide_polygon_circle, collide_polygons, Manifold, PolygonView,
};
use crate::collide_edge::{collide_edge_circle, collide_edge_polygon, EdgeView};
use crate::event::{ContactEvent, ContactEventKind, EventBuffer};
use crate::math::{Transform, Vec2};
use crate::settings::{Tuning, MAX_MANIFOLD_POINTS};
use crate::shape::{Shape, ShapeKind};

/// Friction mixing: geometric mean, so one slick surface dominates.
#[inline]
#[must_use]
pub fn mix_friction(f1: f32, f2: f32) -> f32 {
    (f1 * f2).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
#[inline]
#[must_use]
pub fn mix_restitution(r1: f32, r2: f32) -> f32 {
    r1.max(r2)
}

/// A persistent contact between two shapes.
#[derive(Clone, Debug)]
pub struct Contact {
    /// First shape handle.
    pub(crate) shape_a: u32,
    /// Second shape handle.
    pub(crate) shape_b: u32,
    /// Owning body of `shape_a`.
    pub(crate) body_a: u32,
    /// Owning body of `shape_b`.
    pub(crate) body_b: u32,
    /// Current manifold; normal points from A toward B.
    pub(crate) manifold: Manifold,
    /// Mixed friction coefficient.
    pub(crate) friction: f32,
    /// Mixed restitution.
    pub(crate) restitution: f32,
    /// Cached time of impact for the current step, if computed.
    pub(crate) toi: Option<f32>,
}

impl Contact {
    pub(crate) fn new(shape_a: u32, shape_b: u32, a: &Shape, b: &Shape) -> Self {
        Self {
            shape_a,
            shape_b,
            body_a: a.body_index(),
            body_b: b.body_index(),
            friction: mix_friction(a.friction, b.friction),
            restitution: mix_restitution(a.restitution, b.restitution),
            manifold: Manifold::default(),
            toi: None,
        }
    }

    /// Current manifold.
    #[inline]
    #[must_use]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Whether the contact is touching (has manifold points).
    #[inline]
    #[must_use]
    pub fn is_touching(&self) -> bool {
        self.manifold.point_count > 0
    }

    /// Recompute the manifold at the given transforms, carry impulses over
    /// by feature id, and emit point lifecycle events.
    pub(crate) fn evaluate(
        &mut self,
        shape_a: &Shape,
        shape_b: &Shape,
        xf_a: &Transform,
        xf_b: &Transform,
        tuning: &Tuning,
        events: &mut EventBuffer,
    ) {
        let old = self.manifold;
        self.manifold = compute_manifold(&shape_a.kind, xf_a, &shape_b.kind, xf_b, tuning);

        // Carry accumulated impulses from matching old points
        let mut old_matched = [false; MAX_MANIFOLD_POINTS];
        for i in 0..self.manifold.point_count {
            let key = self.manifold.points[i].id.key();
            let mut found = false;
            for j in 0..old.point_count {
                if !old_matched[j] && old.points[j].id.key() == key {
                    self.manifold.points[i].normal_impulse = old.points[j].normal_impulse;
                    self.manifold.points[i].tangent_impulse = old.points[j].tangent_impulse;
                    old_matched[j] = true;
                    found = true;
                    break;
                }
            }
            let p = &self.manifold.points[i];
            events.push(ContactEvent {
                kind: if found {
                    ContactEventKind::Persist
                } else {
                    ContactEventKind::Begin
                },
                shape_a: self.shape_a,
                shape_b: self.shape_b,
                position: p.position,
                normal: self.manifold.normal,
                separation: p.separation,
                normal_impulse: p.normal_impulse,
                tangent_impulse: p.tangent_impulse,
                id: p.id,
            });
        }

        // Old points with no successor have ended
        for j in 0..old.point_count {
            if !old_matched[j] {
                let p = &old.points[j];
                events.push(ContactEvent {
                    kind: ContactEventKind::End,
                    shape_a: self.shape_a,
                    shape_b: self.shape_b,
                    position: p.position,
                    normal: old.normal,
                    separation: p.separation,
                    normal_impulse: p.normal_impulse,
                    tangent_impulse: p.tangent_impulse,
                    id: p.id,
                });
            }
        }
    }

    /// Emit End events for every live point. Used when the contact is
    /// destroyed while still touching.
    pub(crate) fn emit_end_events(&self, events: &mut EventBuffer) {
        for j in 0..self.manifold.point_count {
            let p = &self.manifold.points[j];
            events.push(ContactEvent {
                kind: ContactEventKind::End,
                shape_a: self.shape_a,
                shape_b: self.shape_b,
                position: p.position,
                normal: self.manifold.normal,
                separation: p.separation,
                normal_impulse: p.normal_impulse,
                tangent_impulse: p.tangent_impulse,
                id: p.id,
            });
        }
    }
}

fn poly_view(kind: &ShapeKind) -> PolygonView<'_> {
    match kind {
        ShapeKind::Polygon {
            vertices,
            normals,
            centroid,
        } => PolygonView {
            vertices,
            normals,
            centroid: *centroid,
        },
        _ => unreachable!("dispatch guarantees a polygon"),
    }
}

/// Manifold for any supported shape-kind pair. The normal always points from
/// the first shape toward the second; handlers that run with swapped
/// operands get their normal negated on the way out.
fn compute_manifold(
    kind_a: &ShapeKind,
    xf_a: &Transform,
    kind_b: &ShapeKind,
    xf_b: &Transform,
    tuning: &Tuning,
) -> Manifold {
    use ShapeKind as K;

    let mut m = Manifold::default();
    match (kind_a, kind_b) {
        (
            K::Circle {
                local_position: p1,
                radius: r1,
            },
            K::Circle {
                local_position: p2,
                radius: r2,
            },
        ) => collide_circles(&mut m, *p1, *r1, xf_a, *p2, *r2, xf_b),

        (
            K::Circle {
                local_position: p1,
                radius: r1,
            },
            K::Point { local_position: p2 },
        ) => collide_circles(&mut m, *p1, *r1, xf_a, *p2, 0.0, xf_b),
        (
            K::Point { local_position: p1 },
            K::Circle {
                local_position: p2,
                radius: r2,
            },
        ) => collide_circles(&mut m, *p1, 0.0, xf_a, *p2, *r2, xf_b),

        (
            K::Polygon { .. },
            K::Circle {
                local_position: p2,
                radius: r2,
            },
        ) => collide_polygon_circle(&mut m, &poly_view(kind_a), xf_a, *p2, *r2, xf_b),
        (
            K::Circle {
                local_position: p1,
                radius: r1,
            },
            K::Polygon { .. },
        ) => {
            collide_polygon_circle(&mut m, &poly_view(kind_b), xf_b, *p1, *r1, xf_a);
            m.normal = -m.normal;
        }

        (K::Polygon { .. }, K::Point { local_position: p2 }) => {
            collide_polygon_circle(&mut m, &poly_view(kind_a), xf_a, *p2, 0.0, xf_b);
        }
        (K::Point { local_position: p1 }, K::Polygon { .. }) => {
            collide_polygon_circle(&mut m, &poly_view(kind_b), xf_b, *p1, 0.0, xf_a);
            m.normal = -m.normal;
        }

        (K::Polygon { .. }, K::Polygon { .. }) => collide_polygons(
            &mut m,
            &poly_view(kind_a),
            xf_a,
            &poly_view(kind_b),
            xf_b,
            tuning,
        ),

        (
            K::Edge { .. },
            K::Circle {
                local_position: p2,
                radius: r2,
            },
        ) => collide_edge_circle(&mut m, &EdgeView::of(kind_a), xf_a, *p2, *r2, xf_b),
        (
            K::Circle {
                local_position: p1,
                radius: r1,
            },
            K::Edge { .. },
        ) => {
            collide_edge_circle(&mut m, &EdgeView::of(kind_b), xf_b, *p1, *r1, xf_a);
            m.normal = -m.normal;
        }

        (K::Edge { .. }, K::Polygon { .. }) => collide_edge_polygon(
            &mut m,
            &EdgeView::of(kind_a),
            xf_a,
            &poly_view(kind_b),
            xf_b,
            tuning,
        ),
        (K::Polygon { .. }, K::Edge { .. }) => {
            collide_edge_polygon(
                &mut m,
                &EdgeView::of(kind_b),
                xf_b,
                &poly_view(kind_a),
                xf_a,
                tuning,
            );
            m.normal = -m.normal;
        }

        (K::Edge { .. }, K::Point { local_position: p2 }) => {
            collide_edge_circle(&mut m, &EdgeView::of(kind_a), xf_a, *p2, 0.0, xf_b);
        }
        (K::Point { local_position: p1 }, K::Edge { .. }) => {
            collide_edge_circle(&mut m, &EdgeView::of(kind_b), xf_b, *p1, 0.0, xf_a);
            m.normal = -m.normal;
        }

        // Lower-dimensional pairs have no collision response
        (K::Edge { .. }, K::Edge { .. }) | (K::Point { .. }, K::Point { .. }) => {}
    }

    debug_assert!(m.point_count == 0 || m.normal != Vec2::ZERO);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ContactEventKind;
    use crate::shape::ShapeDef;

    fn circle_shape(radius: f32, friction: f32, restitution: f32) -> Shape {
        let mut def = ShapeDef::new(ShapeKind::circle(radius));
        def.friction = friction;
        def.restitution = restitution;
        Shape::new(&def, 0)
    }

    #[test]
    fn test_material_mixing() {
        assert!((mix_friction(0.4, 0.9) - 0.6).abs() < 1e-5);
        assert_eq!(mix_restitution(0.2, 0.7), 0.7);
        // One frictionless surface kills friction entirely
        assert_eq!(mix_friction(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_evaluate_emits_begin_then_persist() {
        let tuning = Tuning::default();
        let a = circle_shape(1.0, 0.5, 0.0);
        let b = circle_shape(1.0, 0.5, 0.0);
        let mut contact = Contact::new(0, 1, &a, &b);
        let mut events = EventBuffer::new();

        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        contact.evaluate(&a, &b, &xf_a, &xf_b, &tuning, &mut events);
        assert!(contact.is_touching());
        assert_eq!(events.len(), 1);

        struct Probe {
            kinds: Vec<ContactEventKind>,
        }
        impl crate::event::ContactListener for Probe {
            fn begin_contact(&mut self, e: &ContactEvent) {
                self.kinds.push(e.kind);
            }
            fn persist_contact(&mut self, e: &ContactEvent) {
                self.kinds.push(e.kind);
            }
            fn end_contact(&mut self, e: &ContactEvent) {
                self.kinds.push(e.kind);
            }
        }
        let mut probe = Probe { kinds: Vec::new() };
        events.drain_to(&mut probe);
        assert_eq!(probe.kinds, vec![ContactEventKind::Begin]);

        // Pretend the solver accumulated an impulse, then re-evaluate
        contact.manifold.points[0].normal_impulse = 2.5;
        contact.evaluate(&a, &b, &xf_a, &xf_b, &tuning, &mut events);
        events.drain_to(&mut probe);
        assert_eq!(
            probe.kinds,
            vec![ContactEventKind::Begin, ContactEventKind::Persist]
        );
        // Warm-start state survived the re-evaluation
        assert_eq!(contact.manifold.points[0].normal_impulse, 2.5);
    }

    #[test]
    fn test_separation_emits_end() {
        let tuning = Tuning::default();
        let a = circle_shape(1.0, 0.5, 0.0);
        let b = circle_shape(1.0, 0.5, 0.0);
        let mut contact = Contact::new(0, 1, &a, &b);
        let mut events = EventBuffer::new();

        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        contact.evaluate(
            &a,
            &b,
            &xf_a,
            &Transform::new(Vec2::new(1.5, 0.0), 0.0),
            &tuning,
            &mut events,
        );
        events.clear();

        contact.evaluate(
            &a,
            &b,
            &xf_a,
            &Transform::new(Vec2::new(5.0, 0.0), 0.0),
            &tuning,
            &mut events,
        );
        assert!(!contact.is_touching());
        assert_eq!(events.len(), 1);

        struct EndProbe {
            ends: usize,
        }
        impl crate::event::ContactListener for EndProbe {
            fn end_contact(&mut self, _e: &ContactEvent) {
                self.ends += 1;
            }
        }
        let mut probe = EndProbe { ends: 0 };
        events.drain_to(&mut probe);
        assert_eq!(probe.ends, 1);
    }

    #[test]
    fn test_flipped_dispatch_normal_points_a_to_b() {
        let tuning = Tuning::default();
        let circle = ShapeKind::circle(0.5);
        let boxed = ShapeKind::boxed(1.0, 1.0);
        let mut events = EventBuffer::new();

        // Circle (A) left of box (B): normal must point +X (A toward B)
        let a = Shape::new(&ShapeDef::new(circle), 0);
        let b = Shape::new(&ShapeDef::new(boxed), 1);
        let mut contact = Contact::new(0, 1, &a, &b);
        contact.evaluate(
            &a,
            &b,
            &Transform::new(Vec2::new(-1.4, 0.0), 0.0),
            &Transform::new(Vec2::ZERO, 0.0),
            &tuning,
            &mut events,
        );
        assert!(contact.is_touching());
        assert!(contact.manifold().normal.x > 0.99);
    }

    #[test]
    fn test_edge_edge_never_touches() {
        let tuning = Tuning::default();
        let e = ShapeKind::edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).unwrap();
        let a = Shape::new(&ShapeDef::new(e.clone()), 0);
        let b = Shape::new(&ShapeDef::new(e), 1);
        let mut contact = Contact::new(0, 1, &a, &b);
        let mut events = EventBuffer::new();
        contact.evaluate(
            &a,
            &b,
            &Transform::IDENTITY,
            &Transform::IDENTITY,
            &tuning,
            &mut events,
        );
        assert!(!contact.is_touching());
        assert!(events.is_empty());
    }
}
