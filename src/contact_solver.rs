//! Sequential-Impulse Contact Solver
//!
//! Converts the manifolds of an island's contacts into velocity constraints,
//! warm-starts them with the impulses accumulated last step, iterates the
//! impulses to convergence, and finally runs a separate position-correction
//! pass (Baumgarte-scaled pseudo-impulses) that removes penetration without
//! injecting kinetic energy.
//!
//! Accumulated impulses are clamped as a whole, not per iteration: the total
//! normal impulse stays non-negative and the total friction impulse stays in
//! the friction cone. That is what makes the iteration order-independent
//! enough to converge on stacks.
//!
//! Author: Moroya Sakamoto

use crate::body::Body;
use crate::contact::Contact;
use crate::island::{Position, Velocity};
use crate::math::{clamp, cross_sv, Mat22, Vec2};
use crate::settings::{Tuning, MAX_MANIFOLD_POINTS};

/// Per-point solver state.
#[derive(Clone, Copy, Debug, Default)]
struct ConstraintPoint {
    /// Anchor relative to A's center, in A's init-time frame.
    local_anchor_a: Vec2,
    /// Anchor relative to B's center, in B's init-time frame.
    local_anchor_b: Vec2,
    /// Anchor from A's center (world, init time).
    r_a: Vec2,
    /// Anchor from B's center (world, init time).
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    /// Manifold separation at init.
    separation: f32,
    /// Restitution bias on the normal velocity.
    velocity_bias: f32,
}

/// Per-contact solver state.
#[derive(Clone, Debug)]
struct Constraint {
    points: [ConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_inertia_a: f32,
    inv_mass_b: f32,
    inv_inertia_b: f32,
    friction: f32,
    point_count: usize,
    /// Arena handle of the source contact, for writing impulses back.
    contact: u32,
}

/// Contact solver over one island's touching contacts.
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    constraints: Vec<Constraint>,
}

impl ContactSolver {
    /// Build velocity constraints for `handles`. Body velocities must
    /// already include this step's force and gravity integration.
    pub fn new(
        handles: &[u32],
        contacts: &[Option<Contact>],
        bodies: &[Option<Body>],
        velocities: &[Velocity],
        tuning: &Tuning,
    ) -> Self {
        let mut constraints = Vec::with_capacity(handles.len());

        for &handle in handles {
            let Some(contact) = contacts[handle as usize].as_ref() else {
                continue;
            };
            if contact.manifold.point_count == 0 {
                continue;
            }
            let Some(body_a) = bodies[contact.body_a as usize].as_ref() else {
                continue;
            };
            let Some(body_b) = bodies[contact.body_b as usize].as_ref() else {
                continue;
            };

            let index_a = body_a.island_index as usize;
            let index_b = body_b.island_index as usize;
            let manifold = &contact.manifold;
            let normal = manifold.normal;
            let tangent = normal.cross_scalar(1.0);

            let mut constraint = Constraint {
                points: [ConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal,
                index_a,
                index_b,
                inv_mass_a: body_a.inv_mass,
                inv_inertia_a: body_a.inv_inertia,
                inv_mass_b: body_b.inv_mass,
                inv_inertia_b: body_b.inv_inertia,
                friction: contact.friction,
                point_count: manifold.point_count,
                contact: handle,
            };

            let c_a = body_a.sweep.c;
            let c_b = body_b.sweep.c;
            let v_a = velocities[index_a];
            let v_b = velocities[index_b];

            for (k, mp) in manifold.points[..manifold.point_count].iter().enumerate() {
                let r_a = mp.position - c_a;
                let r_b = mp.position - c_b;

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k_normal = constraint.inv_mass_a
                    + constraint.inv_mass_b
                    + constraint.inv_inertia_a * rn_a * rn_a
                    + constraint.inv_inertia_b * rn_b * rn_b;

                let rt_a = r_a.cross(tangent);
                let rt_b = r_b.cross(tangent);
                let k_tangent = constraint.inv_mass_a
                    + constraint.inv_mass_b
                    + constraint.inv_inertia_a * rt_a * rt_a
                    + constraint.inv_inertia_b * rt_b * rt_b;

                let dv = v_b.v + cross_sv(v_b.w, r_b) - v_a.v - cross_sv(v_a.w, r_a);
                let v_rel = normal.dot(dv);

                let point = &mut constraint.points[k];
                point.r_a = r_a;
                point.r_b = r_b;
                point.local_anchor_a = body_a.xf.rot.mul_t_vec(r_a);
                point.local_anchor_b = body_b.xf.rot.mul_t_vec(r_b);
                point.normal_impulse = mp.normal_impulse;
                point.tangent_impulse = mp.tangent_impulse;
                point.normal_mass = 1.0 / k_normal.max(f32::EPSILON);
                point.tangent_mass = 1.0 / k_tangent.max(f32::EPSILON);
                point.separation = mp.separation;
                point.velocity_bias = if v_rel < -tuning.velocity_threshold {
                    -contact.restitution * v_rel
                } else {
                    0.0
                };
            }

            constraints.push(constraint);
        }

        Self { constraints }
    }

    /// Apply last step's accumulated impulses up front.
    pub fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for c in &self.constraints {
            let tangent = c.normal.cross_scalar(1.0);
            for point in &c.points[..c.point_count] {
                let p = c.normal * point.normal_impulse + tangent * point.tangent_impulse;
                velocities[c.index_a].v -= p * c.inv_mass_a;
                velocities[c.index_a].w -= c.inv_inertia_a * point.r_a.cross(p);
                velocities[c.index_b].v += p * c.inv_mass_b;
                velocities[c.index_b].w += c.inv_inertia_b * point.r_b.cross(p);
            }
        }
    }

    /// Drop warm-start state; used by the TOI sub-solve, which runs on a
    /// freshly rebuilt manifold.
    pub fn zero_impulses(&mut self) {
        for c in &mut self.constraints {
            for point in &mut c.points[..c.point_count] {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
            }
        }
    }

    /// One Gauss-Seidel sweep over all velocity constraints.
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for c in &mut self.constraints {
            let tangent = c.normal.cross_scalar(1.0);

            for point in &mut c.points[..c.point_count] {
                // Normal impulse, accumulated and clamped to be repulsive
                let mut v_a = velocities[c.index_a];
                let mut v_b = velocities[c.index_b];

                let dv = v_b.v + cross_sv(v_b.w, point.r_b) - v_a.v - cross_sv(v_a.w, point.r_a);
                let vn = c.normal.dot(dv);
                let lambda = -point.normal_mass * (vn - point.velocity_bias);

                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = c.normal * lambda;
                v_a.v -= p * c.inv_mass_a;
                v_a.w -= c.inv_inertia_a * point.r_a.cross(p);
                v_b.v += p * c.inv_mass_b;
                v_b.w += c.inv_inertia_b * point.r_b.cross(p);

                // Friction impulse, clamped to the friction cone
                let dv = v_b.v + cross_sv(v_b.w, point.r_b) - v_a.v - cross_sv(v_a.w, point.r_a);
                let vt = tangent.dot(dv);
                let lambda = -point.tangent_mass * vt;

                let max_friction = c.friction * point.normal_impulse;
                let new_impulse = clamp(
                    point.tangent_impulse + lambda,
                    -max_friction,
                    max_friction,
                );
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a.v -= p * c.inv_mass_a;
                v_a.w -= c.inv_inertia_a * point.r_a.cross(p);
                v_b.v += p * c.inv_mass_b;
                v_b.w += c.inv_inertia_b * point.r_b.cross(p);

                velocities[c.index_a] = v_a;
                velocities[c.index_b] = v_b;
            }
        }
    }

    /// Separation of one constraint point under the given trial positions.
    ///
    /// Anchors coincided at init; their drift along the normal tracks the
    /// change in separation since then.
    fn point_separation(
        positions: &[Position],
        c: &Constraint,
        point: &ConstraintPoint,
    ) -> (f32, Vec2, Vec2) {
        let pos_a = positions[c.index_a];
        let pos_b = positions[c.index_b];

        let r_a = Mat22::from_angle(pos_a.a).mul_vec(point.local_anchor_a);
        let r_b = Mat22::from_angle(pos_b.a).mul_vec(point.local_anchor_b);

        let p_a = pos_a.c + r_a;
        let p_b = pos_b.c + r_b;

        let separation = (p_b - p_a).dot(c.normal) + point.separation;
        (separation, r_a, r_b)
    }

    /// One pseudo-impulse sweep that pushes penetrating anchors apart.
    /// Returns `true` once every separation is within `tolerance`, measured
    /// after this sweep's corrections so the caller's early-out sees the
    /// state it is leaving behind.
    pub fn solve_position_constraints(
        &mut self,
        positions: &mut [Position],
        baumgarte: f32,
        tolerance: f32,
        tuning: &Tuning,
    ) -> bool {
        for c in &self.constraints {
            for point in &c.points[..c.point_count] {
                let (separation, r_a, r_b) = Self::point_separation(positions, c, point);

                let correction = clamp(
                    baumgarte * (separation + tuning.linear_slop),
                    -tuning.max_linear_correction,
                    0.0,
                );

                let rn_a = r_a.cross(c.normal);
                let rn_b = r_b.cross(c.normal);
                let k = c.inv_mass_a
                    + c.inv_mass_b
                    + c.inv_inertia_a * rn_a * rn_a
                    + c.inv_inertia_b * rn_b * rn_b;
                if k <= f32::EPSILON {
                    continue;
                }

                let impulse = -correction / k;
                let p = c.normal * impulse;

                positions[c.index_a].c -= p * c.inv_mass_a;
                positions[c.index_a].a -= c.inv_inertia_a * r_a.cross(p);
                positions[c.index_b].c += p * c.inv_mass_b;
                positions[c.index_b].a += c.inv_inertia_b * r_b.cross(p);
            }
        }

        let mut min_separation: f32 = 0.0;
        for c in &self.constraints {
            for point in &c.points[..c.point_count] {
                let (separation, _, _) = Self::point_separation(positions, c, point);
                min_separation = min_separation.min(separation);
            }
        }

        min_separation >= tolerance
    }

    /// Copy accumulated impulses back to the manifolds for next step's warm
    /// start and for contact events.
    pub fn store_impulses(&self, contacts: &mut [Option<Contact>]) {
        for c in &self.constraints {
            if let Some(contact) = contacts[c.contact as usize].as_mut() {
                for (k, point) in c.points[..c.point_count].iter().enumerate() {
                    contact.manifold.points[k].normal_impulse = point.normal_impulse;
                    contact.manifold.points[k].tangent_impulse = point.tangent_impulse;
                }
            }
        }
    }
}
