//! Joints — Common Plumbing, Distance, Mouse
//!
//! Joints constrain pairs (or, for the constant-volume blob, rings) of
//! bodies. Each variant carries its own accumulated impulses for warm
//! starting and solves inside the island loop: velocity constraints between
//! the contact iterations, position constraints after integration.
//!
//! This file holds the variant dispatch plus the two simplest joints; the
//! remaining five live in `joint_extra`.
//!
//! Author: Moroya Sakamoto

use crate::body::Body;
use crate::island::SolverContext;
use crate::joint_extra::{
    ConstantVolumeJoint, GearJoint, PrismaticJoint, PulleyJoint, RevoluteJoint,
};
use crate::math::{clamp, cross_sv, Mat22, Vec2};
use crate::world::BodyId;

// ============================================================================
// Definitions
// ============================================================================

/// Construction parameters for any joint variant.
#[derive(Clone, Debug)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Mouse(MouseJointDef),
    Revolute(crate::joint_extra::RevoluteJointDef),
    Prismatic(crate::joint_extra::PrismaticJointDef),
    Pulley(crate::joint_extra::PulleyJointDef),
    Gear(crate::joint_extra::GearJointDef),
    ConstantVolume(crate::joint_extra::ConstantVolumeJointDef),
}

/// Rigid rod between two anchor points.
#[derive(Clone, Debug)]
pub struct DistanceJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// Anchor on body A, in body-local coordinates.
    pub local_anchor_a: Vec2,
    /// Anchor on body B, in body-local coordinates.
    pub local_anchor_b: Vec2,
    /// Rest length of the rod.
    pub length: f32,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    /// Rod between two local anchors with the given rest length.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            collide_connected: false,
        }
    }
}

/// Soft spring dragging one body's anchor toward a movable world target.
#[derive(Clone, Debug)]
pub struct MouseJointDef {
    pub body: BodyId,
    /// Initial world-space target; also fixes the body-local anchor.
    pub target: Vec2,
    /// Force cap, typically a multiple of the body weight.
    pub max_force: f32,
    /// Spring response frequency (Hz).
    pub frequency_hz: f32,
    /// Spring damping ratio; 1 is critical damping.
    pub damping_ratio: f32,
}

impl MouseJointDef {
    #[must_use]
    pub fn new(body: BodyId, target: Vec2) -> Self {
        Self {
            body,
            target,
            max_force: 100.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }
}

// ============================================================================
// Variant dispatch
// ============================================================================

/// A live joint. Created from a [`JointDef`] by the world.
#[derive(Clone, Debug)]
pub enum Joint {
    Distance(DistanceJoint),
    Mouse(MouseJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Pulley(PulleyJoint),
    Gear(GearJoint),
    ConstantVolume(ConstantVolumeJoint),
}

impl Joint {
    /// Visit every body this joint connects.
    pub(crate) fn for_each_body(&self, mut f: impl FnMut(u32)) {
        match self {
            Joint::Distance(j) => {
                f(j.body_a);
                f(j.body_b);
            }
            Joint::Mouse(j) => f(j.body),
            Joint::Revolute(j) => {
                f(j.body_a);
                f(j.body_b);
            }
            Joint::Prismatic(j) => {
                f(j.body_a);
                f(j.body_b);
            }
            Joint::Pulley(j) => {
                f(j.body_a);
                f(j.body_b);
            }
            Joint::Gear(j) => {
                f(j.body_a);
                f(j.body_b);
            }
            Joint::ConstantVolume(j) => {
                for &b in &j.bodies {
                    f(b);
                }
            }
        }
    }

    /// Whether shapes on the connected bodies may still collide.
    #[must_use]
    pub fn collide_connected(&self) -> bool {
        match self {
            Joint::Distance(j) => j.collide_connected,
            Joint::Revolute(j) => j.collide_connected,
            Joint::Prismatic(j) => j.collide_connected,
            Joint::Pulley(j) => j.collide_connected,
            // A mouse joint has one body; gears and blobs never suppress.
            Joint::Mouse(_) | Joint::Gear(_) | Joint::ConstantVolume(_) => true,
        }
    }

    /// Whether this joint directly connects the two bodies.
    pub(crate) fn connects(&self, a: u32, b: u32) -> bool {
        let mut seen_a = false;
        let mut seen_b = false;
        self.for_each_body(|h| {
            seen_a |= h == a;
            seen_b |= h == b;
        });
        seen_a && seen_b
    }

    /// Cache the island array indices of the connected bodies. Must run
    /// after the island has numbered its members.
    pub(crate) fn assign_island_indices(&mut self, bodies: &[Option<Body>]) {
        let index_of = |handle: u32| -> usize {
            bodies[handle as usize]
                .as_ref()
                .map_or(0, |b| b.island_index as usize)
        };
        match self {
            Joint::Distance(j) => {
                j.index_a = index_of(j.body_a);
                j.index_b = index_of(j.body_b);
            }
            Joint::Mouse(j) => j.index = index_of(j.body),
            Joint::Revolute(j) => {
                j.index_a = index_of(j.body_a);
                j.index_b = index_of(j.body_b);
            }
            Joint::Prismatic(j) => {
                j.index_a = index_of(j.body_a);
                j.index_b = index_of(j.body_b);
            }
            Joint::Pulley(j) => {
                j.index_a = index_of(j.body_a);
                j.index_b = index_of(j.body_b);
            }
            Joint::Gear(j) => {
                j.index_a = index_of(j.body_a);
                j.index_b = index_of(j.body_b);
            }
            Joint::ConstantVolume(j) => {
                j.indices.clear();
                for &b in &j.bodies {
                    j.indices.push(index_of(b));
                }
            }
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        match self {
            Joint::Distance(j) => j.init_velocity_constraints(ctx),
            Joint::Mouse(j) => j.init_velocity_constraints(ctx),
            Joint::Revolute(j) => j.init_velocity_constraints(ctx),
            Joint::Prismatic(j) => j.init_velocity_constraints(ctx),
            Joint::Pulley(j) => j.init_velocity_constraints(ctx),
            Joint::Gear(j) => j.init_velocity_constraints(ctx),
            Joint::ConstantVolume(j) => j.init_velocity_constraints(ctx),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        match self {
            Joint::Distance(j) => j.solve_velocity_constraints(ctx),
            Joint::Mouse(j) => j.solve_velocity_constraints(ctx),
            Joint::Revolute(j) => j.solve_velocity_constraints(ctx),
            Joint::Prismatic(j) => j.solve_velocity_constraints(ctx),
            Joint::Pulley(j) => j.solve_velocity_constraints(ctx),
            Joint::Gear(j) => j.solve_velocity_constraints(ctx),
            Joint::ConstantVolume(j) => j.solve_velocity_constraints(ctx),
        }
    }

    /// Returns true when the joint's position error is within tolerance.
    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        match self {
            Joint::Distance(j) => j.solve_position_constraints(ctx),
            Joint::Mouse(_) => true,
            Joint::Revolute(j) => j.solve_position_constraints(ctx),
            Joint::Prismatic(j) => j.solve_position_constraints(ctx),
            Joint::Pulley(j) => j.solve_position_constraints(ctx),
            Joint::Gear(j) => j.solve_position_constraints(ctx),
            Joint::ConstantVolume(j) => j.solve_position_constraints(ctx),
        }
    }
}

// ============================================================================
// Distance joint
// ============================================================================

/// Rigid rod: keeps the distance between two body anchors at a fixed length.
#[derive(Clone, Debug)]
pub struct DistanceJoint {
    pub(crate) body_a: u32,
    pub(crate) body_b: u32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) collide_connected: bool,
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    // Solver state
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    impulse: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            body_a: def.body_a.index(),
            body_b: def.body_b.index(),
            index_a: 0,
            index_b: 0,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length.max(f32::EPSILON),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            impulse: 0.0,
        }
    }

    fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        self.r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        self.r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);

        let d = pb.c + self.r_b - pa.c - self.r_a;
        let len = d.length();
        self.u = if len > f32::EPSILON { d / len } else { Vec2::ZERO };

        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let inv_mass = ba.inv_mass
            + ba.inv_inertia * cr_a * cr_a
            + bb.inv_mass
            + bb.inv_inertia * cr_b * cr_b;
        self.mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };

        if ctx.warm_start {
            let p = self.u * self.impulse;
            ctx.velocities[self.index_a].v -= p * ba.inv_mass;
            ctx.velocities[self.index_a].w -= ba.inv_inertia * self.r_a.cross(p);
            ctx.velocities[self.index_b].v += p * bb.inv_mass;
            ctx.velocities[self.index_b].w += bb.inv_inertia * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let va = ctx.velocities[self.index_a];
        let vb = ctx.velocities[self.index_b];

        let vp_a = va.v + cross_sv(va.w, self.r_a);
        let vp_b = vb.v + cross_sv(vb.w, self.r_b);
        let c_dot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * c_dot;
        self.impulse += impulse;
        let p = self.u * impulse;

        ctx.velocities[self.index_a].v -= p * ba.inv_mass;
        ctx.velocities[self.index_a].w -= ba.inv_inertia * self.r_a.cross(p);
        ctx.velocities[self.index_b].v += p * bb.inv_mass;
        ctx.velocities[self.index_b].w += bb.inv_inertia * self.r_b.cross(p);
    }

    fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        let r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        let r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);
        let d = pb.c + r_b - pa.c - r_a;
        let len = d.length();
        if len < f32::EPSILON {
            return true;
        }
        let u = d / len;
        let c = clamp(
            len - self.length,
            -ctx.tuning.max_linear_correction,
            ctx.tuning.max_linear_correction,
        );

        let impulse = -self.mass * c;
        let p = u * impulse;

        ctx.positions[self.index_a].c -= p * ba.inv_mass;
        ctx.positions[self.index_a].a -= ba.inv_inertia * r_a.cross(p);
        ctx.positions[self.index_b].c += p * bb.inv_mass;
        ctx.positions[self.index_b].a += bb.inv_inertia * r_b.cross(p);

        c.abs() < ctx.tuning.linear_slop
    }
}

// ============================================================================
// Mouse joint
// ============================================================================

/// Soft constraint pulling one body anchor toward a world-space target.
///
/// The spring is solved implicitly (stiffness folded into the effective mass
/// through `gamma`/`beta`), so large stiffness values stay stable. There is
/// no position correction; the spring alone closes the gap.
#[derive(Clone, Debug)]
pub struct MouseJoint {
    pub(crate) body: u32,
    pub(crate) index: usize,
    local_anchor: Vec2,
    target: Vec2,
    max_force: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    // Solver state
    r: Vec2,
    mass: Mat22,
    c: Vec2,
    gamma: f32,
    beta: f32,
    impulse: Vec2,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef, body: &Body) -> Self {
        Self {
            body: def.body.index(),
            index: 0,
            local_anchor: body.local_point(def.target),
            target: def.target,
            max_force: def.max_force,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            r: Vec2::ZERO,
            mass: Mat22::IDENTITY,
            c: Vec2::ZERO,
            gamma: 0.0,
            beta: 0.0,
            impulse: Vec2::ZERO,
        }
    }

    /// Move the drag target.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    #[must_use]
    pub fn target(&self) -> Vec2 {
        self.target
    }

    fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let b = ctx.bodies[self.index];
        let p = ctx.positions[self.index];

        // Soft-constraint coefficients from frequency and damping ratio
        let mass = if b.inv_mass > 0.0 { 1.0 / b.inv_mass } else { 0.0 };
        let omega = 2.0 * core::f32::consts::PI * self.frequency_hz;
        let d = 2.0 * mass * self.damping_ratio * omega;
        let k = mass * omega * omega;
        let denom = ctx.dt * (d + ctx.dt * k);
        self.gamma = if denom > f32::EPSILON { 1.0 / denom } else { 0.0 };
        self.beta = ctx.dt * k * self.gamma;

        self.r = Mat22::from_angle(p.a).mul_vec(self.local_anchor - b.local_center);

        // K = m^-1 I + I^-1 skew(r) skew(r)^T + gamma I
        let inv_i = b.inv_inertia;
        let k_matrix = Mat22 {
            col1: Vec2 {
                x: b.inv_mass + inv_i * self.r.y * self.r.y + self.gamma,
                y: -inv_i * self.r.x * self.r.y,
            },
            col2: Vec2 {
                x: -inv_i * self.r.x * self.r.y,
                y: b.inv_mass + inv_i * self.r.x * self.r.x + self.gamma,
            },
        };
        self.mass = k_matrix.invert();

        self.c = p.c + self.r - self.target;

        if ctx.warm_start {
            ctx.velocities[self.index].v += self.impulse * b.inv_mass;
            ctx.velocities[self.index].w += b.inv_inertia * self.r.cross(self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let b = ctx.bodies[self.index];
        let v = ctx.velocities[self.index];

        let c_dot = v.v + cross_sv(v.w, self.r);
        let mut impulse = self
            .mass
            .mul_vec(-(c_dot + self.c * self.beta + self.impulse * self.gamma));

        // Force cap keeps a distant target from launching the body
        let old = self.impulse;
        self.impulse += impulse;
        let max_impulse = ctx.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse = self.impulse * (max_impulse / self.impulse.length());
        }
        impulse = self.impulse - old;

        ctx.velocities[self.index].v += impulse * b.inv_mass;
        ctx.velocities[self.index].w += b.inv_inertia * self.r.cross(impulse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::island::{Position, SolverBody, Velocity};
    use crate::settings::Tuning;

    fn two_unit_bodies() -> (Vec<Position>, Vec<Velocity>, Vec<SolverBody>) {
        let positions = vec![
            Position { c: Vec2::ZERO, a: 0.0 },
            Position {
                c: Vec2::new(2.0, 0.0),
                a: 0.0,
            },
        ];
        let velocities = vec![Velocity::default(); 2];
        let bodies = vec![
            SolverBody {
                inv_mass: 1.0,
                inv_inertia: 1.0,
                local_center: Vec2::ZERO,
            };
            2
        ];
        (positions, velocities, bodies)
    }

    #[test]
    fn test_distance_joint_resists_stretch() {
        let tuning = Tuning::default();
        let (mut positions, mut velocities, bodies) = two_unit_bodies();
        // Bodies separating along the rod axis
        velocities[1].v = Vec2::new(1.0, 0.0);

        let def = DistanceJointDef {
            body_a: BodyId(0),
            body_b: BodyId(1),
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 2.0,
            collide_connected: false,
        };
        let mut joint = DistanceJoint::new(&def);
        joint.index_a = 0;
        joint.index_b = 1;

        let mut ctx = SolverContext {
            positions: &mut positions,
            velocities: &mut velocities,
            bodies: &bodies,
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            tuning: &tuning,
            warm_start: true,
        };
        joint.init_velocity_constraints(&mut ctx);
        for _ in 0..8 {
            joint.solve_velocity_constraints(&mut ctx);
        }

        // Rigid rod: equal masses end up sharing the velocity
        let rel = ctx.velocities[1].v.x - ctx.velocities[0].v.x;
        assert!(rel.abs() < 1e-4, "relative velocity {rel}");
    }

    #[test]
    fn test_distance_joint_position_correction() {
        let tuning = Tuning::default();
        let (mut positions, mut velocities, bodies) = two_unit_bodies();
        // Stretched by 0.1 beyond the rest length
        positions[1].c.x = 2.1;

        let def = DistanceJointDef {
            body_a: BodyId(0),
            body_b: BodyId(1),
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 2.0,
            collide_connected: false,
        };
        let mut joint = DistanceJoint::new(&def);
        joint.index_a = 0;
        joint.index_b = 1;

        let mut ctx = SolverContext {
            positions: &mut positions,
            velocities: &mut velocities,
            bodies: &bodies,
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            tuning: &tuning,
            warm_start: true,
        };
        joint.init_velocity_constraints(&mut ctx);
        let mut ok = false;
        for _ in 0..10 {
            ok = joint.solve_position_constraints(&mut ctx);
            if ok {
                break;
            }
        }
        assert!(ok);
        let len = (ctx.positions[1].c - ctx.positions[0].c).length();
        assert!((len - 2.0).abs() < tuning.linear_slop);
    }

    #[test]
    fn test_mouse_joint_pulls_toward_target() {
        let tuning = Tuning::default();
        let mut positions = vec![Position { c: Vec2::ZERO, a: 0.0 }];
        let mut velocities = vec![Velocity::default()];
        let bodies = vec![SolverBody {
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::ZERO,
        }];

        let mut joint = MouseJoint {
            body: 0,
            index: 0,
            local_anchor: Vec2::ZERO,
            target: Vec2::new(1.0, 0.0),
            max_force: 1000.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            r: Vec2::ZERO,
            mass: Mat22::IDENTITY,
            c: Vec2::ZERO,
            gamma: 0.0,
            beta: 0.0,
            impulse: Vec2::ZERO,
        };

        let mut ctx = SolverContext {
            positions: &mut positions,
            velocities: &mut velocities,
            bodies: &bodies,
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            tuning: &tuning,
            warm_start: true,
        };
        joint.init_velocity_constraints(&mut ctx);
        joint.solve_velocity_constraints(&mut ctx);

        // Spring accelerates the body toward +X
        assert!(ctx.velocities[0].v.x > 0.0);
        assert!(ctx.velocities[0].v.y.abs() < 1e-5);
    }

    #[test]
    fn test_mouse_joint_force_cap() {
        let tuning = Tuning::default();
        let mut positions = vec![Position { c: Vec2::ZERO, a: 0.0 }];
        let mut velocities = vec![Velocity::default()];
        let bodies = vec![SolverBody {
            inv_mass: 1.0,
            inv_inertia: 1.0,
            local_center: Vec2::ZERO,
        }];

        let mut joint = MouseJoint {
            body: 0,
            index: 0,
            local_anchor: Vec2::ZERO,
            target: Vec2::new(1000.0, 0.0),
            max_force: 10.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
            r: Vec2::ZERO,
            mass: Mat22::IDENTITY,
            c: Vec2::ZERO,
            gamma: 0.0,
            beta: 0.0,
            impulse: Vec2::ZERO,
        };

        let dt = 1.0 / 60.0;
        let mut ctx = SolverContext {
            positions: &mut positions,
            velocities: &mut velocities,
            bodies: &bodies,
            dt,
            inv_dt: 60.0,
            tuning: &tuning,
            warm_start: true,
        };
        joint.init_velocity_constraints(&mut ctx);
        for _ in 0..10 {
            joint.solve_velocity_constraints(&mut ctx);
        }

        // |impulse| <= max_force * dt, so |v| <= inv_mass * max_force * dt
        assert!(ctx.velocities[0].v.length() <= 10.0 * dt + 1e-5);
    }
}
