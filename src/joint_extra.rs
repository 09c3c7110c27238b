//! Joints — Revolute, Prismatic, Pulley, Gear, Constant Volume
//!
//! The heavier joint variants. Revolute and prismatic carry optional motors
//! and limits solved as separate 1D constraints stacked on the main
//! constraint; pulley and gear couple two attachment points through a ratio;
//! the constant-volume joint closes a ring of bodies around a preserved
//! area.
//!
//! Author: Moroya Sakamoto

use crate::island::SolverContext;
use crate::math::{clamp, cross_sv, Mat22, Vec2};
use crate::world::BodyId;

/// Minimum taut pulley segment length; shorter segments lose their
/// direction and are treated as slack.
const MIN_PULLEY_LENGTH: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

// ============================================================================
// Revolute joint
// ============================================================================

/// Pin two bodies together at a point, optionally with an angle limit and a
/// motor.
#[derive(Clone, Debug)]
pub struct RevoluteJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle at the rest pose.
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RevoluteJoint {
    pub(crate) body_a: u32,
    pub(crate) body_b: u32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_torque: f32,
    // Solver state
    r_a: Vec2,
    r_b: Vec2,
    pivot_mass: Mat22,
    motor_mass: f32,
    limit_state: LimitState,
    pivot_impulse: Vec2,
    motor_impulse: f32,
    limit_impulse: f32,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            body_a: def.body_a.index(),
            body_b: def.body_b.index(),
            index_a: 0,
            index_b: 0,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            pivot_mass: Mat22::IDENTITY,
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
            pivot_impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            limit_impulse: 0.0,
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        self.r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        self.r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);

        let k11 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * self.r_a.y * self.r_a.y
            + bb.inv_inertia * self.r_b.y * self.r_b.y;
        let k12 = -ba.inv_inertia * self.r_a.x * self.r_a.y
            - bb.inv_inertia * self.r_b.x * self.r_b.y;
        let k22 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * self.r_a.x * self.r_a.x
            + bb.inv_inertia * self.r_b.x * self.r_b.x;
        self.pivot_mass = Mat22 {
            col1: Vec2 { x: k11, y: k12 },
            col2: Vec2 { x: k12, y: k22 },
        }
        .invert();

        let inv_i = ba.inv_inertia + bb.inv_inertia;
        self.motor_mass = if inv_i > 0.0 { 1.0 / inv_i } else { 0.0 };

        if self.enable_limit {
            let angle = pb.a - pa.a - self.reference_angle;
            let new_state = if (self.upper_angle - self.lower_angle).abs()
                < 2.0 * ctx.tuning.angular_slop
            {
                LimitState::Equal
            } else if angle <= self.lower_angle {
                LimitState::AtLower
            } else if angle >= self.upper_angle {
                LimitState::AtUpper
            } else {
                LimitState::Inactive
            };
            if new_state != self.limit_state {
                self.limit_impulse = 0.0;
            }
            self.limit_state = new_state;
        } else {
            self.limit_state = LimitState::Inactive;
            self.limit_impulse = 0.0;
        }

        if ctx.warm_start {
            let p = self.pivot_impulse;
            let l = self.motor_impulse + self.limit_impulse;
            ctx.velocities[self.index_a].v -= p * ba.inv_mass;
            ctx.velocities[self.index_a].w -= ba.inv_inertia * (self.r_a.cross(p) + l);
            ctx.velocities[self.index_b].v += p * bb.inv_mass;
            ctx.velocities[self.index_b].w += bb.inv_inertia * (self.r_b.cross(p) + l);
        } else {
            self.pivot_impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.limit_impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];

        if self.enable_motor && self.limit_state != LimitState::Equal {
            let (wa, wb) = (
                ctx.velocities[self.index_a].w,
                ctx.velocities[self.index_b].w,
            );
            let c_dot = wb - wa - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old = self.motor_impulse;
            let max = self.max_motor_torque * ctx.dt;
            self.motor_impulse = clamp(old + impulse, -max, max);
            let impulse = self.motor_impulse - old;
            ctx.velocities[self.index_a].w -= ba.inv_inertia * impulse;
            ctx.velocities[self.index_b].w += bb.inv_inertia * impulse;
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let (wa, wb) = (
                ctx.velocities[self.index_a].w,
                ctx.velocities[self.index_b].w,
            );
            let c_dot = wb - wa;
            let mut impulse = -self.motor_mass * c_dot;
            match self.limit_state {
                LimitState::Equal => self.limit_impulse += impulse,
                LimitState::AtLower => {
                    let new = (self.limit_impulse + impulse).max(0.0);
                    impulse = new - self.limit_impulse;
                    self.limit_impulse = new;
                }
                LimitState::AtUpper => {
                    let new = (self.limit_impulse + impulse).min(0.0);
                    impulse = new - self.limit_impulse;
                    self.limit_impulse = new;
                }
                LimitState::Inactive => unreachable!(),
            }
            ctx.velocities[self.index_a].w -= ba.inv_inertia * impulse;
            ctx.velocities[self.index_b].w += bb.inv_inertia * impulse;
        }

        let va = ctx.velocities[self.index_a];
        let vb = ctx.velocities[self.index_b];
        let c_dot = vb.v + cross_sv(vb.w, self.r_b) - va.v - cross_sv(va.w, self.r_a);
        let impulse = self.pivot_mass.mul_vec(-c_dot);
        self.pivot_impulse += impulse;

        ctx.velocities[self.index_a].v -= impulse * ba.inv_mass;
        ctx.velocities[self.index_a].w -= ba.inv_inertia * self.r_a.cross(impulse);
        ctx.velocities[self.index_b].v += impulse * bb.inv_mass;
        ctx.velocities[self.index_b].w += bb.inv_inertia * self.r_b.cross(impulse);
    }

    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];

        let mut angular_error = 0.0f32;
        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let pa = ctx.positions[self.index_a];
            let pb = ctx.positions[self.index_b];
            let angle = pb.a - pa.a - self.reference_angle;
            let max = ctx.tuning.max_angular_correction;
            let c = match self.limit_state {
                LimitState::Equal => clamp(angle - self.lower_angle, -max, max),
                LimitState::AtLower => {
                    clamp(angle - self.lower_angle + ctx.tuning.angular_slop, -max, 0.0)
                }
                LimitState::AtUpper => {
                    clamp(angle - self.upper_angle - ctx.tuning.angular_slop, 0.0, max)
                }
                LimitState::Inactive => unreachable!(),
            };
            let impulse = -self.motor_mass * c;
            ctx.positions[self.index_a].a -= ba.inv_inertia * impulse;
            ctx.positions[self.index_b].a += bb.inv_inertia * impulse;
            angular_error = c.abs();
        }

        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];
        let r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        let r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);
        let c = pb.c + r_b - pa.c - r_a;
        let position_error = c.length();

        let k11 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * r_a.y * r_a.y
            + bb.inv_inertia * r_b.y * r_b.y;
        let k12 = -ba.inv_inertia * r_a.x * r_a.y - bb.inv_inertia * r_b.x * r_b.y;
        let k22 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * r_a.x * r_a.x
            + bb.inv_inertia * r_b.x * r_b.x;
        let k = Mat22 {
            col1: Vec2 { x: k11, y: k12 },
            col2: Vec2 { x: k12, y: k22 },
        };
        let impulse = k.solve(-c);

        ctx.positions[self.index_a].c -= impulse * ba.inv_mass;
        ctx.positions[self.index_a].a -= ba.inv_inertia * r_a.cross(impulse);
        ctx.positions[self.index_b].c += impulse * bb.inv_mass;
        ctx.positions[self.index_b].a += bb.inv_inertia * r_b.cross(impulse);

        position_error <= ctx.tuning.linear_slop && angular_error <= ctx.tuning.angular_slop
    }
}

// ============================================================================
// Prismatic joint
// ============================================================================

/// Slider: relative motion restricted to a single axis fixed in body A,
/// with relative rotation locked. Optional translation limit and motor.
#[derive(Clone, Debug)]
pub struct PrismaticJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Slide axis, unit length, in body A's frame.
    pub local_axis_a: Vec2,
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_force: f32,
    pub collide_connected: bool,
}

impl PrismaticJointDef {
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_axis_a: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
            collide_connected: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PrismaticJoint {
    pub(crate) body_a: u32,
    pub(crate) body_b: u32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) collide_connected: bool,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_axis_a: Vec2,
    pub(crate) reference_angle: f32,
    enable_limit: bool,
    lower_translation: f32,
    upper_translation: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_force: f32,
    // Solver state
    axis: Vec2,
    perp: Vec2,
    a1: f32,
    a2: f32,
    s1: f32,
    s2: f32,
    k: Mat22,
    motor_mass: f32,
    limit_state: LimitState,
    /// (perpendicular, angular) accumulated impulses.
    impulse: Vec2,
    motor_impulse: f32,
    limit_impulse: f32,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        Self {
            body_a: def.body_a.index(),
            body_b: def.body_b.index(),
            index_a: 0,
            index_b: 0,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_axis_a: def.local_axis_a.normalize(),
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force,
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            a1: 0.0,
            a2: 0.0,
            s1: 0.0,
            s2: 0.0,
            k: Mat22::IDENTITY,
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            limit_impulse: 0.0,
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        let q_a = Mat22::from_angle(pa.a);
        let r_a = q_a.mul_vec(self.local_anchor_a - ba.local_center);
        let r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);
        let d = pb.c + r_b - pa.c - r_a;

        self.axis = q_a.mul_vec(self.local_axis_a);
        self.a1 = (d + r_a).cross(self.axis);
        self.a2 = r_b.cross(self.axis);
        let motor_inv = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * self.a1 * self.a1
            + bb.inv_inertia * self.a2 * self.a2;
        self.motor_mass = if motor_inv > f32::EPSILON {
            1.0 / motor_inv
        } else {
            0.0
        };

        self.perp = cross_sv(1.0, self.axis);
        self.s1 = (d + r_a).cross(self.perp);
        self.s2 = r_b.cross(self.perp);

        let k11 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * self.s1 * self.s1
            + bb.inv_inertia * self.s2 * self.s2;
        let k12 = ba.inv_inertia * self.s1 + bb.inv_inertia * self.s2;
        let mut k22 = ba.inv_inertia + bb.inv_inertia;
        if k22 == 0.0 {
            // Both fixed-rotation: the angular row is trivially satisfied
            k22 = 1.0;
        }
        self.k = Mat22 {
            col1: Vec2 { x: k11, y: k12 },
            col2: Vec2 { x: k12, y: k22 },
        };

        if self.enable_limit {
            let translation = self.axis.dot(d);
            let new_state = if (self.upper_translation - self.lower_translation).abs()
                < 2.0 * ctx.tuning.linear_slop
            {
                LimitState::Equal
            } else if translation <= self.lower_translation {
                LimitState::AtLower
            } else if translation >= self.upper_translation {
                LimitState::AtUpper
            } else {
                LimitState::Inactive
            };
            if new_state != self.limit_state {
                self.limit_impulse = 0.0;
            }
            self.limit_state = new_state;
        } else {
            self.limit_state = LimitState::Inactive;
            self.limit_impulse = 0.0;
        }

        if ctx.warm_start {
            let axial = self.motor_impulse + self.limit_impulse;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;
            ctx.velocities[self.index_a].v -= p * ba.inv_mass;
            ctx.velocities[self.index_a].w -= ba.inv_inertia * l_a;
            ctx.velocities[self.index_b].v += p * bb.inv_mass;
            ctx.velocities[self.index_b].w += bb.inv_inertia * l_b;
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.limit_impulse = 0.0;
        }
    }

    fn apply_axial(&self, ctx: &mut SolverContext<'_>, impulse: f32) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let p = self.axis * impulse;
        ctx.velocities[self.index_a].v -= p * ba.inv_mass;
        ctx.velocities[self.index_a].w -= ba.inv_inertia * impulse * self.a1;
        ctx.velocities[self.index_b].v += p * bb.inv_mass;
        ctx.velocities[self.index_b].w += bb.inv_inertia * impulse * self.a2;
    }

    fn axial_velocity(&self, ctx: &SolverContext<'_>) -> f32 {
        let va = ctx.velocities[self.index_a];
        let vb = ctx.velocities[self.index_b];
        self.axis.dot(vb.v - va.v) + self.a2 * vb.w - self.a1 * va.w
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let c_dot = self.axial_velocity(ctx) - self.motor_speed;
            let impulse = -self.motor_mass * c_dot;
            let old = self.motor_impulse;
            let max = self.max_motor_force * ctx.dt;
            self.motor_impulse = clamp(old + impulse, -max, max);
            self.apply_axial(ctx, self.motor_impulse - old);
        }

        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let c_dot = self.axial_velocity(ctx);
            let mut impulse = -self.motor_mass * c_dot;
            match self.limit_state {
                LimitState::Equal => self.limit_impulse += impulse,
                LimitState::AtLower => {
                    let new = (self.limit_impulse + impulse).max(0.0);
                    impulse = new - self.limit_impulse;
                    self.limit_impulse = new;
                }
                LimitState::AtUpper => {
                    let new = (self.limit_impulse + impulse).min(0.0);
                    impulse = new - self.limit_impulse;
                    self.limit_impulse = new;
                }
                LimitState::Inactive => unreachable!(),
            }
            self.apply_axial(ctx, impulse);
        }

        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let va = ctx.velocities[self.index_a];
        let vb = ctx.velocities[self.index_b];
        let c_dot1 = self.perp.dot(vb.v - va.v) + self.s2 * vb.w - self.s1 * va.w;
        let c_dot2 = vb.w - va.w;
        let df = self.k.solve(-Vec2::new(c_dot1, c_dot2));
        self.impulse += df;

        let p = self.perp * df.x;
        let l_a = df.x * self.s1 + df.y;
        let l_b = df.x * self.s2 + df.y;
        ctx.velocities[self.index_a].v -= p * ba.inv_mass;
        ctx.velocities[self.index_a].w -= ba.inv_inertia * l_a;
        ctx.velocities[self.index_b].v += p * bb.inv_mass;
        ctx.velocities[self.index_b].w += bb.inv_inertia * l_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        let q_a = Mat22::from_angle(pa.a);
        let r_a = q_a.mul_vec(self.local_anchor_a - ba.local_center);
        let r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);
        let d = pb.c + r_b - pa.c - r_a;
        let axis = q_a.mul_vec(self.local_axis_a);
        let a1 = (d + r_a).cross(axis);
        let a2 = r_b.cross(axis);
        let perp = cross_sv(1.0, axis);
        let s1 = (d + r_a).cross(perp);
        let s2 = r_b.cross(perp);

        let mut linear_error;
        if self.enable_limit && self.limit_state != LimitState::Inactive {
            let translation = axis.dot(d);
            let max = ctx.tuning.max_linear_correction;
            let c = match self.limit_state {
                LimitState::Equal => clamp(translation - self.lower_translation, -max, max),
                LimitState::AtLower => clamp(
                    translation - self.lower_translation + ctx.tuning.linear_slop,
                    -max,
                    0.0,
                ),
                LimitState::AtUpper => clamp(
                    translation - self.upper_translation - ctx.tuning.linear_slop,
                    0.0,
                    max,
                ),
                LimitState::Inactive => unreachable!(),
            };
            let motor_inv = ba.inv_mass
                + bb.inv_mass
                + ba.inv_inertia * a1 * a1
                + bb.inv_inertia * a2 * a2;
            let impulse = if motor_inv > f32::EPSILON {
                -c / motor_inv
            } else {
                0.0
            };
            let p = axis * impulse;
            ctx.positions[self.index_a].c -= p * ba.inv_mass;
            ctx.positions[self.index_a].a -= ba.inv_inertia * impulse * a1;
            ctx.positions[self.index_b].c += p * bb.inv_mass;
            ctx.positions[self.index_b].a += bb.inv_inertia * impulse * a2;
            linear_error = c.abs();
        } else {
            linear_error = 0.0;
        }

        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];
        let c1 = perp.dot(d);
        let c2 = pb.a - pa.a - self.reference_angle;
        linear_error = linear_error.max(c1.abs());
        let angular_error = c2.abs();

        let k11 = ba.inv_mass
            + bb.inv_mass
            + ba.inv_inertia * s1 * s1
            + bb.inv_inertia * s2 * s2;
        let k12 = ba.inv_inertia * s1 + bb.inv_inertia * s2;
        let mut k22 = ba.inv_inertia + bb.inv_inertia;
        if k22 == 0.0 {
            k22 = 1.0;
        }
        let k = Mat22 {
            col1: Vec2 { x: k11, y: k12 },
            col2: Vec2 { x: k12, y: k22 },
        };
        let impulse = k.solve(-Vec2::new(c1, c2));

        let p = perp * impulse.x;
        let l_a = impulse.x * s1 + impulse.y;
        let l_b = impulse.x * s2 + impulse.y;
        ctx.positions[self.index_a].c -= p * ba.inv_mass;
        ctx.positions[self.index_a].a -= ba.inv_inertia * l_a;
        ctx.positions[self.index_b].c += p * bb.inv_mass;
        ctx.positions[self.index_b].a += bb.inv_inertia * l_b;

        linear_error <= ctx.tuning.linear_slop && angular_error <= ctx.tuning.angular_slop
    }
}

// ============================================================================
// Pulley joint
// ============================================================================

/// Idealized rope over two ground pulleys: `length_a + ratio * length_b` is
/// held constant, and each side may additionally be capped at a maximum
/// length. The rope can go slack; all constraints are one-sided.
#[derive(Clone, Debug)]
pub struct PulleyJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    /// First pulley wheel, world coordinates.
    pub ground_anchor_a: Vec2,
    /// Second pulley wheel, world coordinates.
    pub ground_anchor_b: Vec2,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length of the A-side rope segment.
    pub length_a: f32,
    /// Rest length of the B-side rope segment.
    pub length_b: f32,
    /// Mechanical advantage; side B counts `ratio` times.
    pub ratio: f32,
    pub max_length_a: f32,
    pub max_length_b: f32,
    pub collide_connected: bool,
}

impl PulleyJointDef {
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            ground_anchor_a: Vec2::new(-1.0, 1.0),
            ground_anchor_b: Vec2::new(1.0, 1.0),
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
            max_length_a: f32::MAX,
            max_length_b: f32::MAX,
            collide_connected: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PulleyJoint {
    pub(crate) body_a: u32,
    pub(crate) body_b: u32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) collide_connected: bool,
    ground_anchor_a: Vec2,
    ground_anchor_b: Vec2,
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    constant: f32,
    ratio: f32,
    max_length_a: f32,
    max_length_b: f32,
    // Solver state
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    pulley_mass: f32,
    limit_mass_a: f32,
    limit_mass_b: f32,
    rope_taut: bool,
    side_a_taut: bool,
    side_b_taut: bool,
    impulse: f32,
    limit_impulse_a: f32,
    limit_impulse_b: f32,
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Self {
        let ratio = def.ratio.max(f32::EPSILON);
        Self {
            body_a: def.body_a.index(),
            body_b: def.body_b.index(),
            index_a: 0,
            index_b: 0,
            collide_connected: def.collide_connected,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            constant: def.length_a + ratio * def.length_b,
            ratio,
            max_length_a: def
                .max_length_a
                .min(def.length_a + ratio * def.length_b - ratio * MIN_PULLEY_LENGTH),
            max_length_b: def
                .max_length_b
                .min((def.length_a + ratio * def.length_b - MIN_PULLEY_LENGTH) / ratio),
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            pulley_mass: 0.0,
            limit_mass_a: 0.0,
            limit_mass_b: 0.0,
            rope_taut: false,
            side_a_taut: false,
            side_b_taut: false,
            impulse: 0.0,
            limit_impulse_a: 0.0,
            limit_impulse_b: 0.0,
        }
    }

    fn unit_from(anchor: Vec2, ground: Vec2) -> (Vec2, f32) {
        let d = anchor - ground;
        let len = d.length();
        if len > 0.01 {
            (d / len, len)
        } else {
            (Vec2::ZERO, len)
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        self.r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        self.r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);

        let (u_a, len_a) = Self::unit_from(pa.c + self.r_a, self.ground_anchor_a);
        let (u_b, len_b) = Self::unit_from(pb.c + self.r_b, self.ground_anchor_b);
        self.u_a = u_a;
        self.u_b = u_b;

        let c = self.constant - len_a - self.ratio * len_b;
        let was_taut = self.rope_taut;
        self.rope_taut = c <= 0.0;
        if !self.rope_taut {
            self.impulse = 0.0;
        } else if !was_taut {
            self.impulse = 0.0;
        }

        let a_was = self.side_a_taut;
        self.side_a_taut = len_a >= self.max_length_a;
        if !self.side_a_taut || !a_was {
            self.limit_impulse_a = 0.0;
        }
        let b_was = self.side_b_taut;
        self.side_b_taut = len_b >= self.max_length_b;
        if !self.side_b_taut || !b_was {
            self.limit_impulse_b = 0.0;
        }

        let cr_a = self.r_a.cross(self.u_a);
        let cr_b = self.r_b.cross(self.u_b);
        let m_a = ba.inv_mass + ba.inv_inertia * cr_a * cr_a;
        let m_b = bb.inv_mass + bb.inv_inertia * cr_b * cr_b;
        self.limit_mass_a = if m_a > f32::EPSILON { 1.0 / m_a } else { 0.0 };
        self.limit_mass_b = if m_b > f32::EPSILON { 1.0 / m_b } else { 0.0 };
        let m = m_a + self.ratio * self.ratio * m_b;
        self.pulley_mass = if m > f32::EPSILON { 1.0 / m } else { 0.0 };

        if ctx.warm_start {
            let p_a = self.u_a * -(self.impulse + self.limit_impulse_a);
            let p_b = self.u_b * -(self.ratio * self.impulse + self.limit_impulse_b);
            ctx.velocities[self.index_a].v += p_a * ba.inv_mass;
            ctx.velocities[self.index_a].w += ba.inv_inertia * self.r_a.cross(p_a);
            ctx.velocities[self.index_b].v += p_b * bb.inv_mass;
            ctx.velocities[self.index_b].w += bb.inv_inertia * self.r_b.cross(p_b);
        } else {
            self.impulse = 0.0;
            self.limit_impulse_a = 0.0;
            self.limit_impulse_b = 0.0;
        }
    }

    fn anchor_velocity(&self, ctx: &SolverContext<'_>, index: usize, r: Vec2) -> Vec2 {
        let v = ctx.velocities[index];
        v.v + cross_sv(v.w, r)
    }

    fn apply(&self, ctx: &mut SolverContext<'_>, index: usize, r: Vec2, p: Vec2) {
        let b = ctx.bodies[index];
        ctx.velocities[index].v += p * b.inv_mass;
        ctx.velocities[index].w += b.inv_inertia * r.cross(p);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        if self.rope_taut {
            let vp_a = self.anchor_velocity(ctx, self.index_a, self.r_a);
            let vp_b = self.anchor_velocity(ctx, self.index_b, self.r_b);
            let c_dot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
            let mut impulse = self.pulley_mass * -c_dot;
            // The rope only pulls
            let new = (self.impulse + impulse).max(0.0);
            impulse = new - self.impulse;
            self.impulse = new;

            self.apply(ctx, self.index_a, self.r_a, self.u_a * -impulse);
            self.apply(
                ctx,
                self.index_b,
                self.r_b,
                self.u_b * (-self.ratio * impulse),
            );
        }

        if self.side_a_taut {
            let vp_a = self.anchor_velocity(ctx, self.index_a, self.r_a);
            let c_dot = -self.u_a.dot(vp_a);
            let mut impulse = -self.limit_mass_a * c_dot;
            let new = (self.limit_impulse_a + impulse).max(0.0);
            impulse = new - self.limit_impulse_a;
            self.limit_impulse_a = new;
            self.apply(ctx, self.index_a, self.r_a, self.u_a * -impulse);
        }

        if self.side_b_taut {
            let vp_b = self.anchor_velocity(ctx, self.index_b, self.r_b);
            let c_dot = -self.u_b.dot(vp_b);
            let mut impulse = -self.limit_mass_b * c_dot;
            let new = (self.limit_impulse_b + impulse).max(0.0);
            impulse = new - self.limit_impulse_b;
            self.limit_impulse_b = new;
            self.apply(ctx, self.index_b, self.r_b, self.u_b * -impulse);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];

        let mut linear_error = 0.0f32;

        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];
        let r_a = Mat22::from_angle(pa.a).mul_vec(self.local_anchor_a - ba.local_center);
        let r_b = Mat22::from_angle(pb.a).mul_vec(self.local_anchor_b - bb.local_center);
        let (u_a, len_a) = Self::unit_from(pa.c + r_a, self.ground_anchor_a);
        let (u_b, len_b) = Self::unit_from(pb.c + r_b, self.ground_anchor_b);

        if self.rope_taut {
            let mut c = self.constant - len_a - self.ratio * len_b;
            linear_error = linear_error.max(-c);
            c = clamp(c + ctx.tuning.linear_slop, -ctx.tuning.max_linear_correction, 0.0);
            let impulse = -self.pulley_mass * c;

            let p_a = u_a * -impulse;
            let p_b = u_b * (-self.ratio * impulse);
            ctx.positions[self.index_a].c += p_a * ba.inv_mass;
            ctx.positions[self.index_a].a += ba.inv_inertia * r_a.cross(p_a);
            ctx.positions[self.index_b].c += p_b * bb.inv_mass;
            ctx.positions[self.index_b].a += bb.inv_inertia * r_b.cross(p_b);
        }

        if self.side_a_taut {
            let mut c = self.max_length_a - len_a;
            linear_error = linear_error.max(-c);
            c = clamp(c + ctx.tuning.linear_slop, -ctx.tuning.max_linear_correction, 0.0);
            let impulse = -self.limit_mass_a * c;
            let p_a = u_a * -impulse;
            ctx.positions[self.index_a].c += p_a * ba.inv_mass;
            ctx.positions[self.index_a].a += ba.inv_inertia * r_a.cross(p_a);
        }

        if self.side_b_taut {
            let mut c = self.max_length_b - len_b;
            linear_error = linear_error.max(-c);
            c = clamp(c + ctx.tuning.linear_slop, -ctx.tuning.max_linear_correction, 0.0);
            let impulse = -self.limit_mass_b * c;
            let p_b = u_b * -impulse;
            ctx.positions[self.index_b].c += p_b * bb.inv_mass;
            ctx.positions[self.index_b].a += bb.inv_inertia * r_b.cross(p_b);
        }

        linear_error < ctx.tuning.linear_slop
    }
}

// ============================================================================
// Gear joint
// ============================================================================

/// One side of a gear: how the coupled coordinate is measured on a body
/// whose partner in the underlying joint is static ground.
#[derive(Clone, Copy, Debug)]
pub(crate) enum GearAxis {
    /// Hinge side: coordinate is the body angle minus a fixed offset.
    Angular { offset: f32 },
    /// Slider side: coordinate is the anchor's travel along a fixed world
    /// axis from a fixed world point.
    Linear {
        ground_anchor: Vec2,
        axis: Vec2,
        local_anchor: Vec2,
    },
}

/// Couples the coordinates of two ground-attached joints:
/// `coord_a + ratio * coord_b` is held at its value from creation time.
/// Referenced joints must each connect a static body to a dynamic one.
#[derive(Clone, Debug)]
pub struct GearJointDef {
    /// A revolute or prismatic joint whose first body is static.
    pub joint_a: crate::world::JointId,
    /// A revolute or prismatic joint whose first body is static.
    pub joint_b: crate::world::JointId,
    pub ratio: f32,
}

impl GearJointDef {
    #[must_use]
    pub fn new(joint_a: crate::world::JointId, joint_b: crate::world::JointId) -> Self {
        Self {
            joint_a,
            joint_b,
            ratio: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GearJoint {
    pub(crate) body_a: u32,
    pub(crate) body_b: u32,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) side_a: GearAxis,
    pub(crate) side_b: GearAxis,
    pub(crate) ratio: f32,
    pub(crate) constant: f32,
    // Cached Jacobian
    linear_a: Vec2,
    angular_a: f32,
    linear_b: Vec2,
    angular_b: f32,
    mass: f32,
    impulse: f32,
}

impl GearJoint {
    pub(crate) fn new(
        body_a: u32,
        body_b: u32,
        side_a: GearAxis,
        side_b: GearAxis,
        ratio: f32,
        constant: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            index_a: 0,
            index_b: 0,
            side_a,
            side_b,
            ratio,
            constant,
            linear_a: Vec2::ZERO,
            angular_a: 0.0,
            linear_b: Vec2::ZERO,
            angular_b: 0.0,
            mass: 0.0,
            impulse: 0.0,
        }
    }

    fn coordinate(side: &GearAxis, pos: crate::island::Position, local_center: Vec2) -> f32 {
        match side {
            GearAxis::Angular { offset } => pos.a - offset,
            GearAxis::Linear {
                ground_anchor,
                axis,
                local_anchor,
            } => {
                let r = Mat22::from_angle(pos.a).mul_vec(*local_anchor - local_center);
                axis.dot(pos.c + r - *ground_anchor)
            }
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let pa = ctx.positions[self.index_a];
        let pb = ctx.positions[self.index_b];

        let mut k = 0.0;
        match &self.side_a {
            GearAxis::Angular { .. } => {
                self.linear_a = Vec2::ZERO;
                self.angular_a = -1.0;
                k += ba.inv_inertia;
            }
            GearAxis::Linear {
                axis, local_anchor, ..
            } => {
                let r = Mat22::from_angle(pa.a).mul_vec(*local_anchor - ba.local_center);
                let cr = r.cross(*axis);
                self.linear_a = -*axis;
                self.angular_a = -cr;
                k += ba.inv_mass + ba.inv_inertia * cr * cr;
            }
        }
        match &self.side_b {
            GearAxis::Angular { .. } => {
                self.linear_b = Vec2::ZERO;
                self.angular_b = -self.ratio;
                k += self.ratio * self.ratio * bb.inv_inertia;
            }
            GearAxis::Linear {
                axis, local_anchor, ..
            } => {
                let r = Mat22::from_angle(pb.a).mul_vec(*local_anchor - bb.local_center);
                let cr = r.cross(*axis);
                self.linear_b = *axis * -self.ratio;
                self.angular_b = -self.ratio * cr;
                k += self.ratio * self.ratio * (bb.inv_mass + bb.inv_inertia * cr * cr);
            }
        }
        self.mass = if k > f32::EPSILON { 1.0 / k } else { 0.0 };

        if ctx.warm_start {
            ctx.velocities[self.index_a].v += self.linear_a * (ba.inv_mass * self.impulse);
            ctx.velocities[self.index_a].w += ba.inv_inertia * self.impulse * self.angular_a;
            ctx.velocities[self.index_b].v += self.linear_b * (bb.inv_mass * self.impulse);
            ctx.velocities[self.index_b].w += bb.inv_inertia * self.impulse * self.angular_b;
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];
        let va = ctx.velocities[self.index_a];
        let vb = ctx.velocities[self.index_b];

        let c_dot = self.linear_a.dot(va.v)
            + self.angular_a * va.w
            + self.linear_b.dot(vb.v)
            + self.angular_b * vb.w;
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        ctx.velocities[self.index_a].v += self.linear_a * (ba.inv_mass * impulse);
        ctx.velocities[self.index_a].w += ba.inv_inertia * impulse * self.angular_a;
        ctx.velocities[self.index_b].v += self.linear_b * (bb.inv_mass * impulse);
        ctx.velocities[self.index_b].w += bb.inv_inertia * impulse * self.angular_b;
    }

    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let ba = ctx.bodies[self.index_a];
        let bb = ctx.bodies[self.index_b];

        let coord_a = Self::coordinate(
            &self.side_a,
            ctx.positions[self.index_a],
            ba.local_center,
        );
        let coord_b = Self::coordinate(
            &self.side_b,
            ctx.positions[self.index_b],
            bb.local_center,
        );
        let c = self.constant - (coord_a + self.ratio * coord_b);
        let impulse = -self.mass * c;

        ctx.positions[self.index_a].c += self.linear_a * (ba.inv_mass * impulse);
        ctx.positions[self.index_a].a += ba.inv_inertia * impulse * self.angular_a;
        ctx.positions[self.index_b].c += self.linear_b * (bb.inv_mass * impulse);
        ctx.positions[self.index_b].a += bb.inv_inertia * impulse * self.angular_b;

        // The gear drives the coupled joints; their own position solves
        // carry the convergence burden.
        true
    }
}

// ============================================================================
// Constant-volume joint
// ============================================================================

/// Soft-body blob: a closed ring of bodies whose enclosed area is held at
/// its creation-time value, with internal distance constraints between
/// neighbors keeping the ring from folding.
#[derive(Clone, Debug)]
pub struct ConstantVolumeJointDef {
    /// Ring members in winding order; at least three.
    pub bodies: Vec<BodyId>,
}

#[derive(Clone, Debug)]
pub struct ConstantVolumeJoint {
    pub(crate) bodies: Vec<u32>,
    pub(crate) indices: Vec<usize>,
    /// Rest distances between consecutive ring members.
    target_lengths: Vec<f32>,
    target_volume: f32,
    // Solver state
    normals: Vec<Vec2>,
    deltas: Vec<Vec2>,
    impulse: f32,
    edge_impulses: Vec<f32>,
    edge_units: Vec<Vec2>,
    edge_masses: Vec<f32>,
}

fn ring_area(points: impl Fn(usize) -> Vec2, n: usize) -> f32 {
    let mut area = 0.0;
    for i in 0..n {
        let next = (i + 1) % n;
        area += points(i).cross(points(next));
    }
    0.5 * area
}

impl ConstantVolumeJoint {
    /// `positions` are the members' world centers at creation time, in the
    /// same order as `bodies`.
    pub(crate) fn new(bodies: Vec<u32>, positions: &[Vec2]) -> Self {
        let n = bodies.len();
        let mut target_lengths = Vec::with_capacity(n);
        for i in 0..n {
            let next = (i + 1) % n;
            target_lengths.push((positions[next] - positions[i]).length());
        }
        let target_volume = ring_area(|i| positions[i], n);
        Self {
            bodies,
            indices: vec![0; n],
            target_lengths,
            target_volume,
            normals: vec![Vec2::ZERO; n],
            deltas: vec![Vec2::ZERO; n],
            impulse: 0.0,
            edge_impulses: vec![0.0; n],
            edge_units: vec![Vec2::ZERO; n],
            edge_masses: vec![0.0; n],
        }
    }

    /// Half the difference vector across each member's two neighbors;
    /// doubles as the volume-constraint Jacobian direction.
    fn compute_deltas(&mut self, ctx: &SolverContext<'_>) {
        let n = self.indices.len();
        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            self.deltas[i] =
                ctx.positions[self.indices[next]].c - ctx.positions[self.indices[prev]].c;
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let n = self.indices.len();

        // Neighbor distance constraints, anchored at the centers
        for i in 0..n {
            let next = (i + 1) % n;
            let (ia, ib) = (self.indices[i], self.indices[next]);
            let d = ctx.positions[ib].c - ctx.positions[ia].c;
            let len = d.length();
            self.edge_units[i] = if len > f32::EPSILON { d / len } else { Vec2::ZERO };
            let m = ctx.bodies[ia].inv_mass + ctx.bodies[ib].inv_mass;
            self.edge_masses[i] = if m > 0.0 { 1.0 / m } else { 0.0 };
        }

        self.compute_deltas(ctx);

        if ctx.warm_start {
            for i in 0..n {
                let next = (i + 1) % n;
                let (ia, ib) = (self.indices[i], self.indices[next]);
                let p = self.edge_units[i] * self.edge_impulses[i];
                ctx.velocities[ia].v -= p * ctx.bodies[ia].inv_mass;
                ctx.velocities[ib].v += p * ctx.bodies[ib].inv_mass;
            }
            for i in 0..n {
                let idx = self.indices[i];
                let d = self.deltas[i];
                ctx.velocities[idx].v +=
                    d.cross_scalar(1.0) * (0.5 * self.impulse * ctx.bodies[idx].inv_mass);
            }
        } else {
            self.impulse = 0.0;
            self.edge_impulses.iter_mut().for_each(|j| *j = 0.0);
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, ctx: &mut SolverContext<'_>) {
        let n = self.indices.len();

        for i in 0..n {
            let next = (i + 1) % n;
            let (ia, ib) = (self.indices[i], self.indices[next]);
            let u = self.edge_units[i];
            let c_dot = u.dot(ctx.velocities[ib].v - ctx.velocities[ia].v);
            let impulse = -self.edge_masses[i] * c_dot;
            self.edge_impulses[i] += impulse;
            let p = u * impulse;
            ctx.velocities[ia].v -= p * ctx.bodies[ia].inv_mass;
            ctx.velocities[ib].v += p * ctx.bodies[ib].inv_mass;
        }

        self.compute_deltas(ctx);
        let mut cross_mass_sum = 0.0;
        let mut dot_mass_sum = 0.0;
        for i in 0..n {
            let idx = self.indices[i];
            let d = self.deltas[i];
            dot_mass_sum += d.length_squared() * ctx.bodies[idx].inv_mass;
            cross_mass_sum += ctx.velocities[idx].v.cross(d);
        }
        if dot_mass_sum <= f32::EPSILON {
            return;
        }
        let lambda = -2.0 * cross_mass_sum / dot_mass_sum;
        self.impulse += lambda;
        for i in 0..n {
            let idx = self.indices[i];
            let d = self.deltas[i];
            ctx.velocities[idx].v +=
                d.cross_scalar(1.0) * (0.5 * lambda * ctx.bodies[idx].inv_mass);
        }
    }

    pub(crate) fn solve_position_constraints(&mut self, ctx: &mut SolverContext<'_>) -> bool {
        let n = self.indices.len();
        let mut done = true;

        // Re-inflate toward the target area by extruding along the averaged
        // edge normals, weighted by the perimeter
        let mut perimeter = 0.0;
        for i in 0..n {
            let next = (i + 1) % n;
            let d = ctx.positions[self.indices[next]].c - ctx.positions[self.indices[i]].c;
            let dist = d.length();
            self.normals[i] = if dist > f32::EPSILON {
                d.cross_scalar(1.0) / dist
            } else {
                Vec2::ZERO
            };
            perimeter += dist;
        }
        if perimeter > f32::EPSILON {
            let area = ring_area(|i| ctx.positions[self.indices[i]].c, n);
            let delta_area = self.target_volume - area;
            let to_extrude = 0.5 * delta_area / perimeter;
            for i in 0..n {
                let prev = (i + n - 1) % n;
                let delta = (self.normals[prev] + self.normals[i]) * to_extrude;
                done &= delta.length_squared()
                    <= ctx.tuning.max_linear_correction * ctx.tuning.max_linear_correction;
                if ctx.bodies[self.indices[i]].inv_mass > 0.0 {
                    ctx.positions[self.indices[i]].c += delta;
                }
            }
        }

        // Neighbor distances
        for i in 0..n {
            let next = (i + 1) % n;
            let (ia, ib) = (self.indices[i], self.indices[next]);
            let d = ctx.positions[ib].c - ctx.positions[ia].c;
            let len = d.length();
            if len < f32::EPSILON {
                continue;
            }
            let u = d / len;
            let c = clamp(
                len - self.target_lengths[i],
                -ctx.tuning.max_linear_correction,
                ctx.tuning.max_linear_correction,
            );
            let impulse = -self.edge_masses[i] * c;
            let p = u * impulse;
            ctx.positions[ia].c -= p * ctx.bodies[ia].inv_mass;
            ctx.positions[ib].c += p * ctx.bodies[ib].inv_mass;
            done &= c.abs() < ctx.tuning.linear_slop;
        }

        done
    }
}
