//! Rigid Bodies
//!
//! A body owns a transform, a motion [`Sweep`], velocities, mass properties,
//! and a set of attached shape handles. Bodies are stored in the world's
//! arena and referred to by `u32` handle indices everywhere.
//!
//! Mass is derived from attached shape densities. A dynamic body whose
//! shapes carry zero density is given unit mass so it still responds to
//! forces. Static bodies have infinite mass (inverse zero) and never move.
//!
//! Author: Moroya Sakamoto

use crate::math::{cross_sv, Mat22, Sweep, Transform, Vec2};
use crate::shape::MassData;

// Body status flags
/// Body left the world AABB and no longer collides or integrates.
pub(crate) const FLAG_FROZEN: u32 = 0x0001;
/// Scratch flag used by the island DFS.
pub(crate) const FLAG_ISLAND: u32 = 0x0002;
/// Body is asleep.
pub(crate) const FLAG_SLEEP: u32 = 0x0004;
/// Body may fall asleep when its island quiets down.
pub(crate) const FLAG_ALLOW_SLEEP: u32 = 0x0008;
/// Body gets continuous collision against static geometry.
pub(crate) const FLAG_BULLET: u32 = 0x0010;
/// Rotation is locked (infinite rotational inertia).
pub(crate) const FLAG_FIXED_ROTATION: u32 = 0x0020;

/// How a body participates in simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyType {
    /// Infinite mass, never moves, collides with dynamic bodies only.
    #[default]
    Static,
    /// Finite mass, fully simulated.
    Dynamic,
}

/// Construction parameters for a body.
#[derive(Clone, Copy, Debug)]
pub struct BodyDef {
    /// Static or dynamic.
    pub body_type: BodyType,
    /// Initial world position of the body origin.
    pub position: Vec2,
    /// Initial angle (radians).
    pub angle: f32,
    /// Initial linear velocity of the center of mass.
    pub linear_velocity: Vec2,
    /// Initial angular velocity (rad/s).
    pub angular_velocity: f32,
    /// Linear velocity decay rate (1/s).
    pub linear_damping: f32,
    /// Angular velocity decay rate (1/s).
    pub angular_damping: f32,
    /// Whether this body may fall asleep.
    pub allow_sleep: bool,
    /// Whether to lock rotation.
    pub fixed_rotation: bool,
    /// Whether to run continuous collision against static geometry for this
    /// body even at high speed.
    pub bullet: bool,
    /// Opaque client data.
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            fixed_rotation: false,
            bullet: false,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// A dynamic body at `position`.
    #[must_use]
    pub fn dynamic_at(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Self::default()
        }
    }

    /// A static body at `position`.
    #[must_use]
    pub fn static_at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// A rigid body. Owned by the [`crate::world::World`] arena.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) flags: u32,
    pub(crate) body_type: BodyType,

    /// Body-origin transform.
    pub(crate) xf: Transform,
    /// Center-of-mass motion over the current step.
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,

    /// Accumulated low-motion time (seconds).
    pub(crate) sleep_time: f32,
    /// Slot in the current island's state arrays; only valid mid-solve.
    pub(crate) island_index: u32,

    /// Attached shape handles.
    pub(crate) shapes: Vec<u32>,
    /// Joint handles touching this body.
    pub(crate) joints: Vec<u32>,

    /// Opaque client data.
    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = 0;
        if def.allow_sleep {
            flags |= FLAG_ALLOW_SLEEP;
        }
        if def.fixed_rotation {
            flags |= FLAG_FIXED_ROTATION;
        }
        if def.bullet {
            flags |= FLAG_BULLET;
        }

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: def.position,
            c: def.position,
            a0: def.angle,
            a: def.angle,
            t0: 0.0,
        };

        Self {
            flags,
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            sleep_time: 0.0,
            island_index: 0,
            shapes: Vec::new(),
            joints: Vec::new(),
            user_data: def.user_data,
        }
    }

    // ------------------------------------------------------------------------
    // State Queries
    // ------------------------------------------------------------------------

    /// Whether this is a static body.
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Whether this is a dynamic body.
    #[inline]
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Whether the body is asleep.
    #[inline]
    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.flags & FLAG_SLEEP != 0
    }

    /// Whether the body has been frozen (left the world AABB).
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.flags & FLAG_FROZEN != 0
    }

    /// Whether continuous collision is forced for this body.
    #[inline]
    #[must_use]
    pub fn is_bullet(&self) -> bool {
        self.flags & FLAG_BULLET != 0
    }

    /// Mass (kg); zero for static bodies.
    #[inline]
    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the center of mass.
    #[inline]
    #[must_use]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Body-origin transform.
    #[inline]
    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// Body-origin position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.xf.position
    }

    /// Body angle (radians).
    #[inline]
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    /// World position of the center of mass.
    #[inline]
    #[must_use]
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    /// Linear velocity of the center of mass.
    #[inline]
    #[must_use]
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    /// Angular velocity (rad/s).
    #[inline]
    #[must_use]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// Attached shape handles.
    #[must_use]
    pub fn shape_handles(&self) -> &[u32] {
        &self.shapes
    }

    /// Transform a body-local point to world coordinates.
    #[inline]
    #[must_use]
    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.xf.mul(local)
    }

    /// Transform a world point to body-local coordinates.
    #[inline]
    #[must_use]
    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.xf.mul_t(world)
    }

    /// Rotate a body-local vector into world coordinates.
    #[inline]
    #[must_use]
    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.xf.rot.mul_vec(local)
    }

    /// Velocity of a world point rigidly attached to the body.
    #[inline]
    #[must_use]
    pub fn velocity_at_world_point(&self, world: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world - self.sweep.c)
    }

    // ------------------------------------------------------------------------
    // State Changes
    // ------------------------------------------------------------------------

    /// Wake the body and reset its sleep timer.
    pub fn wake_up(&mut self) {
        self.flags &= !FLAG_SLEEP;
        self.sleep_time = 0.0;
    }

    /// Force the body to sleep immediately, zeroing its motion.
    pub fn put_to_sleep(&mut self) {
        self.flags |= FLAG_SLEEP;
        self.sleep_time = 0.0;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Set the linear velocity, waking the body.
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.is_dynamic() {
            self.linear_velocity = v;
            self.wake_up();
        }
    }

    /// Set the angular velocity, waking the body.
    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.is_dynamic() {
            self.angular_velocity = w;
            self.wake_up();
        }
    }

    /// Enable or disable bullet (continuous collision) behavior.
    pub fn set_bullet(&mut self, bullet: bool) {
        if bullet {
            self.flags |= FLAG_BULLET;
        } else {
            self.flags &= !FLAG_BULLET;
        }
    }

    /// Accumulate a force applied at a world point. Wakes the body.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.wake_up();
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    /// Accumulate a pure torque. Wakes the body.
    pub fn apply_torque(&mut self, torque: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.wake_up();
        self.torque += torque;
    }

    /// Apply an instantaneous impulse at a world point. Wakes the body.
    pub fn apply_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.wake_up();
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    // ------------------------------------------------------------------------
    // Mass and Motion Bookkeeping
    // ------------------------------------------------------------------------

    /// Install mass properties computed from the attached shapes.
    ///
    /// `data.inertia` is about the body origin; it is shifted to the center
    /// of mass here. Static bodies ignore the data entirely.
    pub(crate) fn set_mass_data(&mut self, data: &MassData) {
        if self.is_static() {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
            self.sweep.local_center = Vec2::ZERO;
            self.sweep.c0 = self.xf.position;
            self.sweep.c = self.xf.position;
            return;
        }

        let (mass, center, inertia_origin) = if data.mass > f32::EPSILON {
            (data.mass, data.center, data.inertia)
        } else {
            // Dynamic body with no density; give it unit mass at the origin
            (1.0, Vec2::ZERO, 0.0)
        };

        self.mass = mass;
        self.inv_mass = 1.0 / mass;

        let inertia_center = inertia_origin - mass * center.length_squared();
        if inertia_center > f32::EPSILON && self.flags & FLAG_FIXED_ROTATION == 0 {
            self.inertia = inertia_center;
            self.inv_inertia = 1.0 / inertia_center;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        self.sweep.local_center = center;
        let c = self.xf.mul(center);
        self.sweep.c0 = c;
        self.sweep.c = c;
    }

    /// Rebuild the body-origin transform from the end-of-sweep state.
    pub(crate) fn synchronize_transform(&mut self) {
        let rot = Mat22::from_angle(self.sweep.a);
        self.xf = Transform {
            position: self.sweep.c - rot.mul_vec(self.sweep.local_center),
            rot,
        };
    }

    /// Advance the sweep start to time `t` and rebuild the transform there.
    /// Used by the TOI pass.
    pub(crate) fn advance_to(&mut self, t: f32) {
        self.sweep.advance(t);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }
}
