//! World Orchestration
//!
//! The [`World`] owns every body, shape, contact, and joint, plus the broad
//! phase, and drives the step pipeline:
//!
//! 1. commit buffered broad-phase pairs into contact creation/destruction,
//! 2. narrow phase: re-evaluate every live contact's manifold,
//! 3. partition awake bodies into islands and solve them,
//! 4. synchronize broad-phase proxies with swept AABBs, freezing bodies
//!    that left the world bounds,
//! 5. continuous collision: repeatedly solve the earliest time of impact
//!    until nothing hits before the end of the step,
//! 6. deliver buffered contact events.
//!
//! Structural mutation is forbidden while the world is locked inside
//! `step()`; those calls fail with [`PhysicsError::WorldLocked`] instead of
//! corrupting the graphs being walked.
//!
//! Author: Moroya Sakamoto

use crate::aabb::{Aabb, Segment};
use crate::body::{Body, BodyDef, FLAG_FROZEN, FLAG_ISLAND, FLAG_SLEEP};
use crate::broad_phase::BroadPhase;
use crate::contact::Contact;
use crate::error::PhysicsError;
use crate::event::{
    BoundaryListener, ContactFilter, ContactListener, DefaultContactFilter, EventBuffer,
};
use crate::island::{Island, TimeStep};
use crate::joint::{DistanceJoint, Joint, JointDef, MouseJoint};
use crate::joint_extra::{
    ConstantVolumeJoint, GearAxis, GearJoint, PrismaticJoint, PulleyJoint, RevoluteJoint,
};
use crate::math::Vec2;
use crate::pair_manager::PairCallback;
use crate::settings::Tuning;
use crate::shape::{MassData, Shape, ShapeDef, INVALID_PROXY};
use crate::toi::time_of_impact;

/// Pair payload meaning "no contact": the pair was filtered out.
const NULL_CONTACT: u32 = u32::MAX;

/// Default broad-phase proxy capacity.
const DEFAULT_MAX_PROXIES: usize = 4096;

// ============================================================================
// Handles
// ============================================================================

/// Handle to a body in a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyId(pub(crate) u32);

/// Handle to a shape in a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeId(pub(crate) u32);

/// Handle to a joint in a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointId(pub(crate) u32);

impl BodyId {
    #[inline]
    pub(crate) fn index(self) -> u32 {
        self.0
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Counters from the most recent `step()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepDiagnostics {
    /// Live broad-phase pairs after the commit.
    pub pairs: usize,
    /// Contacts evaluated this step.
    pub contacts: usize,
    /// Contacts with at least one manifold point.
    pub touching_contacts: usize,
    /// Islands solved.
    pub islands: usize,
    /// TOI sub-island solves.
    pub toi_solves: usize,
    /// Bodies frozen for leaving the world bounds this step.
    pub frozen_bodies: usize,
}

// ============================================================================
// World
// ============================================================================

/// The physics world: owns all simulation state and advances it in steps.
pub struct World {
    broad_phase: BroadPhase,
    bodies: Vec<Option<Body>>,
    body_free: Vec<u32>,
    shapes: Vec<Option<Shape>>,
    shape_free: Vec<u32>,
    contacts: Vec<Option<Contact>>,
    contact_free: Vec<u32>,
    joints: Vec<Option<Joint>>,
    joint_free: Vec<u32>,
    /// Reverse map proxy id -> shape handle, kept in lockstep with proxies.
    proxy_to_shape: Vec<u32>,
    gravity: Vec2,
    tuning: Tuning,
    locked: bool,
    events: EventBuffer,
    diagnostics: StepDiagnostics,
    island: Island,
    /// Per-body contact handles, rebuilt each step.
    adjacency: Vec<Vec<u32>>,
    contact_marks: Vec<bool>,
    joint_marks: Vec<bool>,
    contact_filter: Box<dyn ContactFilter>,
    listener: Option<Box<dyn ContactListener>>,
    boundary_listener: Option<Box<dyn BoundaryListener>>,
}

impl World {
    /// World bounded by `world_aabb` with the given gravity.
    pub fn new(world_aabb: Aabb, gravity: Vec2) -> Result<Self, PhysicsError> {
        Self::with_max_proxies(world_aabb, gravity, DEFAULT_MAX_PROXIES)
    }

    /// As [`World::new`] with an explicit broad-phase proxy capacity.
    pub fn with_max_proxies(
        world_aabb: Aabb,
        gravity: Vec2,
        max_proxies: usize,
    ) -> Result<Self, PhysicsError> {
        let broad_phase = BroadPhase::new(world_aabb, max_proxies)?;
        Ok(Self {
            broad_phase,
            bodies: Vec::new(),
            body_free: Vec::new(),
            shapes: Vec::new(),
            shape_free: Vec::new(),
            contacts: Vec::new(),
            contact_free: Vec::new(),
            joints: Vec::new(),
            joint_free: Vec::new(),
            proxy_to_shape: vec![NULL_CONTACT; max_proxies],
            gravity,
            tuning: Tuning::default(),
            locked: false,
            events: EventBuffer::new(),
            diagnostics: StepDiagnostics::default(),
            island: Island::new(),
            adjacency: Vec::new(),
            contact_marks: Vec::new(),
            joint_marks: Vec::new(),
            contact_filter: Box::new(DefaultContactFilter),
            listener: None,
            boundary_listener: None,
        })
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    #[must_use]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn set_tuning(&mut self, tuning: Tuning) {
        self.tuning = tuning;
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_filter = filter;
    }

    pub fn set_boundary_listener(&mut self, listener: Box<dyn BoundaryListener>) {
        self.boundary_listener = Some(listener);
    }

    /// Counters from the most recent step.
    #[must_use]
    pub fn diagnostics(&self) -> &StepDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.contacts.iter().flatten().count()
    }

    // ------------------------------------------------------------------------
    // Body and shape lifecycle
    // ------------------------------------------------------------------------

    fn check_unlocked(&self) -> Result<(), PhysicsError> {
        if self.locked {
            Err(PhysicsError::WorldLocked)
        } else {
            Ok(())
        }
    }

    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyId, PhysicsError> {
        self.check_unlocked()?;
        let body = Body::new(def);
        let handle = if let Some(h) = self.body_free.pop() {
            self.bodies[h as usize] = Some(body);
            h
        } else {
            self.bodies.push(Some(body));
            (self.bodies.len() - 1) as u32
        };
        Ok(BodyId(handle))
    }

    /// Destroy a body along with its shapes and joints.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let (shape_handles, joint_handles) = {
            let body = self.body_ref(id)?;
            (body.shapes.clone(), body.joints.clone())
        };
        for jh in joint_handles {
            // A joint may already be gone if it connected two destroyed
            // bodies
            if self.joints[jh as usize].is_some() {
                self.destroy_joint(JointId(jh))?;
            }
        }
        for sh in shape_handles {
            self.destroy_shape(ShapeId(sh))?;
        }
        self.bodies[id.0 as usize] = None;
        self.body_free.push(id.0);
        Ok(())
    }

    /// Attach a shape to a body and recompute the body's mass properties.
    pub fn create_shape(&mut self, body: BodyId, def: &ShapeDef) -> Result<ShapeId, PhysicsError> {
        self.check_unlocked()?;
        // Settle buffered pair removals before a freed proxy id can be
        // reused; otherwise a remove/add flip-flop on the same id would
        // collapse in the pair manager and keep a stale contact alive.
        self.flush_pairs();
        let xf = *self.body_ref(body)?.transform();

        let mut shape = Shape::new(def, body.0);
        let aabb = shape.kind.compute_aabb(&xf);
        if !self.broad_phase.in_range(&aabb) {
            return Err(PhysicsError::InvalidGeometry {
                reason: "shape created outside the world bounds",
            });
        }

        let handle = if let Some(h) = self.shape_free.pop() {
            h
        } else {
            self.shapes.push(None);
            (self.shapes.len() - 1) as u32
        };
        shape.proxy_id = self.broad_phase.create_proxy(&aabb, handle)?;
        self.proxy_to_shape[shape.proxy_id as usize] = handle;
        self.shapes[handle as usize] = Some(shape);

        if let Some(b) = self.bodies[body.0 as usize].as_mut() {
            b.shapes.push(handle);
        }
        self.recompute_mass(body.0);
        Ok(ShapeId(handle))
    }

    /// Detach and destroy a shape. Contacts involving it are destroyed
    /// immediately; End events for touching ones are delivered with the next
    /// step's events.
    pub fn destroy_shape(&mut self, id: ShapeId) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let shape = self.shapes[id.0 as usize]
            .take()
            .ok_or(PhysicsError::InvalidShape { index: id.0 })?;
        if shape.proxy_id != INVALID_PROXY {
            self.proxy_to_shape[shape.proxy_id as usize] = NULL_CONTACT;
            self.broad_phase.destroy_proxy(shape.proxy_id)?;
            // The freed proxy id must not carry this shape's pairs into a
            // future create_proxy that happens to reuse it.
            self.flush_pairs();
        }
        self.shape_free.push(id.0);
        let body = shape.body_index();
        if let Some(b) = self.bodies[body as usize].as_mut() {
            b.shapes.retain(|&h| h != id.0);
        }
        if self.bodies[body as usize].is_some() {
            self.recompute_mass(body);
        }
        Ok(())
    }

    /// Recompute mass, center, and inertia from the attached shapes, then
    /// refresh each shape's sweep radius about the new center.
    fn recompute_mass(&mut self, body: u32) {
        let Some(b) = self.bodies[body as usize].as_ref() else {
            return;
        };
        let shape_handles = b.shapes.clone();
        let dynamic = b.is_dynamic();

        let mut data = MassData {
            mass: 0.0,
            center: Vec2::ZERO,
            inertia: 0.0,
        };
        if dynamic {
            let mut weighted_center = Vec2::ZERO;
            for &sh in &shape_handles {
                if let Some(shape) = self.shapes[sh as usize].as_ref() {
                    let md = shape.kind.compute_mass(shape.density);
                    data.mass += md.mass;
                    weighted_center += md.center * md.mass;
                    data.inertia += md.inertia;
                }
            }
            if data.mass > 0.0 {
                data.center = weighted_center / data.mass;
            }
        }

        let local_center = {
            let Some(b) = self.bodies[body as usize].as_mut() else {
                return;
            };
            b.set_mass_data(&data);
            b.sweep.local_center
        };
        for &sh in &shape_handles {
            if let Some(shape) = self.shapes[sh as usize].as_mut() {
                shape.sweep_radius = shape.kind.sweep_radius(local_center);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Joint lifecycle
    // ------------------------------------------------------------------------

    pub fn create_joint(&mut self, def: &JointDef) -> Result<JointId, PhysicsError> {
        self.check_unlocked()?;
        let joint = match def {
            JointDef::Distance(d) => {
                self.body_ref(d.body_a)?;
                self.body_ref(d.body_b)?;
                Joint::Distance(DistanceJoint::new(d))
            }
            JointDef::Mouse(d) => {
                let body = self.body_ref(d.body)?;
                Joint::Mouse(MouseJoint::new(d, body))
            }
            JointDef::Revolute(d) => {
                self.body_ref(d.body_a)?;
                self.body_ref(d.body_b)?;
                Joint::Revolute(RevoluteJoint::new(d))
            }
            JointDef::Prismatic(d) => {
                self.body_ref(d.body_a)?;
                self.body_ref(d.body_b)?;
                Joint::Prismatic(PrismaticJoint::new(d))
            }
            JointDef::Pulley(d) => {
                self.body_ref(d.body_a)?;
                self.body_ref(d.body_b)?;
                Joint::Pulley(PulleyJoint::new(d))
            }
            JointDef::Gear(d) => self.build_gear(d)?,
            JointDef::ConstantVolume(d) => {
                if d.bodies.len() < 3 {
                    return Err(PhysicsError::InvalidConfiguration {
                        reason: "constant-volume joint needs at least three bodies",
                    });
                }
                let mut handles = Vec::with_capacity(d.bodies.len());
                let mut centers = Vec::with_capacity(d.bodies.len());
                for &id in &d.bodies {
                    let body = self.body_ref(id)?;
                    centers.push(body.world_center());
                    handles.push(id.0);
                }
                Joint::ConstantVolume(ConstantVolumeJoint::new(handles, &centers))
            }
        };

        let handle = if let Some(h) = self.joint_free.pop() {
            self.joints[h as usize] = Some(joint);
            h
        } else {
            self.joints.push(Some(joint));
            (self.joints.len() - 1) as u32
        };
        let mut members = Vec::new();
        if let Some(j) = self.joints[handle as usize].as_ref() {
            j.for_each_body(|b| members.push(b));
        }
        for b in members {
            if let Some(body) = self.bodies[b as usize].as_mut() {
                body.joints.push(handle);
            }
        }
        Ok(JointId(handle))
    }

    /// Resolve a gear definition into snapshot form: the coupled coordinate
    /// of each referenced joint is measured against its static ground body,
    /// so only fixed world-space data needs to be carried.
    fn build_gear(
        &self,
        def: &crate::joint_extra::GearJointDef,
    ) -> Result<Joint, PhysicsError> {
        let resolve = |id: JointId| -> Result<(u32, GearAxis, f32), PhysicsError> {
            let joint = self
                .joints
                .get(id.0 as usize)
                .and_then(|j| j.as_ref())
                .ok_or(PhysicsError::InvalidJoint { index: id.0 })?;
            match joint {
                Joint::Revolute(r) => {
                    let ground = self.body_ref(BodyId(r.body_a))?;
                    let body = self.body_ref(BodyId(r.body_b))?;
                    if !ground.is_static() {
                        return Err(PhysicsError::InvalidConfiguration {
                            reason: "gear-linked joint must be anchored to a static body",
                        });
                    }
                    let offset = ground.angle() + r.reference_angle;
                    Ok((
                        r.body_b,
                        GearAxis::Angular { offset },
                        body.angle() - offset,
                    ))
                }
                Joint::Prismatic(p) => {
                    let ground = self.body_ref(BodyId(p.body_a))?;
                    let body = self.body_ref(BodyId(p.body_b))?;
                    if !ground.is_static() {
                        return Err(PhysicsError::InvalidConfiguration {
                            reason: "gear-linked joint must be anchored to a static body",
                        });
                    }
                    let axis = ground.world_vector(p.local_axis_a);
                    let ground_anchor = ground.world_point(p.local_anchor_a);
                    let coordinate = axis.dot(body.world_point(p.local_anchor_b) - ground_anchor);
                    Ok((
                        p.body_b,
                        GearAxis::Linear {
                            ground_anchor,
                            axis,
                            local_anchor: p.local_anchor_b,
                        },
                        coordinate,
                    ))
                }
                _ => Err(PhysicsError::InvalidConfiguration {
                    reason: "gear joints couple revolute or prismatic joints",
                }),
            }
        };

        let (body_a, side_a, coord_a) = resolve(def.joint_a)?;
        let (body_b, side_b, coord_b) = resolve(def.joint_b)?;
        let constant = coord_a + def.ratio * coord_b;
        Ok(Joint::Gear(GearJoint::new(
            body_a, body_b, side_a, side_b, def.ratio, constant,
        )))
    }

    pub fn destroy_joint(&mut self, id: JointId) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        let joint = self.joints[id.0 as usize]
            .take()
            .ok_or(PhysicsError::InvalidJoint { index: id.0 })?;
        let mut members = Vec::new();
        joint.for_each_body(|b| members.push(b));
        for b in members {
            if let Some(body) = self.bodies[b as usize].as_mut() {
                body.joints.retain(|&h| h != id.0);
                body.wake_up();
            }
        }
        self.joint_free.push(id.0);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    fn body_ref(&self, id: BodyId) -> Result<&Body, PhysicsError> {
        self.bodies
            .get(id.0 as usize)
            .and_then(|b| b.as_ref())
            .ok_or(PhysicsError::InvalidBody { index: id.0 })
    }

    pub fn body(&self, id: BodyId) -> Result<&Body, PhysicsError> {
        self.body_ref(id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut Body, PhysicsError> {
        self.bodies
            .get_mut(id.0 as usize)
            .and_then(|b| b.as_mut())
            .ok_or(PhysicsError::InvalidBody { index: id.0 })
    }

    pub fn shape(&self, id: ShapeId) -> Result<&Shape, PhysicsError> {
        self.shapes
            .get(id.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or(PhysicsError::InvalidShape { index: id.0 })
    }

    pub fn joint(&self, id: JointId) -> Result<&Joint, PhysicsError> {
        self.joints
            .get(id.0 as usize)
            .and_then(|j| j.as_ref())
            .ok_or(PhysicsError::InvalidJoint { index: id.0 })
    }

    /// Mutable joint access, e.g. to drive a mouse joint's target.
    pub fn joint_mut(&mut self, id: JointId) -> Result<&mut Joint, PhysicsError> {
        self.joints
            .get_mut(id.0 as usize)
            .and_then(|j| j.as_mut())
            .ok_or(PhysicsError::InvalidJoint { index: id.0 })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Shapes whose fat broad-phase AABBs overlap `aabb`.
    pub fn query_aabb(&mut self, aabb: &Aabb) -> Vec<ShapeId> {
        let proxy_to_shape = &self.proxy_to_shape;
        self.broad_phase
            .query_aabb(aabb)
            .into_iter()
            .map(|proxy| proxy_to_shape[proxy as usize])
            .filter(|&handle| handle != NULL_CONTACT)
            .map(ShapeId)
            .collect()
    }

    /// Shapes whose broad-phase AABBs intersect the segment, sorted by hit
    /// fraction along it and capped at the `max_results` nearest.
    pub fn query_segment(
        &mut self,
        segment: &Segment,
        max_lambda: f32,
        max_results: usize,
    ) -> Vec<(f32, ShapeId)> {
        let proxy_to_shape = &self.proxy_to_shape;
        self.broad_phase
            .query_segment(segment, max_lambda, max_results)
            .into_iter()
            .map(|(lambda, proxy)| (lambda, proxy_to_shape[proxy as usize]))
            .filter(|&(_, handle)| handle != NULL_CONTACT)
            .map(|(lambda, handle)| (lambda, ShapeId(handle)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds.
    pub fn step(
        &mut self,
        dt: f32,
        velocity_iterations: u32,
        position_iterations: u32,
    ) -> Result<(), PhysicsError> {
        self.check_unlocked()?;
        self.locked = true;
        let result = self.step_inner(dt, velocity_iterations, position_iterations);
        self.locked = false;

        // Deliver events after unlocking so listeners may mutate the world
        if let Some(listener) = self.listener.as_deref_mut() {
            self.events.drain_to(listener);
        } else {
            self.events.clear();
        }
        result
    }

    fn step_inner(
        &mut self,
        dt: f32,
        velocity_iterations: u32,
        position_iterations: u32,
    ) -> Result<(), PhysicsError> {
        self.diagnostics = StepDiagnostics::default();
        let step = TimeStep::new(dt, velocity_iterations.max(1), position_iterations.max(1));

        self.update_contacts();
        if step.dt > 0.0 {
            self.solve(&step)?;
            if self.tuning.continuous_physics {
                self.solve_toi(&step)?;
            }
        }
        Ok(())
    }

    /// Commit buffered broad-phase pair changes into contact
    /// creation/destruction.
    fn flush_pairs(&mut self) {
        let mut registry = PairRegistry {
            shapes: &self.shapes,
            bodies: &self.bodies,
            joints: &self.joints,
            contacts: &mut self.contacts,
            contact_free: &mut self.contact_free,
            proxy_to_shape: &self.proxy_to_shape,
            filter: self.contact_filter.as_ref(),
            events: &mut self.events,
        };
        self.broad_phase.commit(&mut registry);
    }

    /// Commit buffered pair changes, then run the narrow phase over every
    /// live contact.
    fn update_contacts(&mut self) {
        self.flush_pairs();
        self.diagnostics.pairs = self.broad_phase.pair_manager.pair_count();

        for h in 0..self.contacts.len() {
            let Some(contact) = self.contacts[h].as_mut() else {
                continue;
            };
            let (Some(sa), Some(sb)) = (
                self.shapes[contact.shape_a as usize].as_ref(),
                self.shapes[contact.shape_b as usize].as_ref(),
            ) else {
                continue;
            };
            let (Some(ba), Some(bb)) = (
                self.bodies[contact.body_a as usize].as_ref(),
                self.bodies[contact.body_b as usize].as_ref(),
            ) else {
                continue;
            };

            let idle_a = ba.is_static() || ba.is_sleeping() || ba.is_frozen();
            let idle_b = bb.is_static() || bb.is_sleeping() || bb.is_frozen();
            if idle_a && idle_b {
                continue;
            }

            // Filtering may have changed since the pair was created
            let suppressed = !self.contact_filter.should_collide(sa, sb)
                || ba.joints.iter().any(|&jh| {
                    self.joints[jh as usize].as_ref().is_some_and(|j| {
                        !j.collide_connected() && j.connects(contact.body_a, contact.body_b)
                    })
                });
            if suppressed {
                if contact.is_touching() {
                    contact.emit_end_events(&mut self.events);
                    contact.manifold = Default::default();
                }
                continue;
            }

            let xf_a = *ba.transform();
            let xf_b = *bb.transform();
            contact.evaluate(sa, sb, &xf_a, &xf_b, &self.tuning, &mut self.events);
            self.diagnostics.contacts += 1;
            if contact.is_touching() {
                self.diagnostics.touching_contacts += 1;
            }
        }
    }

    /// Partition awake bodies into islands over touching contacts and
    /// joints, and solve each.
    fn solve(&mut self, step: &TimeStep) -> Result<(), PhysicsError> {
        // Start-of-step sweep baselines
        for body in self.bodies.iter_mut().flatten() {
            body.flags &= !FLAG_ISLAND;
            if body.is_static() || body.is_sleeping() || body.is_frozen() {
                continue;
            }
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            body.sweep.t0 = 0.0;
        }

        // Contact adjacency (all live contacts; touching checked during DFS)
        self.rebuild_adjacency();
        self.contact_marks.clear();
        self.contact_marks.resize(self.contacts.len(), false);
        self.joint_marks.clear();
        self.joint_marks.resize(self.joints.len(), false);

        let mut stack: Vec<u32> = Vec::new();
        for seed in 0..self.bodies.len() {
            let Some(b) = self.bodies[seed].as_ref() else {
                continue;
            };
            if b.flags & FLAG_ISLAND != 0
                || b.is_static()
                || b.is_sleeping()
                || b.is_frozen()
            {
                continue;
            }

            self.island.clear();
            stack.clear();
            stack.push(seed as u32);
            if let Some(b) = self.bodies[seed].as_mut() {
                b.flags |= FLAG_ISLAND;
            }

            while let Some(h) = stack.pop() {
                self.island.bodies.push(h);
                let is_static = self.bodies[h as usize]
                    .as_ref()
                    .is_some_and(|b| b.is_static());
                if is_static {
                    // Statics join islands but never bridge them
                    continue;
                }
                if let Some(b) = self.bodies[h as usize].as_mut() {
                    b.flags &= !FLAG_SLEEP;
                }

                for i in 0..self.adjacency[h as usize].len() {
                    let ch = self.adjacency[h as usize][i];
                    if self.contact_marks[ch as usize] {
                        continue;
                    }
                    let Some(contact) = self.contacts[ch as usize].as_ref() else {
                        continue;
                    };
                    if !contact.is_touching() {
                        continue;
                    }
                    self.contact_marks[ch as usize] = true;
                    let other = if contact.body_a == h {
                        contact.body_b
                    } else {
                        contact.body_a
                    };
                    // A frozen body takes its contacts out of the simulation
                    let frozen = self.bodies[other as usize]
                        .as_ref()
                        .map_or(true, Body::is_frozen);
                    if frozen {
                        continue;
                    }
                    self.island.contacts.push(ch);
                    let add = self.bodies[other as usize].as_mut().map_or(false, |ob| {
                        if ob.flags & FLAG_ISLAND != 0 {
                            false
                        } else {
                            ob.flags |= FLAG_ISLAND;
                            true
                        }
                    });
                    if add {
                        stack.push(other);
                    }
                }

                let joint_handles = self.bodies[h as usize]
                    .as_ref()
                    .map(|b| b.joints.clone())
                    .unwrap_or_default();
                for jh in joint_handles {
                    if self.joint_marks[jh as usize] {
                        continue;
                    }
                    let Some(joint) = self.joints[jh as usize].as_ref() else {
                        continue;
                    };
                    self.joint_marks[jh as usize] = true;
                    let mut others = Vec::new();
                    joint.for_each_body(|ob| {
                        if ob != h {
                            others.push(ob);
                        }
                    });
                    // A joint touching a frozen body stops being solved
                    let any_frozen = others.iter().any(|&ob| {
                        self.bodies[ob as usize]
                            .as_ref()
                            .map_or(true, Body::is_frozen)
                    });
                    if any_frozen {
                        continue;
                    }
                    self.island.joints.push(jh);
                    for other in others {
                        let add = self.bodies[other as usize].as_mut().map_or(false, |ob| {
                            if ob.flags & FLAG_ISLAND != 0 {
                                false
                            } else {
                                ob.flags |= FLAG_ISLAND;
                                true
                            }
                        });
                        if add {
                            stack.push(other);
                        }
                    }
                }
            }

            self.island.solve(
                step,
                self.gravity,
                &self.tuning,
                &mut self.bodies,
                &mut self.contacts,
                &mut self.joints,
            );
            self.diagnostics.islands += 1;

            for i in 0..self.island.bodies.len() {
                let h = self.island.bodies[i] as usize;
                if let Some(b) = self.bodies[h].as_mut() {
                    if b.is_static() {
                        b.flags &= !FLAG_ISLAND;
                    }
                }
            }
        }

        self.synchronize_proxies()
    }

    /// Move every awake body's proxies to its swept AABB; freeze bodies
    /// whose shapes left the world bounds.
    fn synchronize_proxies(&mut self) -> Result<(), PhysicsError> {
        let mut frozen: Vec<u32> = Vec::new();
        for h in 0..self.bodies.len() {
            let Some(b) = self.bodies[h].as_ref() else {
                continue;
            };
            if b.is_static() || b.is_sleeping() || b.is_frozen() {
                continue;
            }
            let xf1 = b.sweep.transform_at(b.sweep.t0);
            let xf2 = *b.transform();
            let shape_handles = b.shapes.clone();

            let mut in_bounds = true;
            for &sh in &shape_handles {
                let Some(shape) = self.shapes[sh as usize].as_ref() else {
                    continue;
                };
                let aabb = shape.kind.compute_swept_aabb(&xf1, &xf2);
                if self.broad_phase.in_range(&aabb) {
                    self.broad_phase.move_proxy(shape.proxy_id, &aabb)?;
                } else {
                    in_bounds = false;
                    break;
                }
            }
            if !in_bounds {
                frozen.push(h as u32);
            }
        }

        for h in frozen {
            self.freeze_body(h)?;
            self.diagnostics.frozen_bodies += 1;
            if let Some(listener) = self.boundary_listener.as_deref_mut() {
                listener.body_out_of_bounds(h);
            }
        }
        Ok(())
    }

    /// Take a runaway body out of the simulation: drop its proxies, zero
    /// its motion, and mark it frozen. Pair removals commit next step.
    fn freeze_body(&mut self, h: u32) -> Result<(), PhysicsError> {
        let shape_handles = match self.bodies[h as usize].as_mut() {
            Some(b) => {
                b.flags |= FLAG_FROZEN;
                b.linear_velocity = Vec2::ZERO;
                b.angular_velocity = 0.0;
                b.force = Vec2::ZERO;
                b.torque = 0.0;
                b.shapes.clone()
            }
            None => return Ok(()),
        };
        for sh in shape_handles {
            if let Some(shape) = self.shapes[sh as usize].as_mut() {
                if shape.proxy_id != INVALID_PROXY {
                    self.proxy_to_shape[shape.proxy_id as usize] = NULL_CONTACT;
                    self.broad_phase.destroy_proxy(shape.proxy_id)?;
                    shape.proxy_id = INVALID_PROXY;
                }
            }
        }
        Ok(())
    }

    /// Per-body handle lists of live contacts.
    fn rebuild_adjacency(&mut self) {
        self.adjacency.resize(self.bodies.len(), Vec::new());
        for list in &mut self.adjacency {
            list.clear();
        }
        for (h, contact) in self.contacts.iter().enumerate() {
            if let Some(c) = contact {
                self.adjacency[c.body_a as usize].push(h as u32);
                self.adjacency[c.body_b as usize].push(h as u32);
            }
        }
    }

    /// Continuous collision: repeatedly advance the earliest-impact contact
    /// pair to its time of impact and solve a small sub-island there.
    fn solve_toi(&mut self, step: &TimeStep) -> Result<(), PhysicsError> {
        // Pairs discovered by this step's swept proxies must become contacts
        // now: a fast body crossing a thin shape buffers the pair during
        // proxy synchronization and would otherwise be past it before the
        // pair ever turned into a contact.
        self.flush_pairs();
        self.rebuild_adjacency();

        // Cached impact times from the previous step are meaningless now
        for contact in self.contacts.iter_mut().flatten() {
            contact.toi = None;
        }
        let max_passes = 4 * self.contacts.len() + 8;
        for _ in 0..max_passes {
            // Earliest unresolved impact
            let mut min_toi = 1.0 - 100.0 * f32::EPSILON;
            let mut min_contact: Option<usize> = None;
            for h in 0..self.contacts.len() {
                let Some(contact) = self.contacts[h].as_ref() else {
                    continue;
                };
                let (ba_h, bb_h) = (contact.body_a as usize, contact.body_b as usize);
                let cached = contact.toi;
                let (sa_h, sb_h) = (contact.shape_a as usize, contact.shape_b as usize);

                let (skip, pair_t0) = {
                    let (Some(ba), Some(bb)) =
                        (self.bodies[ba_h].as_ref(), self.bodies[bb_h].as_ref())
                    else {
                        continue;
                    };
                    let idle_a = ba.is_static() || ba.is_sleeping();
                    let idle_b = bb.is_static() || bb.is_sleeping();
                    let skip = ba.is_frozen()
                        || bb.is_frozen()
                        || (idle_a && idle_b)
                        || (ba.is_dynamic()
                            && bb.is_dynamic()
                            && !ba.is_bullet()
                            && !bb.is_bullet());
                    (skip, ba.sweep.t0.max(bb.sweep.t0))
                };
                if skip {
                    continue;
                }

                let toi = if let Some(t) = cached {
                    t
                } else {
                    // Align the sweeps to a common start time
                    if let Some(b) = self.bodies[ba_h].as_mut() {
                        b.sweep.advance(pair_t0);
                    }
                    if let Some(b) = self.bodies[bb_h].as_mut() {
                        b.sweep.advance(pair_t0);
                    }
                    let (Some(sa), Some(sb)) =
                        (self.shapes[sa_h].as_ref(), self.shapes[sb_h].as_ref())
                    else {
                        continue;
                    };
                    let (Some(ba), Some(bb)) =
                        (self.bodies[ba_h].as_ref(), self.bodies[bb_h].as_ref())
                    else {
                        continue;
                    };
                    let t = time_of_impact(
                        &sa.kind,
                        &ba.sweep,
                        sa.sweep_radius,
                        &sb.kind,
                        &bb.sweep,
                        sb.sweep_radius,
                        &self.tuning,
                    );
                    if let Some(c) = self.contacts[h].as_mut() {
                        c.toi = Some(t);
                    }
                    t
                };

                // A pair overlapping at its own interval start reports an
                // impact time equal to that start: the settled resting case
                // at t0 = 0, or a pair a sub-solve just resolved in place.
                // Both belong to the discrete solver; seeding them would
                // wake resting bodies every step or grind the same impact
                // until the pass cap.
                if toi > pair_t0 + 100.0 * f32::EPSILON && toi < min_toi {
                    min_toi = toi;
                    min_contact = Some(h);
                }
            }

            let Some(seed_contact) = min_contact else {
                break;
            };

            // Advance the impacting pair to the TOI and rebuild its manifold
            let (ba_h, bb_h, sa_h, sb_h) = {
                let Some(c) = self.contacts[seed_contact].as_ref() else {
                    break;
                };
                (c.body_a, c.body_b, c.shape_a, c.shape_b)
            };
            for &bh in &[ba_h, bb_h] {
                if let Some(b) = self.bodies[bh as usize].as_mut() {
                    if !b.is_static() && !b.is_frozen() {
                        b.advance_to(min_toi);
                        b.wake_up();
                    }
                }
            }
            {
                let (Some(sa), Some(sb)) = (
                    self.shapes[sa_h as usize].as_ref(),
                    self.shapes[sb_h as usize].as_ref(),
                ) else {
                    continue;
                };
                let (Some(ba), Some(bb)) = (
                    self.bodies[ba_h as usize].as_ref(),
                    self.bodies[bb_h as usize].as_ref(),
                ) else {
                    continue;
                };
                let xf_a = *ba.transform();
                let xf_b = *bb.transform();
                if let Some(contact) = self.contacts[seed_contact].as_mut() {
                    contact.evaluate(sa, sb, &xf_a, &xf_b, &self.tuning, &mut self.events);
                    contact.toi = None;
                }
            }
            if !self.contacts[seed_contact]
                .as_ref()
                .is_some_and(Contact::is_touching)
            {
                continue;
            }

            // Gather a capped sub-island around the impact
            self.island.clear();
            self.island.contacts.push(seed_contact as u32);
            let mut body_visited = vec![false; self.bodies.len()];
            let mut contact_visited = vec![false; self.contacts.len()];
            contact_visited[seed_contact] = true;
            let mut queue: Vec<u32> = Vec::new();
            for &bh in &[ba_h, bb_h] {
                body_visited[bh as usize] = true;
                self.island.bodies.push(bh);
                let dynamic = self.bodies[bh as usize]
                    .as_ref()
                    .is_some_and(Body::is_dynamic);
                if dynamic {
                    queue.push(bh);
                }
            }

            while let Some(bh) = queue.pop() {
                if self.island.bodies.len() >= self.tuning.max_toi_bodies_per_island {
                    break;
                }
                let contact_handles = self
                    .adjacency
                    .get(bh as usize)
                    .cloned()
                    .unwrap_or_default();
                for ch in contact_handles {
                    if self.island.contacts.len() >= self.tuning.max_toi_contacts_per_island {
                        break;
                    }
                    if contact_visited[ch as usize] {
                        continue;
                    }
                    let Some(contact) = self.contacts[ch as usize].as_ref() else {
                        continue;
                    };
                    if !contact.is_touching() {
                        continue;
                    }
                    contact_visited[ch as usize] = true;
                    let other = if contact.body_a == bh {
                        contact.body_b
                    } else {
                        contact.body_a
                    };
                    let frozen = self.bodies[other as usize]
                        .as_ref()
                        .map_or(true, Body::is_frozen);
                    if frozen {
                        continue;
                    }
                    self.island.contacts.push(ch);
                    if body_visited[other as usize] {
                        continue;
                    }
                    body_visited[other as usize] = true;
                    self.island.bodies.push(other);
                    if let Some(ob) = self.bodies[other as usize].as_mut() {
                        if ob.is_dynamic() && !ob.is_frozen() {
                            if ob.sweep.t0 < min_toi {
                                ob.advance_to(min_toi);
                                ob.wake_up();
                            }
                            queue.push(other);
                        }
                    }
                }
            }

            let sub_step = TimeStep::new(
                (1.0 - min_toi) * step.dt,
                step.velocity_iterations,
                step.position_iterations,
            );
            self.island
                .solve_toi(&sub_step, &self.tuning, &mut self.bodies, &mut self.contacts);
            self.diagnostics.toi_solves += 1;

            // Moved bodies invalidate their proxies and any cached TOIs
            for i in 0..self.island.bodies.len() {
                let bh = self.island.bodies[i];
                let adjacent = self
                    .adjacency
                    .get(bh as usize)
                    .cloned()
                    .unwrap_or_default();
                for ch in adjacent {
                    if let Some(c) = self.contacts[ch as usize].as_mut() {
                        c.toi = None;
                    }
                }
            }
            self.synchronize_toi_island_proxies()?;
        }
        Ok(())
    }

    fn synchronize_toi_island_proxies(&mut self) -> Result<(), PhysicsError> {
        let mut frozen: Vec<u32> = Vec::new();
        for i in 0..self.island.bodies.len() {
            let h = self.island.bodies[i] as usize;
            let Some(b) = self.bodies[h].as_ref() else {
                continue;
            };
            if b.is_static() || b.is_frozen() {
                continue;
            }
            let xf1 = b.sweep.transform_at(b.sweep.t0);
            let xf2 = *b.transform();
            let shape_handles = b.shapes.clone();
            let mut in_bounds = true;
            for &sh in &shape_handles {
                let Some(shape) = self.shapes[sh as usize].as_ref() else {
                    continue;
                };
                let aabb = shape.kind.compute_swept_aabb(&xf1, &xf2);
                if self.broad_phase.in_range(&aabb) {
                    self.broad_phase.move_proxy(shape.proxy_id, &aabb)?;
                } else {
                    in_bounds = false;
                    break;
                }
            }
            if !in_bounds {
                frozen.push(h as u32);
            }
        }
        for h in frozen {
            self.freeze_body(h)?;
            self.diagnostics.frozen_bodies += 1;
            if let Some(listener) = self.boundary_listener.as_deref_mut() {
                listener.body_out_of_bounds(h);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Pair registry
// ============================================================================

/// Bridges broad-phase pair transitions to contact creation/destruction.
struct PairRegistry<'a> {
    shapes: &'a [Option<Shape>],
    bodies: &'a [Option<Body>],
    joints: &'a [Option<Joint>],
    contacts: &'a mut Vec<Option<Contact>>,
    contact_free: &'a mut Vec<u32>,
    proxy_to_shape: &'a [u32],
    filter: &'a dyn ContactFilter,
    events: &'a mut EventBuffer,
}

impl PairCallback for PairRegistry<'_> {
    fn pair_added(&mut self, a: u16, b: u16) -> u32 {
        let sa_h = self.proxy_to_shape[a as usize];
        let sb_h = self.proxy_to_shape[b as usize];
        let (Some(sa), Some(sb)) = (
            self.shapes.get(sa_h as usize).and_then(|s| s.as_ref()),
            self.shapes.get(sb_h as usize).and_then(|s| s.as_ref()),
        ) else {
            return NULL_CONTACT;
        };

        // Shapes on one body never collide with each other
        if sa.body_index() == sb.body_index() {
            return NULL_CONTACT;
        }
        // Two non-dynamic bodies have nothing to resolve
        let (Some(ba), Some(bb)) = (
            self.bodies
                .get(sa.body_index() as usize)
                .and_then(|x| x.as_ref()),
            self.bodies
                .get(sb.body_index() as usize)
                .and_then(|x| x.as_ref()),
        ) else {
            return NULL_CONTACT;
        };
        if !ba.is_dynamic() && !bb.is_dynamic() {
            return NULL_CONTACT;
        }
        // Joint-connected bodies may opt out of collision
        let connected_suppressed = ba.joints.iter().any(|&jh| {
            self.joints[jh as usize].as_ref().is_some_and(|j| {
                !j.collide_connected() && j.connects(sa.body_index(), sb.body_index())
            })
        });
        if connected_suppressed || !self.filter.should_collide(sa, sb) {
            return NULL_CONTACT;
        }

        let contact = Contact::new(sa_h, sb_h, sa, sb);
        if let Some(h) = self.contact_free.pop() {
            self.contacts[h as usize] = Some(contact);
            h
        } else {
            self.contacts.push(Some(contact));
            (self.contacts.len() - 1) as u32
        }
    }

    fn pair_removed(&mut self, _a: u16, _b: u16, user_data: u32) {
        if user_data == NULL_CONTACT {
            return;
        }
        if let Some(contact) = self.contacts[user_data as usize].take() {
            if contact.is_touching() {
                contact.emit_end_events(self.events);
            }
            self.contact_free.push(user_data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;

    const GRAVITY: Vec2 = Vec2 { x: 0.0, y: -10.0 };

    fn test_world() -> World {
        let aabb = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        World::new(aabb, GRAVITY).unwrap()
    }

    fn add_ground(world: &mut World) -> BodyId {
        let ground = world
            .create_body(&BodyDef::static_at(Vec2::new(0.0, -1.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::boxed(50.0, 1.0));
        def.density = 0.0;
        world.create_shape(ground, &def).unwrap();
        ground
    }

    #[test]
    fn test_circle_falls_and_rests_on_ground() {
        let mut world = test_world();
        add_ground(&mut world);
        let ball = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 4.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        world.create_shape(ball, &def).unwrap();

        for _ in 0..180 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        let b = world.body(ball).unwrap();
        // Ground surface at y = 0, so the ball rests at its radius
        assert!(
            (b.position().y - 0.5).abs() < 0.03,
            "y = {}",
            b.position().y
        );
        assert!(b.linear_velocity().length() < 0.05);
    }

    #[test]
    fn test_resting_body_falls_asleep() {
        let mut world = test_world();
        add_ground(&mut world);
        let ball = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 1.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
        def.density = 1.0;
        world.create_shape(ball, &def).unwrap();

        for _ in 0..300 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        assert!(world.body(ball).unwrap().is_sleeping());
    }

    /// A settled contact overlaps at the start of every step. The TOI pass
    /// must not treat that as an impact: sub-solving it would wake the body
    /// each step and starve the sleep timer forever.
    #[test]
    fn test_settled_contact_skips_toi_pass() {
        let mut world = test_world();
        add_ground(&mut world);
        let body = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 0.6)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
        def.density = 1.0;
        world.create_shape(body, &def).unwrap();

        for _ in 0..120 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        assert_eq!(world.diagnostics().toi_solves, 0, "resting pair re-solved");
        assert!(world.body(body).unwrap().is_sleeping());
    }

    /// A sub-solved impact leaves the pair overlapping at its advanced start
    /// time. The next seeding pass must read that as resolved instead of
    /// grinding the same impact until the pass cap runs out.
    #[test]
    fn test_impact_sub_solves_once() {
        let aabb = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        let mut world = World::new(aabb, Vec2::ZERO).unwrap();
        let wall = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();
        world
            .create_shape(wall, &ShapeDef::new(ShapeKind::boxed(0.05, 3.0)))
            .unwrap();
        let mut def = BodyDef::dynamic_at(Vec2::new(-2.0, 0.0));
        def.linear_velocity = Vec2::new(200.0, 0.0);
        let projectile = world.create_body(&def).unwrap();
        let mut shape = ShapeDef::new(ShapeKind::circle(0.2));
        shape.density = 1.0;
        world.create_shape(projectile, &shape).unwrap();

        world.step(1.0 / 60.0, 10, 10).unwrap();
        assert_eq!(world.diagnostics().toi_solves, 1);
        assert!(world.body(projectile).unwrap().position().x < 0.0);
    }

    #[test]
    fn test_stale_handle_errors() {
        let mut world = test_world();
        let body = world.create_body(&BodyDef::dynamic_at(Vec2::ZERO)).unwrap();
        world.destroy_body(body).unwrap();
        assert!(matches!(
            world.destroy_body(body),
            Err(PhysicsError::InvalidBody { .. })
        ));
        assert!(world.body(body).is_err());
    }

    #[test]
    fn test_query_aabb_finds_shape() {
        let mut world = test_world();
        let body = world
            .create_body(&BodyDef::static_at(Vec2::new(3.0, 3.0)))
            .unwrap();
        let shape = world
            .create_shape(body, &ShapeDef::new(ShapeKind::boxed(1.0, 1.0)))
            .unwrap();

        let hits = world.query_aabb(&Aabb::new(Vec2::new(2.0, 2.0), Vec2::new(4.0, 4.0)));
        assert_eq!(hits, vec![shape]);
        let misses = world.query_aabb(&Aabb::new(Vec2::new(20.0, 20.0), Vec2::new(21.0, 21.0)));
        assert!(misses.is_empty());
    }

    #[test]
    fn test_distance_joint_pendulum_keeps_length() {
        let mut world = test_world();
        let anchor = world
            .create_body(&BodyDef::static_at(Vec2::new(0.0, 10.0)))
            .unwrap();
        let bob = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(3.0, 10.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.2));
        def.density = 1.0;
        world.create_shape(bob, &def).unwrap();

        let mut jdef = crate::joint::DistanceJointDef::new(anchor, bob);
        jdef.length = 3.0;
        world.create_joint(&JointDef::Distance(jdef)).unwrap();

        for _ in 0..120 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        let p = world.body(bob).unwrap().position();
        let len = (p - Vec2::new(0.0, 10.0)).length();
        assert!((len - 3.0).abs() < 0.05, "len = {len}");
    }

    #[test]
    fn test_escaping_body_is_frozen_and_reported() {
        struct Watcher(std::rc::Rc<std::cell::Cell<u32>>);
        impl BoundaryListener for Watcher {
            fn body_out_of_bounds(&mut self, _body: u32) {
                self.0.set(self.0.get() + 1);
            }
        }

        let aabb = Aabb::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
        let mut world = World::new(aabb, Vec2::ZERO).unwrap();
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        world.set_boundary_listener(Box::new(Watcher(count.clone())));

        let mut bdef = BodyDef::dynamic_at(Vec2::ZERO);
        bdef.linear_velocity = Vec2::new(100.0, 0.0);
        bdef.allow_sleep = false;
        let runaway = world.create_body(&bdef).unwrap();
        let mut sdef = ShapeDef::new(ShapeKind::circle(0.5));
        sdef.density = 1.0;
        world.create_shape(runaway, &sdef).unwrap();

        for _ in 0..30 {
            world.step(1.0 / 60.0, 4, 4).unwrap();
        }
        assert!(world.body(runaway).unwrap().is_frozen());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_shape_recreate_ends_old_contact() {
        struct Ends(std::rc::Rc<std::cell::Cell<usize>>);
        impl ContactListener for Ends {
            fn end_contact(&mut self, _e: &crate::event::ContactEvent) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut world = test_world();
        add_ground(&mut world);
        let ends = std::rc::Rc::new(std::cell::Cell::new(0));
        world.set_contact_listener(Box::new(Ends(ends.clone())));

        let first = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 0.4)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        let shape = world.create_shape(first, &def).unwrap();
        world.step(1.0 / 60.0, 4, 4).unwrap();
        assert!(world.diagnostics().touching_contacts >= 1);

        // Recreate at the same spot on a different body. The freed proxy and
        // shape slots get reused and must read as a fresh overlap: the old
        // contact ends, and the new one binds to the new body.
        world.destroy_shape(shape).unwrap();
        let second = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 0.4)))
            .unwrap();
        world.create_shape(second, &def).unwrap();
        world.step(1.0 / 60.0, 4, 4).unwrap();
        assert!(ends.get() >= 1, "old contact never ended");

        for _ in 0..30 {
            world.step(1.0 / 60.0, 4, 4).unwrap();
        }
        let y = world.body(second).unwrap().position().y;
        assert!((y - 0.5).abs() < 0.1, "y = {y}");
    }

    #[test]
    fn test_joint_connected_bodies_do_not_collide() {
        let mut world = test_world();
        let a = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 5.0)))
            .unwrap();
        let b = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.5, 5.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        world.create_shape(a, &def).unwrap();
        world.create_shape(b, &def).unwrap();

        let mut jdef = crate::joint::DistanceJointDef::new(a, b);
        jdef.length = 0.5;
        jdef.collide_connected = false;
        world.create_joint(&JointDef::Distance(jdef)).unwrap();

        world.step(1.0 / 60.0, 4, 4).unwrap();
        assert_eq!(world.diagnostics().touching_contacts, 0);
    }

    #[test]
    fn test_diagnostics_track_contacts() {
        let mut world = test_world();
        add_ground(&mut world);
        let ball = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 0.4)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        world.create_shape(ball, &def).unwrap();

        world.step(1.0 / 60.0, 4, 4).unwrap();
        let d = world.diagnostics();
        assert!(d.pairs >= 1);
        assert!(d.touching_contacts >= 1);
        assert_eq!(d.islands, 1);
    }
}
