//! Solver Islands
//!
//! The world partitions awake bodies into islands (connected components over
//! touching contacts and joints) and solves each island independently. The
//! island copies body state into dense position/velocity arrays, runs the
//! velocity and position iterations against those, and writes the results
//! back — the solvers never chase body handles mid-iteration.
//!
//! Sleep is decided per island: every body must stay below the motion
//! tolerances for the full sleep delay before the island is put to sleep,
//! so one restless body keeps its whole island awake.
//!
//! Author: Moroya Sakamoto

use crate::body::{Body, FLAG_ALLOW_SLEEP};
use crate::contact::Contact;
use crate::contact_solver::ContactSolver;
use crate::joint::Joint;
use crate::math::{clamp, Vec2};
use crate::settings::Tuning;

/// Simulation step parameters.
#[derive(Clone, Copy, Debug)]
pub struct TimeStep {
    /// Step duration (seconds).
    pub dt: f32,
    /// Inverse duration; zero for a zero-length step.
    pub inv_dt: f32,
    /// Solver velocity iterations.
    pub velocity_iterations: u32,
    /// Solver position iterations.
    pub position_iterations: u32,
}

impl TimeStep {
    /// Step of length `dt` with the given iteration counts.
    #[must_use]
    pub fn new(dt: f32, velocity_iterations: u32, position_iterations: u32) -> Self {
        Self {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            velocity_iterations,
            position_iterations,
        }
    }
}

/// Center-of-mass position state in the island arrays.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Velocity state in the island arrays.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Per-body mass data snapshot for the joint solvers.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SolverBody {
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub local_center: Vec2,
}

/// Shared state handed to the joint solvers.
pub(crate) struct SolverContext<'a> {
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
    pub bodies: &'a [SolverBody],
    pub dt: f32,
    pub inv_dt: f32,
    pub tuning: &'a Tuning,
    /// Whether accumulated joint impulses are applied up front.
    pub warm_start: bool,
}

/// One connected component of the contact/joint graph.
#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<u32>,
    pub contacts: Vec<u32>,
    pub joints: Vec<u32>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    solver_bodies: Vec<SolverBody>,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Copy body state into the island arrays, integrating forces and
    /// gravity for dynamic bodies.
    fn load_bodies(&mut self, bodies: &mut [Option<Body>], gravity: Vec2, dt: f32) {
        self.positions.clear();
        self.velocities.clear();
        self.solver_bodies.clear();

        for (i, &handle) in self.bodies.iter().enumerate() {
            let Some(b) = bodies[handle as usize].as_mut() else {
                continue;
            };
            b.island_index = i as u32;

            if b.is_dynamic() && dt > 0.0 {
                b.linear_velocity += (gravity + b.force * b.inv_mass) * dt;
                b.angular_velocity += dt * b.inv_inertia * b.torque;
                // Damping as a velocity decay, clamped to stay stable for
                // any dt
                b.linear_velocity = b.linear_velocity * clamp(1.0 - dt * b.linear_damping, 0.0, 1.0);
                b.angular_velocity *= clamp(1.0 - dt * b.angular_damping, 0.0, 1.0);
            }

            self.positions.push(Position {
                c: b.sweep.c,
                a: b.sweep.a,
            });
            self.velocities.push(Velocity {
                v: b.linear_velocity,
                w: b.angular_velocity,
            });
            self.solver_bodies.push(SolverBody {
                inv_mass: b.inv_mass,
                inv_inertia: b.inv_inertia,
                local_center: b.sweep.local_center,
            });
        }
    }

    /// Write island state back to the bodies and rebuild their transforms.
    fn store_bodies(&self, bodies: &mut [Option<Body>]) {
        for (i, &handle) in self.bodies.iter().enumerate() {
            let Some(b) = bodies[handle as usize].as_mut() else {
                continue;
            };
            if b.is_static() {
                continue;
            }
            b.sweep.c = self.positions[i].c;
            b.sweep.a = self.positions[i].a;
            b.linear_velocity = self.velocities[i].v;
            b.angular_velocity = self.velocities[i].w;
            b.force = Vec2::ZERO;
            b.torque = 0.0;
            b.synchronize_transform();
        }
    }

    /// Full solve: forces, contacts, joints, integration, position
    /// correction, and sleep accounting.
    pub fn solve(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        tuning: &Tuning,
        bodies: &mut [Option<Body>],
        contacts: &mut [Option<Contact>],
        joints: &mut [Option<Joint>],
    ) {
        self.load_bodies(bodies, gravity, step.dt);

        let mut contact_solver =
            ContactSolver::new(&self.contacts, contacts, bodies, &self.velocities, tuning);
        contact_solver.warm_start(&mut self.velocities);

        for &handle in &self.joints {
            if let Some(joint) = joints[handle as usize].as_mut() {
                joint.assign_island_indices(bodies);
                let mut ctx = SolverContext {
                    positions: &mut self.positions,
                    velocities: &mut self.velocities,
                    bodies: &self.solver_bodies,
                    dt: step.dt,
                    inv_dt: step.inv_dt,
                    tuning,
                    warm_start: true,
                };
                joint.init_velocity_constraints(&mut ctx);
            }
        }

        for _ in 0..step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
            for &handle in &self.joints {
                if let Some(joint) = joints[handle as usize].as_mut() {
                    let mut ctx = SolverContext {
                        positions: &mut self.positions,
                        velocities: &mut self.velocities,
                        bodies: &self.solver_bodies,
                        dt: step.dt,
                        inv_dt: step.inv_dt,
                        tuning,
                        warm_start: true,
                    };
                    joint.solve_velocity_constraints(&mut ctx);
                }
            }
        }

        // Integrate positions
        for i in 0..self.positions.len() {
            self.positions[i].c += self.velocities[i].v * step.dt;
            self.positions[i].a += self.velocities[i].w * step.dt;
        }

        // Position correction
        for _ in 0..step.position_iterations {
            let contacts_ok = contact_solver.solve_position_constraints(
                &mut self.positions,
                tuning.baumgarte,
                -3.0 * tuning.linear_slop,
                tuning,
            );
            let mut joints_ok = true;
            for &handle in &self.joints {
                if let Some(joint) = joints[handle as usize].as_mut() {
                    let mut ctx = SolverContext {
                        positions: &mut self.positions,
                        velocities: &mut self.velocities,
                        bodies: &self.solver_bodies,
                        dt: step.dt,
                        inv_dt: step.inv_dt,
                        tuning,
                        warm_start: true,
                    };
                    joints_ok &= joint.solve_position_constraints(&mut ctx);
                }
            }
            if contacts_ok && joints_ok {
                break;
            }
        }

        contact_solver.store_impulses(contacts);
        self.store_bodies(bodies);

        if tuning.allow_sleep {
            self.update_sleep(step.dt, tuning, bodies);
        }
    }

    /// Reduced solve used for TOI sub-islands: no force integration, no
    /// warm starting (manifolds were just rebuilt at the impact time), and a
    /// stiffer position correction over the remaining sub-step.
    pub fn solve_toi(
        &mut self,
        step: &TimeStep,
        tuning: &Tuning,
        bodies: &mut [Option<Body>],
        contacts: &mut [Option<Contact>],
    ) {
        self.load_bodies(bodies, Vec2::ZERO, 0.0);

        let mut contact_solver =
            ContactSolver::new(&self.contacts, contacts, bodies, &self.velocities, tuning);
        contact_solver.zero_impulses();

        for _ in 0..step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        for i in 0..self.positions.len() {
            self.positions[i].c += self.velocities[i].v * step.dt;
            self.positions[i].a += self.velocities[i].w * step.dt;
        }

        for _ in 0..step.position_iterations {
            if contact_solver.solve_position_constraints(
                &mut self.positions,
                tuning.toi_baumgarte,
                -1.5 * tuning.linear_slop,
                tuning,
            ) {
                break;
            }
        }

        contact_solver.store_impulses(contacts);
        self.store_bodies(bodies);
    }

    fn update_sleep(&self, dt: f32, tuning: &Tuning, bodies: &mut [Option<Body>]) {
        let lin_tol_sqr = tuning.linear_sleep_tolerance * tuning.linear_sleep_tolerance;
        let ang_tol_sqr = tuning.angular_sleep_tolerance * tuning.angular_sleep_tolerance;

        let mut min_sleep_time = f32::MAX;
        for &handle in &self.bodies {
            let Some(b) = bodies[handle as usize].as_mut() else {
                continue;
            };
            if !b.is_dynamic() {
                continue;
            }
            let restless = b.flags & FLAG_ALLOW_SLEEP == 0
                || b.angular_velocity * b.angular_velocity > ang_tol_sqr
                || b.linear_velocity.length_squared() > lin_tol_sqr;
            if restless {
                b.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                b.sleep_time += dt;
                min_sleep_time = min_sleep_time.min(b.sleep_time);
            }
        }

        if min_sleep_time >= tuning.time_to_sleep {
            for &handle in &self.bodies {
                if let Some(b) = bodies[handle as usize].as_mut() {
                    if b.is_dynamic() {
                        b.put_to_sleep();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::event::EventBuffer;
    use crate::shape::{Shape, ShapeDef, ShapeKind};

    const GRAVITY: Vec2 = Vec2 { x: 0.0, y: -10.0 };

    /// Hand-built micro-world: one ground box, one falling box, a contact
    /// re-evaluated each step, one island. The box must land and sleep.
    #[test]
    fn test_box_lands_and_sleeps() {
        let tuning = Tuning::default();
        let step = TimeStep::new(1.0 / 60.0, 10, 10);

        let mut ground_def = ShapeDef::new(ShapeKind::boxed(10.0, 1.0));
        ground_def.density = 0.0;
        let ground_shape = Shape::new(&ground_def, 0);
        let mut box_def = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
        box_def.density = 1.0;
        let box_shape = Shape::new(&box_def, 1);

        let mut ground = Body::new(&BodyDef::static_at(Vec2::ZERO));
        ground.set_mass_data(&ground_shape.kind.compute_mass(0.0));
        let mut faller = Body::new(&BodyDef::dynamic_at(Vec2::new(0.0, 3.0)));
        faller.set_mass_data(&box_shape.kind.compute_mass(1.0));

        let mut bodies = vec![Some(ground), Some(faller)];
        let mut contacts: Vec<Option<Contact>> =
            vec![Some(Contact::new(0, 1, &ground_shape, &box_shape))];
        let mut joints: Vec<Option<Joint>> = Vec::new();
        let mut events = EventBuffer::new();

        let mut island = Island::new();
        let mut slept = false;
        for _ in 0..240 {
            // Narrow phase at current transforms
            {
                let (a, b) = {
                    let xf_a = *bodies[0].as_ref().unwrap().transform();
                    let xf_b = *bodies[1].as_ref().unwrap().transform();
                    (xf_a, xf_b)
                };
                contacts[0].as_mut().unwrap().evaluate(
                    &ground_shape,
                    &box_shape,
                    &a,
                    &b,
                    &tuning,
                    &mut events,
                );
                events.clear();
            }

            if bodies[1].as_ref().unwrap().is_sleeping() {
                slept = true;
                break;
            }

            // Advance sweeps like the world does before solving
            for body in bodies.iter_mut().flatten() {
                body.sweep.c0 = body.sweep.c;
                body.sweep.a0 = body.sweep.a;
                body.sweep.t0 = 0.0;
            }

            island.clear();
            island.bodies.extend([0, 1]);
            island.contacts.push(0);
            island.solve(&step, GRAVITY, &tuning, &mut bodies, &mut contacts, &mut joints);
        }

        assert!(slept, "box never fell asleep");
        let resting = bodies[1].as_ref().unwrap();
        // Resting height: ground top (1.0) + half extent (0.5), within slop
        assert!(
            (resting.position().y - 1.5).abs() < 0.03,
            "y = {}",
            resting.position().y
        );
        assert_eq!(resting.linear_velocity(), Vec2::ZERO);
    }

    /// Gravity integration and damping happen in load_bodies.
    #[test]
    fn test_velocity_integration_with_damping() {
        let tuning = Tuning::default();
        let step = TimeStep::new(0.1, 1, 1);

        let mut def = BodyDef::dynamic_at(Vec2::ZERO);
        def.linear_damping = 1.0;
        def.linear_velocity = Vec2::new(10.0, 0.0);
        let mut body = Body::new(&def);
        body.set_mass_data(&ShapeKind::circle(1.0).compute_mass(1.0));

        let mut bodies = vec![Some(body)];
        let mut contacts: Vec<Option<Contact>> = Vec::new();
        let mut joints: Vec<Option<Joint>> = Vec::new();

        let mut island = Island::new();
        island.bodies.push(0);
        island.solve(
            &step,
            GRAVITY,
            &tuning,
            &mut bodies,
            &mut contacts,
            &mut joints,
        );

        let b = bodies[0].as_ref().unwrap();
        // v_x = 10 * (1 - dt*damping) = 9; v_y = -10*dt * (1 - dt*damping)
        assert!((b.linear_velocity().x - 9.0).abs() < 1e-4);
        assert!((b.linear_velocity().y + 0.9).abs() < 1e-4);
        // Position integrated with the damped velocity
        assert!((b.position().x - 0.9).abs() < 1e-4);
    }

    /// A restless body keeps the whole island awake.
    #[test]
    fn test_one_mover_blocks_island_sleep() {
        let tuning = Tuning::default();
        let step = TimeStep::new(1.0 / 60.0, 1, 1);

        let mut quiet = Body::new(&BodyDef::dynamic_at(Vec2::ZERO));
        quiet.set_mass_data(&ShapeKind::circle(0.5).compute_mass(1.0));
        let mut mover = Body::new(&BodyDef::dynamic_at(Vec2::new(5.0, 0.0)));
        mover.set_mass_data(&ShapeKind::circle(0.5).compute_mass(1.0));
        mover.linear_velocity = Vec2::new(3.0, 0.0);

        let mut bodies = vec![Some(quiet), Some(mover)];
        let mut contacts: Vec<Option<Contact>> = Vec::new();
        let mut joints: Vec<Option<Joint>> = Vec::new();

        let mut island = Island::new();
        island.bodies.extend([0, 1]);

        // No gravity so the quiet body stays quiet
        for _ in 0..120 {
            island.solve(
                &step,
                Vec2::ZERO,
                &tuning,
                &mut bodies,
                &mut contacts,
                &mut joints,
            );
        }
        assert!(!bodies[0].as_ref().unwrap().is_sleeping());
        assert!(!bodies[1].as_ref().unwrap().is_sleeping());
    }
}
