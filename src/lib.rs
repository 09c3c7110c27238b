//! # rigid2d
//!
//! **2D Real-Time Rigid-Body Physics**
//!
//! A Rust library providing a complete 2D physics engine: quantized
//! sweep-and-prune broad phase, SAT/GJK narrow phase, a sequential-impulse
//! constraint solver with islands and sleeping, seven joint types, and
//! conservative-advancement continuous collision for fast bodies.
//!
//! ## Features
//!
//! | Stage | Technique | Cost |
//! |-------|-----------|------|
//! | **Broad phase** | Quantized sweep-and-prune with stabbing counts | O(moved) per step |
//! | **Narrow phase** | SAT clipping (polygons), GJK distance (TOI) | O(pairs) |
//! | **Solver** | Sequential impulses, warm started, per island | O(contacts × iters) |
//! | **Sleeping** | Per-island low-motion timers | O(bodies) |
//! | **Continuous** | Conservative advancement + sub-step solve | only for bullets |
//!
//! ## Design Principles
//!
//! - **Deterministic**: same inputs, same step order, same results
//! - **Arena-Based**: bodies, shapes, contacts, and joints live in generational
//!   slots addressed by copyable handles
//! - **Event-Buffered**: contact begin/persist/end callbacks fire after the
//!   step, when the world is safe to mutate again
//! - **Bounded**: the broad phase, manifolds, and TOI islands all have fixed
//!   upper bounds, so a step never allocates without limit
//!
//! ## Quick Start
//!
//! ```rust
//! use rigid2d::prelude::*;
//!
//! # fn main() -> Result<(), PhysicsError> {
//! let bounds = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
//! let mut world = World::new(bounds, Vec2::new(0.0, -10.0))?;
//!
//! // Static ground
//! let ground = world.create_body(&BodyDef::static_at(Vec2::new(0.0, -1.0)))?;
//! world.create_shape(ground, &ShapeDef::new(ShapeKind::boxed(50.0, 1.0)))?;
//!
//! // Falling ball
//! let ball = world.create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 4.0)))?;
//! let mut ball_shape = ShapeDef::new(ShapeKind::circle(0.5));
//! ball_shape.density = 1.0;
//! world.create_shape(ball, &ball_shape)?;
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0, 10, 10)?;
//! }
//! assert!(world.body(ball)?.position().y < 4.0);
//! # Ok(())
//! # }
//! ```

pub mod aabb;
pub mod body;
pub mod broad_phase;
pub mod collide;
pub mod collide_edge;
pub mod contact;
mod contact_solver;
pub mod distance;
pub mod error;
pub mod event;
pub mod filter;
mod island;
pub mod joint;
pub mod joint_extra;
pub mod math;
pub mod pair_manager;
pub mod settings;
pub mod shape;
pub mod toi;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aabb::{Aabb, Segment};
    pub use crate::body::{Body, BodyDef, BodyType};
    pub use crate::error::PhysicsError;
    pub use crate::event::{
        BoundaryListener, ContactEvent, ContactEventKind, ContactFilter, ContactListener,
    };
    pub use crate::filter::Filter;
    pub use crate::joint::{DistanceJointDef, Joint, JointDef, MouseJointDef};
    pub use crate::joint_extra::{
        ConstantVolumeJointDef, GearJointDef, PrismaticJointDef, PulleyJointDef,
        RevoluteJointDef,
    };
    pub use crate::math::{Mat22, Transform, Vec2};
    pub use crate::settings::Tuning;
    pub use crate::shape::{MassData, Shape, ShapeDef, ShapeKind};
    pub use crate::world::{BodyId, JointId, ShapeId, StepDiagnostics, World};
}

// Re-export main types at crate root
pub use prelude::*;

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn bounded_world() -> World {
        let bounds = Aabb::new(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0));
        World::new(bounds, Vec2::new(0.0, -10.0)).unwrap()
    }

    #[test]
    fn test_small_stack_settles() {
        let mut world = bounded_world();
        let ground = world
            .create_body(&BodyDef::static_at(Vec2::new(0.0, -1.0)))
            .unwrap();
        world
            .create_shape(ground, &ShapeDef::new(ShapeKind::boxed(20.0, 1.0)))
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let body = world
                .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 0.55 + 1.1 * i as f32)))
                .unwrap();
            let mut def = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
            def.density = 1.0;
            def.friction = 0.5;
            world.create_shape(body, &def).unwrap();
            ids.push(body);
        }

        for _ in 0..240 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }

        // Each box rests roughly a box height above the one below
        for (i, &id) in ids.iter().enumerate() {
            let y = world.body(id).unwrap().position().y;
            let expected = 0.5 + 1.0 * i as f32;
            assert!(
                (y - expected).abs() < 0.1,
                "box {i}: y = {y}, expected ~{expected}"
            );
        }
    }

    #[test]
    fn test_mouse_joint_drags_body() {
        let mut world = bounded_world();
        world.set_gravity(Vec2::ZERO);

        let body = world.create_body(&BodyDef::dynamic_at(Vec2::ZERO)).unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        world.create_shape(body, &def).unwrap();

        let mut jdef = MouseJointDef::new(body, Vec2::ZERO);
        jdef.max_force = 1000.0;
        let joint = world.create_joint(&JointDef::Mouse(jdef)).unwrap();

        let target = Vec2::new(4.0, 2.0);
        if let Joint::Mouse(m) = world.joint_mut(joint).unwrap() {
            m.set_target(target);
        }
        for _ in 0..120 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        let p = world.body(body).unwrap().position();
        assert!((p - target).length() < 0.1, "p = {p:?}");
    }
}
