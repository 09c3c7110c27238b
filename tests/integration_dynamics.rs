//! Integration tests for rigid2d
//!
//! These tests exercise end-to-end behaviour of the engine through the public
//! API re-exported from the crate root: stepping, stacking, sleeping, joints,
//! continuous collision, and event delivery.

use std::cell::Cell;
use std::rc::Rc;

use rigid2d::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

const DT: f32 = 1.0 / 60.0;

fn world_with_gravity(gravity: Vec2) -> World {
    let bounds = Aabb::new(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0));
    World::new(bounds, gravity).unwrap()
}

fn standard_world() -> World {
    world_with_gravity(Vec2::new(0.0, -10.0))
}

/// Static ground slab with its top surface at y = 0.
fn add_ground(world: &mut World) -> BodyId {
    let ground = world
        .create_body(&BodyDef::static_at(Vec2::new(0.0, -1.0)))
        .unwrap();
    world
        .create_shape(ground, &ShapeDef::new(ShapeKind::boxed(50.0, 1.0)))
        .unwrap();
    ground
}

fn add_dynamic_box(world: &mut World, position: Vec2, half_extent: f32) -> BodyId {
    let body = world.create_body(&BodyDef::dynamic_at(position)).unwrap();
    let mut def = ShapeDef::new(ShapeKind::boxed(half_extent, half_extent));
    def.density = 1.0;
    def.friction = 0.5;
    world.create_shape(body, &def).unwrap();
    body
}

fn run_world(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 10, 10).unwrap();
    }
}

// ============================================================================
// Test 1 — Free-fall determinism
// ============================================================================

/// Running the same simulation twice must produce bit-exact results.
#[test]
fn test_free_fall_determinism() {
    fn simulate() -> Vec2 {
        let mut world = standard_world();
        add_ground(&mut world);
        let body = add_dynamic_box(&mut world, Vec2::new(0.3, 8.0), 0.5);
        run_world(&mut world, 120);
        world.body(body).unwrap().position()
    }

    let p1 = simulate();
    let p2 = simulate();
    assert_eq!(p1.x.to_bits(), p2.x.to_bits(), "x diverged");
    assert_eq!(p1.y.to_bits(), p2.y.to_bits(), "y diverged");
}

// ============================================================================
// Test 2 — Stacking and sleeping
// ============================================================================

/// A three-box stack must come to rest at the right heights and fall asleep.
#[test]
fn test_stack_rests_and_sleeps() {
    let mut world = standard_world();
    add_ground(&mut world);

    let mut boxes = Vec::new();
    for i in 0..3 {
        boxes.push(add_dynamic_box(
            &mut world,
            Vec2::new(0.0, 0.55 + 1.1 * i as f32),
            0.5,
        ));
    }

    run_world(&mut world, 420);

    for (i, &id) in boxes.iter().enumerate() {
        let body = world.body(id).unwrap();
        let expected = 0.5 + 1.0 * i as f32;
        assert!(
            (body.position().y - expected).abs() < 0.1,
            "box {i}: y = {}",
            body.position().y
        );
        assert!(body.is_sleeping(), "box {i} never slept");
    }
}

// ============================================================================
// Test 3 — Continuous collision vs. a thin wall
// ============================================================================

/// A fast body must stop at a thin static wall instead of tunneling. With
/// continuous collision disabled the same setup tunnels straight through,
/// which is what makes the first half meaningful.
#[test]
fn test_fast_body_stops_at_thin_wall() {
    fn launch(continuous: bool) -> f32 {
        let mut world = world_with_gravity(Vec2::ZERO);
        let mut tuning = *world.tuning();
        tuning.continuous_physics = continuous;
        world.set_tuning(tuning);

        let wall = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();
        world
            .create_shape(wall, &ShapeDef::new(ShapeKind::boxed(0.05, 3.0)))
            .unwrap();

        let mut def = BodyDef::dynamic_at(Vec2::new(-5.0, 0.0));
        def.linear_velocity = Vec2::new(200.0, 0.0);
        def.allow_sleep = false;
        let projectile = world.create_body(&def).unwrap();
        let mut shape = ShapeDef::new(ShapeKind::circle(0.2));
        shape.density = 1.0;
        world.create_shape(projectile, &shape).unwrap();

        run_world(&mut world, 30);
        world.body(projectile).unwrap().position().x
    }

    let stopped_x = launch(true);
    assert!(stopped_x < 0.0, "projectile tunneled: x = {stopped_x}");

    let tunneled_x = launch(false);
    assert!(
        tunneled_x > 1.0,
        "discrete stepping unexpectedly caught the wall: x = {tunneled_x}"
    );
}

// ============================================================================
// Test 4 — Islands do not bridge through static bodies
// ============================================================================

/// Two piles resting on one shared ground must solve as separate islands.
#[test]
fn test_islands_split_across_static_ground() {
    let mut world = standard_world();
    add_ground(&mut world);
    add_dynamic_box(&mut world, Vec2::new(-5.0, 0.45), 0.5);
    add_dynamic_box(&mut world, Vec2::new(5.0, 0.45), 0.5);

    world.step(DT, 10, 10).unwrap();
    assert_eq!(world.diagnostics().islands, 2);
}

// ============================================================================
// Test 5 — Contact event lifecycle
// ============================================================================

#[derive(Default)]
struct Counts {
    begins: Cell<u32>,
    persists: Cell<u32>,
    ends: Cell<u32>,
}

struct Recorder(Rc<Counts>);

impl ContactListener for Recorder {
    fn begin_contact(&mut self, _event: &ContactEvent) {
        self.0.begins.set(self.0.begins.get() + 1);
    }
    fn persist_contact(&mut self, _event: &ContactEvent) {
        self.0.persists.set(self.0.persists.get() + 1);
    }
    fn end_contact(&mut self, _event: &ContactEvent) {
        self.0.ends.set(self.0.ends.get() + 1);
    }
}

/// Begin fires when a manifold point appears, persist while it lives, and
/// end when the pair is destroyed.
#[test]
fn test_contact_event_lifecycle() {
    let mut world = standard_world();
    let counts = Rc::new(Counts::default());
    world.set_contact_listener(Box::new(Recorder(counts.clone())));

    add_ground(&mut world);
    let ball = world
        .create_body(&BodyDef::dynamic_at(Vec2::new(0.0, 2.0)))
        .unwrap();
    let mut def = ShapeDef::new(ShapeKind::circle(0.5));
    def.density = 1.0;
    world.create_shape(ball, &def).unwrap();

    run_world(&mut world, 120);
    assert!(counts.begins.get() >= 1, "no begin event");
    assert!(counts.persists.get() >= 1, "no persist events");

    // Destroying the body removes the pair, which must emit the end event
    world.destroy_body(ball).unwrap();
    world.step(DT, 10, 10).unwrap();
    assert!(counts.ends.get() >= 1, "no end event");
}

// ============================================================================
// Test 6 — Revolute motor
// ============================================================================

/// A motorized revolute joint drives the wheel to the requested speed.
#[test]
fn test_revolute_motor_reaches_speed() {
    let mut world = world_with_gravity(Vec2::ZERO);
    let base = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();
    let wheel = world.create_body(&BodyDef::dynamic_at(Vec2::ZERO)).unwrap();
    let mut def = ShapeDef::new(ShapeKind::circle(0.5));
    def.density = 1.0;
    world.create_shape(wheel, &def).unwrap();

    let mut jdef = RevoluteJointDef::new(base, wheel);
    jdef.enable_motor = true;
    jdef.motor_speed = 2.0;
    jdef.max_motor_torque = 1000.0;
    world.create_joint(&JointDef::Revolute(jdef)).unwrap();

    run_world(&mut world, 60);
    let w = world.body(wheel).unwrap().angular_velocity();
    assert!((w - 2.0).abs() < 0.05, "w = {w}");
}

// ============================================================================
// Test 7 — Prismatic limit
// ============================================================================

/// A slider launched along its axis must be stopped by the upper limit.
#[test]
fn test_prismatic_limit_clamps_travel() {
    let mut world = world_with_gravity(Vec2::ZERO);
    let frame = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();

    let mut bdef = BodyDef::dynamic_at(Vec2::ZERO);
    bdef.linear_velocity = Vec2::new(5.0, 0.0);
    bdef.allow_sleep = false;
    let slider = world.create_body(&bdef).unwrap();
    let mut sdef = ShapeDef::new(ShapeKind::boxed(0.3, 0.3));
    sdef.density = 1.0;
    world.create_shape(slider, &sdef).unwrap();

    let mut jdef = PrismaticJointDef::new(frame, slider, Vec2::UNIT_X);
    jdef.enable_limit = true;
    jdef.lower_translation = -1.0;
    jdef.upper_translation = 1.0;
    world.create_joint(&JointDef::Prismatic(jdef)).unwrap();

    run_world(&mut world, 120);
    let p = world.body(slider).unwrap().position();
    assert!(p.x <= 1.05, "slider overshot the limit: x = {}", p.x);
    assert!(p.x > 0.5, "slider never traveled: x = {}", p.x);
    assert!(p.y.abs() < 0.01, "slider left its axis: y = {}", p.y);
}

// ============================================================================
// Test 8 — Pulley conserves rope length
// ============================================================================

/// With a 1:1 ratio, the total rope length stays constant while the heavy
/// side descends and lifts the light side.
#[test]
fn test_pulley_conserves_rope_length() {
    let mut world = standard_world();

    let anchor_a = Vec2::new(-2.0, 10.0);
    let anchor_b = Vec2::new(2.0, 10.0);

    let heavy = world
        .create_body(&BodyDef::dynamic_at(Vec2::new(-2.0, 5.0)))
        .unwrap();
    let mut hdef = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
    hdef.density = 4.0;
    world.create_shape(heavy, &hdef).unwrap();

    let light = world
        .create_body(&BodyDef::dynamic_at(Vec2::new(2.0, 5.0)))
        .unwrap();
    let mut ldef = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
    ldef.density = 1.0;
    world.create_shape(light, &ldef).unwrap();

    let mut jdef = PulleyJointDef::new(heavy, light);
    jdef.ground_anchor_a = anchor_a;
    jdef.ground_anchor_b = anchor_b;
    jdef.length_a = 5.0;
    jdef.length_b = 5.0;
    world.create_joint(&JointDef::Pulley(jdef)).unwrap();

    run_world(&mut world, 90);

    let pa = world.body(heavy).unwrap().world_center();
    let pb = world.body(light).unwrap().world_center();
    let total = (pa - anchor_a).length() + (pb - anchor_b).length();
    assert!((total - 10.0).abs() < 0.1, "total rope = {total}");
    assert!(pa.y < 5.0, "heavy side did not descend");
    assert!(pb.y > 5.0, "light side did not rise");
}

// ============================================================================
// Test 9 — Gear couples two revolute wheels
// ============================================================================

/// A gear with ratio 2 holds `w_a + 2 * w_b` at zero once the solver has
/// distributed an initial spin across both wheels.
#[test]
fn test_gear_couples_revolute_wheels() {
    let mut world = world_with_gravity(Vec2::ZERO);
    let base = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();

    let make_wheel = |world: &mut World, x: f32| {
        let wheel = world
            .create_body(&BodyDef::dynamic_at(Vec2::new(x, 0.0)))
            .unwrap();
        let mut def = ShapeDef::new(ShapeKind::circle(0.5));
        def.density = 1.0;
        world.create_shape(wheel, &def).unwrap();
        wheel
    };
    let wheel_a = make_wheel(&mut world, -2.0);
    let wheel_b = make_wheel(&mut world, 2.0);

    let rev_a = world
        .create_joint(&JointDef::Revolute(RevoluteJointDef::new(base, wheel_a)))
        .unwrap();
    let rev_b = world
        .create_joint(&JointDef::Revolute(RevoluteJointDef::new(base, wheel_b)))
        .unwrap();

    let mut gdef = GearJointDef::new(rev_a, rev_b);
    gdef.ratio = 2.0;
    world.create_joint(&JointDef::Gear(gdef)).unwrap();

    world
        .body_mut(wheel_a)
        .unwrap()
        .set_angular_velocity(4.0);
    run_world(&mut world, 30);

    let wa = world.body(wheel_a).unwrap().angular_velocity();
    let wb = world.body(wheel_b).unwrap().angular_velocity();
    assert!((wa + 2.0 * wb).abs() < 0.05, "wa = {wa}, wb = {wb}");
    assert!(wa.abs() > 0.1, "spin vanished entirely");
}

// ============================================================================
// Test 10 — Sleeping bodies wake on impact
// ============================================================================

/// A slept box must wake up and move when something crashes into it.
#[test]
fn test_sleeping_body_wakes_on_impact() {
    let mut world = standard_world();
    add_ground(&mut world);
    let target = add_dynamic_box(&mut world, Vec2::new(0.0, 0.45), 0.5);

    run_world(&mut world, 300);
    assert!(world.body(target).unwrap().is_sleeping());

    let mut def = BodyDef::dynamic_at(Vec2::new(-6.0, 0.5));
    def.linear_velocity = Vec2::new(12.0, 0.0);
    def.allow_sleep = false;
    let ram = world.create_body(&def).unwrap();
    let mut sdef = ShapeDef::new(ShapeKind::circle(0.5));
    sdef.density = 2.0;
    world.create_shape(ram, &sdef).unwrap();

    run_world(&mut world, 90);
    let body = world.body(target).unwrap();
    assert!(
        body.position().x > 0.1,
        "target never moved: x = {}",
        body.position().x
    );
}

// ============================================================================
// Test 11 — Segment query hits the nearest shape first
// ============================================================================

#[test]
fn test_segment_query_orders_hits() {
    let mut world = world_with_gravity(Vec2::ZERO);
    let near = world
        .create_body(&BodyDef::static_at(Vec2::new(2.0, 0.0)))
        .unwrap();
    let near_shape = world
        .create_shape(near, &ShapeDef::new(ShapeKind::boxed(0.5, 0.5)))
        .unwrap();
    let far = world
        .create_body(&BodyDef::static_at(Vec2::new(6.0, 0.0)))
        .unwrap();
    let far_shape = world
        .create_shape(far, &ShapeDef::new(ShapeKind::boxed(0.5, 0.5)))
        .unwrap();

    let segment = Segment {
        p1: Vec2::new(-1.0, 0.0),
        p2: Vec2::new(10.0, 0.0),
    };
    let hits = world.query_segment(&segment, 1.0, usize::MAX);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].1, near_shape);
    assert_eq!(hits[1].1, far_shape);
    assert!(hits[0].0 < hits[1].0);

    let nearest = world.query_segment(&segment, 1.0, 1);
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].1, near_shape);
}
