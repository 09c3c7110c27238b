//! Benchmarks for rigid2d
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rigid2d::prelude::*;

// ============================================================================
// Scene builders
// ============================================================================

fn empty_world() -> World {
    let bounds = Aabb::new(Vec2::new(-500.0, -500.0), Vec2::new(500.0, 500.0));
    World::new(bounds, Vec2::new(0.0, -10.0)).unwrap()
}

fn ground(world: &mut World) {
    let body = world
        .create_body(&BodyDef::static_at(Vec2::new(0.0, -1.0)))
        .unwrap();
    world
        .create_shape(body, &ShapeDef::new(ShapeKind::boxed(400.0, 1.0)))
        .unwrap();
}

fn dynamic_box(world: &mut World, position: Vec2) {
    let body = world.create_body(&BodyDef::dynamic_at(position)).unwrap();
    let mut def = ShapeDef::new(ShapeKind::boxed(0.5, 0.5));
    def.density = 1.0;
    def.friction = 0.5;
    world.create_shape(body, &def).unwrap();
}

/// A pyramid of boxes, `base` wide at the bottom.
fn pyramid_world(base: usize) -> World {
    let mut world = empty_world();
    ground(&mut world);
    for row in 0..base {
        let count = base - row;
        let y = 0.55 + 1.05 * row as f32;
        let x0 = -0.525 * (count as f32 - 1.0);
        for i in 0..count {
            dynamic_box(&mut world, Vec2::new(x0 + 1.05 * i as f32, y));
        }
    }
    world
}

// ============================================================================
// Step benchmarks
// ============================================================================

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");

    group.bench_function("falling_boxes_64_one_step", |b| {
        b.iter_batched(
            || {
                let mut world = empty_world();
                ground(&mut world);
                for i in 0..64 {
                    let x = (i % 8) as f32 * 2.0 - 8.0;
                    let y = 2.0 + (i / 8) as f32 * 2.0;
                    dynamic_box(&mut world, Vec2::new(x, y));
                }
                world
            },
            |mut world| {
                world.step(black_box(1.0 / 60.0), 10, 10).unwrap();
                world
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("pyramid_10_settle_60_steps", |b| {
        b.iter_batched(
            || pyramid_world(10),
            |mut world| {
                for _ in 0..60 {
                    world.step(black_box(1.0 / 60.0), 10, 10).unwrap();
                }
                world
            },
            criterion::BatchSize::SmallInput,
        );
    });

    // Sleeping worlds should step in near-constant time
    group.bench_function("pyramid_10_asleep_one_step", |b| {
        let mut world = pyramid_world(10);
        for _ in 0..600 {
            world.step(1.0 / 60.0, 10, 10).unwrap();
        }
        b.iter(|| {
            world.step(black_box(1.0 / 60.0), 10, 10).unwrap();
            world.diagnostics().islands
        });
    });

    group.finish();
}

fn bench_continuous(c: &mut Criterion) {
    let mut group = c.benchmark_group("continuous");

    group.bench_function("bullet_vs_wall_30_steps", |b| {
        b.iter_batched(
            || {
                let mut world = empty_world();
                let wall = world.create_body(&BodyDef::static_at(Vec2::ZERO)).unwrap();
                world
                    .create_shape(wall, &ShapeDef::new(ShapeKind::boxed(0.05, 5.0)))
                    .unwrap();
                let mut def = BodyDef::dynamic_at(Vec2::new(-10.0, 0.0));
                def.linear_velocity = Vec2::new(300.0, 0.0);
                def.bullet = true;
                def.allow_sleep = false;
                let bullet = world.create_body(&def).unwrap();
                let mut sdef = ShapeDef::new(ShapeKind::circle(0.2));
                sdef.density = 1.0;
                world.create_shape(bullet, &sdef).unwrap();
                world
            },
            |mut world| {
                for _ in 0..30 {
                    world.step(black_box(1.0 / 60.0), 8, 8).unwrap();
                }
                world
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    let mut world = empty_world();
    for i in 0..200 {
        let x = (i % 20) as f32 * 4.0 - 40.0;
        let y = (i / 20) as f32 * 4.0;
        let body = world
            .create_body(&BodyDef::static_at(Vec2::new(x, y)))
            .unwrap();
        world
            .create_shape(body, &ShapeDef::new(ShapeKind::boxed(0.5, 0.5)))
            .unwrap();
    }

    group.bench_function("aabb_query_200_proxies", |b| {
        let probe = Aabb::new(Vec2::new(-10.0, -1.0), Vec2::new(10.0, 10.0));
        b.iter(|| world.query_aabb(black_box(&probe)).len());
    });

    group.bench_function("segment_query_200_proxies", |b| {
        let segment = Segment {
            p1: Vec2::new(-45.0, 2.0),
            p2: Vec2::new(45.0, 2.0),
        };
        b.iter(|| world.query_segment(black_box(&segment), 1.0, usize::MAX).len());
    });

    group.finish();
}

criterion_group!(benches, bench_world_step, bench_continuous, bench_queries);
criterion_main!(benches);
