//! Time of Impact (Conservative Advancement)
//!
//! Finds the first time within a step at which two swept shapes touch. Each
//! iteration queries GJK for the current surface distance and closest-point
//! normal, bounds the approach speed by the relative linear velocity along
//! the normal plus the worst-case rotational contribution
//! (`|omega| * sweep_radius`), and advances by the interval that provably
//! cannot carry the pair deeper than a hair past first contact.
//!
//! The target is a small surface overlap (a fraction of the linear slop)
//! rather than a positive gap: the follow-up contact solve only engages a
//! pair whose manifold has points, and manifolds need overlap to produce
//! them.

use crate::distance::distance;
use crate::math::Sweep;
use crate::settings::Tuning;
use crate::shape::ShapeKind;

/// First time of impact between two swept shapes.
///
/// `sweep_a`/`sweep_b` must share the same start time `t0`. The result is a
/// global step time in `[t0, 1]`; `1.0` means no impact within the step.
#[must_use]
pub fn time_of_impact(
    shape_a: &ShapeKind,
    sweep_a: &Sweep,
    sweep_radius_a: f32,
    shape_b: &ShapeKind,
    sweep_b: &Sweep,
    sweep_radius_b: f32,
    tuning: &Tuning,
) -> f32 {
    let t0 = sweep_a.t0.max(sweep_b.t0);
    debug_assert!((sweep_a.t0 - sweep_b.t0).abs() < 1e-5);

    // Motion per unit of the remaining interval
    let v1 = sweep_a.c - sweep_a.c0;
    let v2 = sweep_b.c - sweep_b.c0;
    let omega1 = sweep_a.a - sweep_a.a0;
    let omega2 = sweep_b.a - sweep_b.a0;

    let target_overlap = 1.5 * tuning.linear_slop;
    let mut alpha: f32 = 0.0;

    for _ in 0..tuning.toi_max_iterations {
        let t = (1.0 - alpha) * t0 + alpha;
        let xf1 = sweep_a.transform_at(t);
        let xf2 = sweep_b.transform_at(t);

        let out = distance(shape_a, &xf1, shape_b, &xf2, tuning.gjk_max_iterations);

        // Zero surface distance means the shapes overlap at `t`: impact
        if out.distance < f32::EPSILON {
            break;
        }

        let normal = (out.point_b - out.point_a).normalize();

        // Upper bound on how fast the gap can close
        let approach_velocity_bound = normal.dot(v1 - v2)
            + omega1.abs() * sweep_radius_a
            + omega2.abs() * sweep_radius_b;
        if approach_velocity_bound.abs() < f32::EPSILON {
            alpha = 1.0;
            break;
        }

        let d_alpha = (out.distance + target_overlap) / approach_velocity_bound;
        let new_alpha = alpha + d_alpha;

        // Moving apart, or safely separated for the whole interval
        if !(0.0..=1.0).contains(&new_alpha) {
            alpha = 1.0;
            break;
        }

        // Stalled advancement
        if new_alpha < (1.0 + 100.0 * f32::EPSILON) * alpha {
            break;
        }

        alpha = new_alpha;
    }

    // Map the remaining-interval fraction back to global step time
    ((1.0 - alpha) * t0 + alpha).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            t0: 0.0,
        }
    }

    fn static_sweep(at: Vec2) -> Sweep {
        linear_sweep(at, at)
    }

    #[test]
    fn test_bullet_hits_thin_wall() {
        let bullet = ShapeKind::circle(0.1);
        let wall = ShapeKind::boxed(0.1, 2.0);
        let sweep_b = linear_sweep(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let sweep_w = static_sweep(Vec2::ZERO);

        let toi = time_of_impact(
            &bullet,
            &sweep_b,
            0.1,
            &wall,
            &sweep_w,
            wall.sweep_radius(Vec2::ZERO),
            &Tuning::default(),
        );
        // Surfaces meet at x = -0.2, i.e. 4.8 of 10 units of travel
        assert!(toi < 1.0, "fast mover must not tunnel, toi={toi}");
        assert!((0.4..0.5).contains(&toi), "toi={toi}");
    }

    #[test]
    fn test_impact_time_lands_in_contact() {
        let bullet = ShapeKind::circle(0.1);
        let wall = ShapeKind::boxed(0.1, 2.0);
        let sweep_b = linear_sweep(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let sweep_w = static_sweep(Vec2::ZERO);

        let toi = time_of_impact(
            &bullet,
            &sweep_b,
            0.1,
            &wall,
            &sweep_w,
            wall.sweep_radius(Vec2::ZERO),
            &Tuning::default(),
        );
        // At the reported time the surfaces overlap slightly; a manifold
        // rebuilt there has points to solve. First touch is at x = -0.2.
        let x = sweep_b.transform_at(toi).position.x;
        assert!(x > -0.2, "stopped short of contact: x = {x}");
        assert!(x < -0.2 + 0.02, "overshot: x = {x}");
    }

    #[test]
    fn test_no_impact_when_paths_clear() {
        let a = ShapeKind::circle(0.5);
        let sweep_a = linear_sweep(Vec2::new(-5.0, 5.0), Vec2::new(5.0, 5.0));
        let sweep_b = static_sweep(Vec2::ZERO);
        let toi = time_of_impact(
            &a,
            &sweep_a,
            0.5,
            &ShapeKind::boxed(1.0, 1.0),
            &sweep_b,
            1.4,
            &Tuning::default(),
        );
        assert_eq!(toi, 1.0);
    }

    #[test]
    fn test_separating_shapes_report_no_impact() {
        let a = ShapeKind::circle(0.5);
        let sweep_a = linear_sweep(Vec2::new(2.0, 0.0), Vec2::new(8.0, 0.0));
        let sweep_b = static_sweep(Vec2::ZERO);
        let toi = time_of_impact(
            &a,
            &sweep_a,
            0.5,
            &ShapeKind::circle(0.5),
            &sweep_b,
            0.5,
            &Tuning::default(),
        );
        assert_eq!(toi, 1.0);
    }

    #[test]
    fn test_already_touching_returns_early_time() {
        let a = ShapeKind::circle(0.5);
        let sweep_a = linear_sweep(Vec2::new(1.02, 0.0), Vec2::new(0.0, 0.0));
        let sweep_b = static_sweep(Vec2::ZERO);
        let toi = time_of_impact(
            &a,
            &sweep_a,
            0.5,
            &ShapeKind::circle(0.5),
            &sweep_b,
            0.5,
            &Tuning::default(),
        );
        assert!(toi < 0.1, "toi={toi}");
    }

    #[test]
    fn test_respects_advanced_start_time() {
        let bullet = ShapeKind::circle(0.1);
        let wall = ShapeKind::boxed(0.1, 2.0);
        let mut sweep_b = linear_sweep(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let mut sweep_w = static_sweep(Vec2::ZERO);
        sweep_b.advance(0.25);
        sweep_w.advance(0.25);

        let toi = time_of_impact(
            &bullet,
            &sweep_b,
            0.1,
            &wall,
            &sweep_w,
            wall.sweep_radius(Vec2::ZERO),
            &Tuning::default(),
        );
        // Global time, so still in the same window as the unadvanced query
        assert!((0.4..0.5).contains(&toi), "toi={toi}");
    }
}
