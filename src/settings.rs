//! Engine Tuning Parameters
//!
//! The solver and collision routines rely on a set of tuned tolerances that
//! trade stability for visual softness. They are deliberately configuration,
//! not hard-coded invariants: the defaults are the values the engine family
//! has shipped with for years, and behavior is validated by the stability and
//! TOI tests rather than by bit-exact constants.

/// Maximum contact points in a 2D manifold.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum vertices in a convex polygon shape.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Solver and collision tuning parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    /// Allowed linear penetration. Contacts are resolved to this slop rather
    /// than to zero so they keep a little overlap for warm starting.
    pub linear_slop: f32,
    /// Allowed angular error for joint position correction (radians).
    pub angular_slop: f32,
    /// Relative velocity below which restitution is ignored (m/s).
    pub velocity_threshold: f32,
    /// Baumgarte position-correction factor for the main solve, in `(0, 1]`.
    pub baumgarte: f32,
    /// Stiffer Baumgarte factor used by TOI sub-island solves.
    pub toi_baumgarte: f32,
    /// Maximum position correction applied in a single iteration (meters).
    pub max_linear_correction: f32,
    /// Maximum angular correction applied in a single iteration (radians).
    pub max_angular_correction: f32,
    /// Relative tolerance when choosing the SAT reference face. Keeps the
    /// reference choice from flip-flopping between nearly equal separations.
    pub sat_relative_tol: f32,
    /// Absolute tolerance companion to `sat_relative_tol`.
    pub sat_absolute_tol: f32,
    /// Linear velocity below which a body accumulates sleep time (m/s).
    pub linear_sleep_tolerance: f32,
    /// Angular velocity below which a body accumulates sleep time (rad/s).
    pub angular_sleep_tolerance: f32,
    /// Sustained low-motion time before an island may sleep (seconds).
    pub time_to_sleep: f32,
    /// Whether bodies are allowed to sleep at all.
    pub allow_sleep: bool,
    /// Whether the continuous-collision (TOI) pass runs after the main solve.
    pub continuous_physics: bool,
    /// Iteration cap for the GJK distance loop.
    pub gjk_max_iterations: u32,
    /// Iteration cap for the conservative-advancement TOI loop.
    pub toi_max_iterations: u32,
    /// Maximum contacts gathered into one TOI sub-island.
    pub max_toi_contacts_per_island: usize,
    /// Maximum bodies gathered into one TOI sub-island.
    pub max_toi_bodies_per_island: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            linear_slop: 0.005,
            angular_slop: 2.0 / 180.0 * core::f32::consts::PI,
            velocity_threshold: 1.0,
            baumgarte: 0.2,
            toi_baumgarte: 0.75,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * core::f32::consts::PI,
            sat_relative_tol: 0.98,
            sat_absolute_tol: 0.001,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * core::f32::consts::PI,
            time_to_sleep: 0.5,
            allow_sleep: true,
            continuous_physics: true,
            gjk_max_iterations: 20,
            toi_max_iterations: 20,
            max_toi_contacts_per_island: 32,
            max_toi_bodies_per_island: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sane() {
        let t = Tuning::default();
        assert!(t.linear_slop > 0.0);
        assert!(t.baumgarte > 0.0 && t.baumgarte <= 1.0);
        assert!(t.toi_baumgarte >= t.baumgarte);
        assert!(t.sat_relative_tol < 1.0);
        assert!(t.gjk_max_iterations > 0);
    }
}
