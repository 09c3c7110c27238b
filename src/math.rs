//! 2D Math Primitives
//!
//! Value types used throughout the engine: vectors, 2×2 rotation matrices,
//! rigid transforms, and motion sweeps.
//!
//! # Conventions
//!
//! - Angles are radians, counter-clockwise positive.
//! - Rotation matrices are stored as two column vectors and are only ever
//!   constructed from an angle, so they stay orthonormal.
//! - A [`Sweep`] describes a body's interpolated center-of-mass motion over a
//!   sub-step interval and is the input to continuous collision.

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

// ============================================================================
// Vec2 — 2D Vector
// ============================================================================

/// 2D vector with `f32` components.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Vec2 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2 {
    /// Zero vector (0, 0)
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Unit X vector (1, 0)
    pub const UNIT_X: Self = Self { x: 1.0, y: 0.0 };

    /// Unit Y vector (0, 1)
    pub const UNIT_Y: Self = Self { x: 0.0, y: 1.0 };

    /// Create a new 2D vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared length (avoids sqrt).
    #[inline]
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Normalize to unit length. Returns `ZERO` for near-zero-length vectors.
    #[inline]
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len < f32::EPSILON {
            Self::ZERO
        } else {
            self / len
        }
    }

    /// Dot product.
    #[inline]
    #[must_use]
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 2D cross product (returns a scalar: `a.x * b.y - a.y * b.x`).
    ///
    /// This is the z-component of the 3D cross product when both vectors are
    /// embedded in the XY plane.
    #[inline]
    #[must_use]
    pub fn cross(self, rhs: Self) -> f32 {
        self.x * rhs.y - self.y * rhs.x
    }

    /// Cross a vector with a scalar: `v × s = (s * v.y, -s * v.x)`.
    #[inline]
    #[must_use]
    pub fn cross_scalar(self, s: f32) -> Self {
        Self {
            x: s * self.y,
            y: -s * self.x,
        }
    }

    /// Return the perpendicular vector (90 degrees counter-clockwise): `(-y, x)`.
    #[inline]
    #[must_use]
    pub fn skew(self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Component-wise absolute value.
    #[inline]
    #[must_use]
    pub fn abs(self) -> Self {
        Self {
            x: self.x.abs(),
            y: self.y.abs(),
        }
    }

    /// Component-wise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, rhs: Self) -> Self {
        Self {
            x: self.x.min(rhs.x),
            y: self.y.min(rhs.y),
        }
    }

    /// Component-wise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self {
            x: self.x.max(rhs.x),
            y: self.y.max(rhs.y),
        }
    }

    /// Distance to another point.
    #[inline]
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Linear interpolation: `self + (other - self) * t`.
    #[inline]
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// Returns `true` if both components are finite.
    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;

    #[inline]
    fn div(self, rhs: f32) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

/// Cross a scalar with a vector: `s × v = (-s * v.y, s * v.x)`.
#[inline]
#[must_use]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2 {
        x: -s * v.y,
        y: s * v.x,
    }
}

// ============================================================================
// Mat22 — 2×2 Matrix
// ============================================================================

/// 2×2 matrix stored as two column vectors.
///
/// Used both as a rotation matrix (constructed from an angle) and as a
/// general effective-mass matrix in the joint solvers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat22 {
    /// First column
    pub col1: Vec2,
    /// Second column
    pub col2: Vec2,
}

impl Mat22 {
    /// Identity matrix.
    pub const IDENTITY: Self = Self {
        col1: Vec2 { x: 1.0, y: 0.0 },
        col2: Vec2 { x: 0.0, y: 1.0 },
    };

    /// Create from column vectors.
    #[inline]
    #[must_use]
    pub const fn new(col1: Vec2, col2: Vec2) -> Self {
        Self { col1, col2 }
    }

    /// Create a rotation matrix from an angle (radians, counter-clockwise).
    #[inline]
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            col1: Vec2 { x: c, y: s },
            col2: Vec2 { x: -s, y: c },
        }
    }

    /// Extract the rotation angle from an orthonormal matrix.
    #[inline]
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.col1.y.atan2(self.col1.x)
    }

    /// Multiply a vector: `M * v`.
    #[inline]
    #[must_use]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2 {
            x: self.col1.x * v.x + self.col2.x * v.y,
            y: self.col1.y * v.x + self.col2.y * v.y,
        }
    }

    /// Multiply a vector by the transpose: `M^T * v`.
    ///
    /// For rotation matrices this is the inverse rotation.
    #[inline]
    #[must_use]
    pub fn mul_t_vec(&self, v: Vec2) -> Vec2 {
        Vec2 {
            x: self.col1.dot(v),
            y: self.col2.dot(v),
        }
    }

    /// Matrix product `M * N`.
    #[inline]
    #[must_use]
    pub fn mul_mat(&self, n: &Self) -> Self {
        Self {
            col1: self.mul_vec(n.col1),
            col2: self.mul_vec(n.col2),
        }
    }

    /// Matrix product with the transpose: `M^T * N`.
    #[inline]
    #[must_use]
    pub fn mul_t_mat(&self, n: &Self) -> Self {
        Self {
            col1: Vec2 {
                x: self.col1.dot(n.col1),
                y: self.col2.dot(n.col1),
            },
            col2: Vec2 {
                x: self.col1.dot(n.col2),
                y: self.col2.dot(n.col2),
            },
        }
    }

    /// Transpose.
    #[inline]
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self {
            col1: Vec2 {
                x: self.col1.x,
                y: self.col2.x,
            },
            col2: Vec2 {
                x: self.col1.y,
                y: self.col2.y,
            },
        }
    }

    /// Component-wise absolute value. Used for conservative AABB bounds.
    #[inline]
    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            col1: self.col1.abs(),
            col2: self.col2.abs(),
        }
    }

    /// Invert a general 2×2 matrix. Returns the identity if the determinant
    /// is near zero.
    #[must_use]
    pub fn invert(&self) -> Self {
        let a = self.col1.x;
        let b = self.col2.x;
        let c = self.col1.y;
        let d = self.col2.y;
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON {
            return Self::IDENTITY;
        }
        let inv_det = 1.0 / det;
        Self {
            col1: Vec2 {
                x: inv_det * d,
                y: -inv_det * c,
            },
            col2: Vec2 {
                x: -inv_det * b,
                y: inv_det * a,
            },
        }
    }

    /// Solve `M * x = b` without forming the inverse. Returns `ZERO` when the
    /// matrix is singular.
    #[inline]
    #[must_use]
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let a11 = self.col1.x;
        let a12 = self.col2.x;
        let a21 = self.col1.y;
        let a22 = self.col2.y;
        let det = a11 * a22 - a12 * a21;
        if det.abs() < f32::EPSILON {
            return Vec2::ZERO;
        }
        let inv_det = 1.0 / det;
        Vec2 {
            x: inv_det * (a22 * b.x - a12 * b.y),
            y: inv_det * (a11 * b.y - a21 * b.x),
        }
    }
}

// ============================================================================
// Transform — Rigid Transform
// ============================================================================

/// Rigid transform: a rotation followed by a translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation part.
    pub position: Vec2,
    /// Rotation part (orthonormal, built from an angle).
    pub rot: Mat22,
}

impl Transform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rot: Mat22::IDENTITY,
    };

    /// Create from a position and an angle.
    #[inline]
    #[must_use]
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            rot: Mat22::from_angle(angle),
        }
    }

    /// Transform a local point to world space: `R * v + p`.
    #[inline]
    #[must_use]
    pub fn mul(&self, v: Vec2) -> Vec2 {
        self.position + self.rot.mul_vec(v)
    }

    /// Transform a world point to local space: `R^T * (v - p)`.
    #[inline]
    #[must_use]
    pub fn mul_t(&self, v: Vec2) -> Vec2 {
        self.rot.mul_t_vec(v - self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Sweep — Interpolated Motion
// ============================================================================

/// Describes a body's center-of-mass motion over a sub-step interval.
///
/// `c0`/`a0` are the center position and angle at time `t0`; `c`/`a` at the
/// end of the step (`t = 1`). `local_center` is the body-local center of mass
/// used to reconstruct the body origin from the center position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sweep {
    /// Center of mass in body-local coordinates.
    pub local_center: Vec2,
    /// World center position at `t0`.
    pub c0: Vec2,
    /// World center position at the end of the step.
    pub c: Vec2,
    /// Angle at `t0`.
    pub a0: f32,
    /// Angle at the end of the step.
    pub a: f32,
    /// Normalized time of `c0`/`a0` within the current step, in `[0, 1]`.
    pub t0: f32,
}

impl Sweep {
    /// Reconstruct the body-origin transform at normalized time `t` in
    /// `[t0, 1]`, interpolating center position and angle.
    #[must_use]
    pub fn transform_at(&self, t: f32) -> Transform {
        let (c, a) = if 1.0 - self.t0 > f32::EPSILON {
            let alpha = (t - self.t0) / (1.0 - self.t0);
            (
                self.c0.lerp(self.c, alpha),
                self.a0 + (self.a - self.a0) * alpha,
            )
        } else {
            (self.c, self.a)
        };
        let rot = Mat22::from_angle(a);
        Transform {
            position: c - rot.mul_vec(self.local_center),
            rot,
        }
    }

    /// Advance the starting state to time `t` (used by the TOI pass).
    pub fn advance(&mut self, t: f32) {
        if self.t0 < t && 1.0 - self.t0 > f32::EPSILON {
            let alpha = (t - self.t0) / (1.0 - self.t0);
            self.c0 = self.c0.lerp(self.c, alpha);
            self.a0 += (self.a - self.a0) * alpha;
            self.t0 = t;
        }
    }
}

/// Clamp a value to `[low, high]`.
#[inline]
#[must_use]
pub fn clamp(value: f32, low: f32, high: f32) -> f32 {
    value.max(low).min(high)
}

// ============================================================================
// Tests
// ============================================================================
