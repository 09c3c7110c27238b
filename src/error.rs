//! Physics Error Types
//!
//! Unified error type for the engine. Operations that can fail (world
//! mutation while stepping, handle lookup, capacity limits, degenerate shape
//! input) return `Result<T, PhysicsError>` instead of panicking. Nothing in a
//! normal `step()` produces an error; failures are confined to the API
//! boundary.
//!
//! Author: Moroya Sakamoto

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// The world is locked (inside `step()`); structural mutation is
    /// forbidden while the broad phase and contact graph are being walked.
    WorldLocked,
    /// Body handle does not refer to a live body.
    InvalidBody {
        /// The invalid handle index
        index: u32,
    },
    /// Shape handle does not refer to a live shape.
    InvalidShape {
        /// The invalid handle index
        index: u32,
    },
    /// Joint handle does not refer to a live joint.
    InvalidJoint {
        /// The invalid handle index
        index: u32,
    },
    /// A capacity limit was exceeded (broad-phase proxy pool, etc.).
    CapacityExceeded {
        /// What resource was exhausted
        resource: &'static str,
        /// The limit that was exceeded
        limit: usize,
    },
    /// Shape geometry was rejected (non-convex polygon, too few vertices,
    /// zero-length edge, non-positive radius).
    InvalidGeometry {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// Invalid configuration parameter (bad world AABB, non-positive dt).
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldLocked => write!(f, "world is locked during step()"),
            Self::InvalidBody { index } => write!(f, "invalid body handle {index}"),
            Self::InvalidShape { index } => write!(f, "invalid shape handle {index}"),
            Self::InvalidJoint { index } => write!(f, "invalid joint handle {index}"),
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "capacity exceeded for {resource} (limit={limit})")
            }
            Self::InvalidGeometry { reason } => write!(f, "invalid geometry: {reason}"),
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for PhysicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = PhysicsError::CapacityExceeded {
            resource: "broad-phase proxies",
            limit: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("broad-phase proxies"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_eq() {
        assert_eq!(PhysicsError::WorldLocked, PhysicsError::WorldLocked);
        assert_ne!(
            PhysicsError::InvalidBody { index: 1 },
            PhysicsError::InvalidBody { index: 2 }
        );
    }
}
