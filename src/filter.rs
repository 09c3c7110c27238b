//! Collision Filtering (Category/Mask/Group)
//!
//! Bitmask-based filtering for controlling which shapes may collide.
//!
//! # Usage
//!
//! ```
//! use rigid2d::filter::Filter;
//!
//! // Category 0 = terrain, 1 = player, 2 = projectile
//! let terrain = Filter::new(1 << 0, u16::MAX, 0);
//! let player = Filter::new(1 << 1, (1 << 0) | (1 << 2), 0);
//! assert!(Filter::should_collide(&terrain, &player));
//! ```

/// Per-shape collision filter.
///
/// Two shapes may collide iff
/// `(a.category & b.mask) != 0 && (b.category & a.mask) != 0`,
/// unless they share a non-zero group index: a positive shared group always
/// collides, a negative shared group never does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Which category bit(s) this shape belongs to.
    pub category_bits: u16,
    /// Which categories this shape accepts collisions with.
    pub mask_bits: u16,
    /// Collision group override (0 = no group).
    pub group_index: i16,
}

impl Filter {
    /// Default filter: category 1, collides with everything, no group.
    pub const DEFAULT: Self = Self {
        category_bits: 0x0001,
        mask_bits: 0xFFFF,
        group_index: 0,
    };

    /// Create a filter.
    #[inline]
    #[must_use]
    pub const fn new(category_bits: u16, mask_bits: u16, group_index: i16) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index,
        }
    }

    /// Default collision decision for a pair of filters.
    #[inline]
    #[must_use]
    pub fn should_collide(a: &Self, b: &Self) -> bool {
        if a.group_index == b.group_index && a.group_index != 0 {
            return a.group_index > 0;
        }
        (a.category_bits & b.mask_bits) != 0 && (b.category_bits & a.mask_bits) != 0
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides() {
        let a = Filter::DEFAULT;
        let b = Filter::DEFAULT;
        assert!(Filter::should_collide(&a, &b));
    }

    #[test]
    fn test_mask_blocks() {
        let a = Filter::new(0x0001, 0x0002, 0);
        let b = Filter::new(0x0004, 0xFFFF, 0);
        assert!(!Filter::should_collide(&a, &b));
    }

    #[test]
    fn test_group_overrides_mask() {
        // Masks say no, positive group says yes
        let a = Filter::new(0x0001, 0x0000, 3);
        let b = Filter::new(0x0002, 0x0000, 3);
        assert!(Filter::should_collide(&a, &b));

        // Masks say yes, negative group says no
        let c = Filter::new(0x0001, 0xFFFF, -2);
        let d = Filter::new(0x0002, 0xFFFF, -2);
        assert!(!Filter::should_collide(&c, &d));
    }
}
