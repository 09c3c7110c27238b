//! Sweep-and-Prune Broad Phase
//!
//! Incremental sort-and-sweep over quantized AABB endpoints, one sorted
//! endpoint array per axis. Each endpoint carries a stabbing count (how many
//! intervals overlap that position) so range queries can walk outward without
//! rescanning the whole array.
//!
//! # Quantization
//!
//! World coordinates are mapped into `u16` against a fixed world AABB given
//! at construction. Lower endpoint values are forced even and upper values
//! odd, so exact ties between a closing interval and an opening one still
//! order deterministically and touching proxies count as overlapping.
//!
//! # Incremental updates
//!
//! Moving a proxy bubbles its four endpoints to their new sorted positions
//! one swap at a time. Every swap that crosses another proxy's opposite
//! endpoint is a potential overlap change, which is reported to the buffered
//! [`PairManager`] and applied at [`BroadPhase::commit`].
//!
//! Proxy ids are `u16` and endpoint indices are cached per proxy, which caps
//! the pool at [`MAX_PROXIES`].
//!
//! Author: Moroya Sakamoto

use crate::aabb::{Aabb, Segment};
use crate::error::PhysicsError;
use crate::math::Vec2;
use crate::pair_manager::{PairCallback, PairManager};

/// Hard cap on live proxies (endpoint indices must fit in `u16`).
pub const MAX_PROXIES: usize = 16_384;

/// Sentinel proxy id.
pub const NULL_PROXY: u16 = u16::MAX;

// ============================================================================
// Endpoint and Proxy Records
// ============================================================================

/// One quantized interval endpoint in a per-axis sorted array.
#[derive(Clone, Copy, Debug)]
struct Bound {
    /// Quantized coordinate; even = lower endpoint, odd = upper endpoint.
    value: u16,
    /// Owning proxy.
    proxy_id: u16,
    /// Number of intervals stabbing this position.
    stabbing_count: u16,
}

impl Bound {
    #[inline]
    fn is_lower(&self) -> bool {
        self.value & 1 == 0
    }

    #[inline]
    fn is_upper(&self) -> bool {
        self.value & 1 == 1
    }
}

/// Quantized bounds of a proxy candidate, before insertion.
#[derive(Clone, Copy, Debug)]
struct BoundValues {
    lower: [u16; 2],
    upper: [u16; 2],
}

/// Per-proxy record: cached endpoint indices plus query scratch state.
#[derive(Clone, Copy, Debug)]
struct Proxy {
    /// Index of the lower endpoint in `bounds[axis]`.
    lower_bounds: [u16; 2],
    /// Index of the upper endpoint in `bounds[axis]`.
    upper_bounds: [u16; 2],
    /// Axis-hit counter for the current query (2 = overlaps on both axes).
    overlap_count: u16,
    /// Query stamp; stale stamps reset `overlap_count`.
    time_stamp: u32,
    /// Client token (the engine stores a shape index here).
    user_data: u32,
    /// Live flag; dead slots sit on the free list.
    active: bool,
}

impl Proxy {
    const DEAD: Self = Self {
        lower_bounds: [0; 2],
        upper_bounds: [0; 2],
        overlap_count: 0,
        time_stamp: 0,
        user_data: 0,
        active: false,
    };
}

/// First endpoint index whose value is `>= value` (or an exact match).
fn binary_search(bounds: &[Bound], value: u16) -> usize {
    let mut low = 0_isize;
    let mut high = bounds.len() as isize - 1;
    while low <= high {
        let mid = (low + high) >> 1;
        if bounds[mid as usize].value > value {
            high = mid - 1;
        } else if bounds[mid as usize].value < value {
            low = mid + 1;
        } else {
            return mid as usize;
        }
    }
    low as usize
}

// ============================================================================
// BroadPhase
// ============================================================================

/// Sweep-and-prune broad phase over a fixed world AABB.
#[derive(Debug)]
pub struct BroadPhase {
    world_aabb: Aabb,
    quantization_factor: Vec2,
    proxies: Vec<Proxy>,
    free_list: Vec<u16>,
    bounds: [Vec<Bound>; 2],
    /// Buffered overlap changes, drained by [`BroadPhase::commit`].
    pub(crate) pair_manager: PairManager,
    query_results: Vec<u16>,
    time_stamp: u32,
    proxy_count: usize,
    max_proxies: usize,
}

impl BroadPhase {
    /// Create a broad phase covering `world_aabb` with room for up to
    /// `max_proxies` proxies.
    pub fn new(world_aabb: Aabb, max_proxies: usize) -> Result<Self, PhysicsError> {
        if !world_aabb.is_valid()
            || world_aabb.upper.x - world_aabb.lower.x < f32::EPSILON
            || world_aabb.upper.y - world_aabb.lower.y < f32::EPSILON
        {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "world AABB must be a valid box with positive extent",
            });
        }
        if max_proxies == 0 || max_proxies > MAX_PROXIES {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max proxy count out of range",
            });
        }
        let d = world_aabb.upper - world_aabb.lower;
        Ok(Self {
            world_aabb,
            quantization_factor: Vec2::new(u16::MAX as f32 / d.x, u16::MAX as f32 / d.y),
            proxies: Vec::new(),
            free_list: Vec::new(),
            bounds: [Vec::new(), Vec::new()],
            pair_manager: PairManager::new(),
            query_results: Vec::new(),
            time_stamp: 1,
            proxy_count: 0,
            max_proxies,
        })
    }

    /// The fixed world bounds.
    #[inline]
    #[must_use]
    pub fn world_aabb(&self) -> &Aabb {
        &self.world_aabb
    }

    /// Number of live proxies.
    #[inline]
    #[must_use]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Whether an AABB still intersects the world bounds. Shapes that leave
    /// entirely get frozen by the world.
    #[must_use]
    pub fn in_range(&self, aabb: &Aabb) -> bool {
        let d = (aabb.lower - self.world_aabb.upper).max(self.world_aabb.lower - aabb.upper);
        d.x.max(d.y) < 0.0
    }

    /// Client token stored on a proxy.
    #[inline]
    #[must_use]
    pub fn proxy_user_data(&self, proxy_id: u16) -> u32 {
        self.proxies[proxy_id as usize].user_data
    }

    fn compute_bounds(&self, aabb: &Aabb) -> BoundValues {
        debug_assert!(aabb.lower.x <= aabb.upper.x && aabb.lower.y <= aabb.upper.y);
        let lo = aabb
            .lower
            .max(self.world_aabb.lower)
            .min(self.world_aabb.upper);
        let hi = aabb
            .upper
            .max(self.world_aabb.lower)
            .min(self.world_aabb.upper);
        let q = self.quantization_factor;
        let w = self.world_aabb.lower;
        BoundValues {
            lower: [
                ((q.x * (lo.x - w.x)) as u16) & (u16::MAX - 1),
                ((q.y * (lo.y - w.y)) as u16) & (u16::MAX - 1),
            ],
            upper: [
                ((q.x * (hi.x - w.x)) as u16) | 1,
                ((q.y * (hi.y - w.y)) as u16) | 1,
            ],
        }
    }

    /// Quantized interval-overlap test between candidate values and a live
    /// proxy.
    fn test_overlap_values(&self, values: &BoundValues, other: u16) -> bool {
        let p = &self.proxies[other as usize];
        for axis in 0..2 {
            let bounds = &self.bounds[axis];
            if bounds[p.lower_bounds[axis] as usize].value > values.upper[axis] {
                return false;
            }
            if bounds[p.upper_bounds[axis] as usize].value < values.lower[axis] {
                return false;
            }
        }
        true
    }

    fn increment_overlap_count(&mut self, proxy_id: u16) {
        let p = &mut self.proxies[proxy_id as usize];
        if p.time_stamp < self.time_stamp {
            p.time_stamp = self.time_stamp;
            p.overlap_count = 1;
        } else {
            p.overlap_count = 2;
            self.query_results.push(proxy_id);
        }
    }

    /// Range query on one axis: marks every proxy whose interval overlaps
    /// `[lower_value, upper_value]`. Returns the insertion positions of the
    /// two query values.
    fn query_axis(
        &mut self,
        lower_value: u16,
        upper_value: u16,
        axis: usize,
        bound_count: usize,
    ) -> (usize, usize) {
        let lower_query = binary_search(&self.bounds[axis][..bound_count], lower_value);
        let upper_query = binary_search(&self.bounds[axis][..bound_count], upper_value);

        // Easy case: lower endpoints inside the query range open an overlap.
        for i in lower_query..upper_query {
            let b = self.bounds[axis][i];
            if b.is_lower() {
                self.increment_overlap_count(b.proxy_id);
            }
        }

        // Hard case: intervals that straddle the query start. The stabbing
        // count at the position just below tells us exactly how many remain,
        // so the backward walk can stop early.
        if lower_query > 0 {
            let mut i = lower_query as isize - 1;
            let mut s = self.bounds[axis][i as usize].stabbing_count;
            while s != 0 && i >= 0 {
                let b = self.bounds[axis][i as usize];
                if b.is_lower() {
                    let other = b.proxy_id;
                    if lower_query <= self.proxies[other as usize].upper_bounds[axis] as usize {
                        self.increment_overlap_count(other);
                        s -= 1;
                    }
                }
                i -= 1;
            }
        }

        (lower_query, upper_query)
    }

    /// Re-cache endpoint indices for every proxy whose endpoint sits in
    /// `range` of the axis array.
    fn update_bound_indices(&mut self, axis: usize, range: core::ops::Range<usize>) {
        for index in range {
            let b = self.bounds[axis][index];
            let p = &mut self.proxies[b.proxy_id as usize];
            if b.is_lower() {
                p.lower_bounds[axis] = index as u16;
            } else {
                p.upper_bounds[axis] = index as u16;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Proxy Lifecycle
    // ------------------------------------------------------------------------

    /// Insert a proxy for `aabb`. Overlaps with existing proxies are buffered
    /// as added pairs.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: u32) -> Result<u16, PhysicsError> {
        if self.proxy_count >= self.max_proxies {
            return Err(PhysicsError::CapacityExceeded {
                resource: "broad-phase proxies",
                limit: self.max_proxies,
            });
        }
        if !aabb.is_valid() {
            return Err(PhysicsError::InvalidGeometry {
                reason: "proxy AABB is invalid",
            });
        }

        let proxy_id = match self.free_list.pop() {
            Some(id) => id,
            None => {
                self.proxies.push(Proxy::DEAD);
                (self.proxies.len() - 1) as u16
            }
        };
        {
            let p = &mut self.proxies[proxy_id as usize];
            p.overlap_count = 0;
            p.user_data = user_data;
            p.active = true;
        }

        let bound_count = 2 * self.proxy_count;
        let values = self.compute_bounds(aabb);

        for axis in 0..2 {
            // Find insertion points and collect overlaps against the
            // pre-insertion arrays.
            let (lower_index, upper_index) =
                self.query_axis(values.lower[axis], values.upper[axis], axis, bound_count);

            let stab_lower = if lower_index == 0 {
                0
            } else {
                self.bounds[axis][lower_index - 1].stabbing_count
            };
            let stab_upper = if upper_index == 0 {
                0
            } else {
                self.bounds[axis][upper_index - 1].stabbing_count
            };

            self.bounds[axis].insert(
                upper_index,
                Bound {
                    value: values.upper[axis],
                    proxy_id,
                    stabbing_count: stab_upper,
                },
            );
            self.bounds[axis].insert(
                lower_index,
                Bound {
                    value: values.lower[axis],
                    proxy_id,
                    stabbing_count: stab_lower,
                },
            );
            let upper_index = upper_index + 1;

            // Everything inside the new interval is stabbed by it, the new
            // lower endpoint included.
            for index in lower_index..upper_index {
                self.bounds[axis][index].stabbing_count += 1;
            }

            self.update_bound_indices(axis, lower_index..bound_count + 2);
        }

        self.proxy_count += 1;

        for i in 0..self.query_results.len() {
            let other = self.query_results[i];
            self.pair_manager.add_buffered_pair(proxy_id, other);
        }
        self.query_results.clear();
        self.time_stamp += 1;

        Ok(proxy_id)
    }

    /// Remove a proxy. Overlaps it was part of are buffered as removed pairs.
    pub fn destroy_proxy(&mut self, proxy_id: u16) -> Result<(), PhysicsError> {
        let valid = (proxy_id as usize) < self.proxies.len()
            && self.proxies[proxy_id as usize].active;
        if !valid {
            return Err(PhysicsError::InvalidShape {
                index: proxy_id as u32,
            });
        }

        let bound_count = 2 * self.proxy_count;

        for axis in 0..2 {
            let p = self.proxies[proxy_id as usize];
            let lower_index = p.lower_bounds[axis] as usize;
            let upper_index = p.upper_bounds[axis] as usize;
            let lower_value = self.bounds[axis][lower_index].value;
            let upper_value = self.bounds[axis][upper_index].value;

            self.bounds[axis].remove(upper_index);
            self.bounds[axis].remove(lower_index);

            self.update_bound_indices(axis, lower_index..bound_count - 2);

            // The removed interval no longer stabs anything inside it.
            for index in lower_index..upper_index - 1 {
                self.bounds[axis][index].stabbing_count -= 1;
            }

            self.query_axis(lower_value, upper_value, axis, bound_count - 2);
        }

        for i in 0..self.query_results.len() {
            let other = self.query_results[i];
            self.pair_manager.remove_buffered_pair(proxy_id, other);
        }
        self.query_results.clear();
        self.time_stamp += 1;

        let p = &mut self.proxies[proxy_id as usize];
        *p = Proxy::DEAD;
        self.free_list.push(proxy_id);
        self.proxy_count -= 1;

        Ok(())
    }

    /// Update a proxy's AABB, bubbling its endpoints to their new positions.
    ///
    /// Every endpoint swap that crosses another proxy's opposite endpoint
    /// buffers an overlap change; nothing is reported until
    /// [`BroadPhase::commit`].
    pub fn move_proxy(&mut self, proxy_id: u16, aabb: &Aabb) -> Result<(), PhysicsError> {
        let valid = (proxy_id as usize) < self.proxies.len()
            && self.proxies[proxy_id as usize].active;
        if !valid {
            return Err(PhysicsError::InvalidShape {
                index: proxy_id as u32,
            });
        }
        if !aabb.is_valid() {
            return Err(PhysicsError::InvalidGeometry {
                reason: "proxy AABB is invalid",
            });
        }

        let bound_count = 2 * self.proxy_count;
        let new_values = self.compute_bounds(aabb);
        let old_values = {
            let p = &self.proxies[proxy_id as usize];
            BoundValues {
                lower: [
                    self.bounds[0][p.lower_bounds[0] as usize].value,
                    self.bounds[1][p.lower_bounds[1] as usize].value,
                ],
                upper: [
                    self.bounds[0][p.upper_bounds[0] as usize].value,
                    self.bounds[1][p.upper_bounds[1] as usize].value,
                ],
            }
        };

        for axis in 0..2 {
            let lower_index = self.proxies[proxy_id as usize].lower_bounds[axis] as usize;
            let upper_index = self.proxies[proxy_id as usize].upper_bounds[axis] as usize;

            let lower_value = new_values.lower[axis];
            let upper_value = new_values.upper[axis];

            let delta_lower =
                lower_value as i32 - self.bounds[axis][lower_index].value as i32;
            let delta_upper =
                upper_value as i32 - self.bounds[axis][upper_index].value as i32;

            self.bounds[axis][lower_index].value = lower_value;
            self.bounds[axis][upper_index].value = upper_value;

            // Expanding: lower endpoint moves down.
            if delta_lower < 0 {
                let mut index = lower_index;
                while index > 0 && lower_value < self.bounds[axis][index - 1].value {
                    let prev = self.bounds[axis][index - 1];
                    let prev_id = prev.proxy_id;

                    self.bounds[axis][index - 1].stabbing_count += 1;

                    if prev.is_upper() {
                        if self.test_overlap_values(&new_values, prev_id) {
                            self.pair_manager.add_buffered_pair(proxy_id, prev_id);
                        }
                        self.proxies[prev_id as usize].upper_bounds[axis] += 1;
                        self.bounds[axis][index].stabbing_count += 1;
                    } else {
                        self.proxies[prev_id as usize].lower_bounds[axis] += 1;
                        self.bounds[axis][index].stabbing_count -= 1;
                    }

                    self.proxies[proxy_id as usize].lower_bounds[axis] -= 1;
                    self.bounds[axis].swap(index - 1, index);
                    index -= 1;
                }
            }

            // Expanding: upper endpoint moves up.
            if delta_upper > 0 {
                let mut index = upper_index;
                while index < bound_count - 1
                    && self.bounds[axis][index + 1].value <= upper_value
                {
                    let next = self.bounds[axis][index + 1];
                    let next_id = next.proxy_id;

                    self.bounds[axis][index + 1].stabbing_count += 1;

                    if next.is_lower() {
                        if self.test_overlap_values(&new_values, next_id) {
                            self.pair_manager.add_buffered_pair(proxy_id, next_id);
                        }
                        self.proxies[next_id as usize].lower_bounds[axis] -= 1;
                        self.bounds[axis][index].stabbing_count += 1;
                    } else {
                        self.proxies[next_id as usize].upper_bounds[axis] -= 1;
                        self.bounds[axis][index].stabbing_count -= 1;
                    }

                    self.proxies[proxy_id as usize].upper_bounds[axis] += 1;
                    self.bounds[axis].swap(index, index + 1);
                    index += 1;
                }
            }

            // Shrinking: lower endpoint moves up.
            if delta_lower > 0 {
                let mut index = lower_index;
                while index < bound_count - 1
                    && self.bounds[axis][index + 1].value <= lower_value
                {
                    let next = self.bounds[axis][index + 1];
                    let next_id = next.proxy_id;

                    self.bounds[axis][index + 1].stabbing_count -= 1;

                    if next.is_upper() {
                        if self.test_overlap_values(&old_values, next_id) {
                            self.pair_manager.remove_buffered_pair(proxy_id, next_id);
                        }
                        self.proxies[next_id as usize].upper_bounds[axis] -= 1;
                        self.bounds[axis][index].stabbing_count -= 1;
                    } else {
                        self.proxies[next_id as usize].lower_bounds[axis] -= 1;
                        self.bounds[axis][index].stabbing_count += 1;
                    }

                    self.proxies[proxy_id as usize].lower_bounds[axis] += 1;
                    self.bounds[axis].swap(index, index + 1);
                    index += 1;
                }
            }

            // Shrinking: upper endpoint moves down.
            if delta_upper < 0 {
                let mut index = upper_index;
                while index > 0 && upper_value < self.bounds[axis][index - 1].value {
                    let prev = self.bounds[axis][index - 1];
                    let prev_id = prev.proxy_id;

                    self.bounds[axis][index - 1].stabbing_count -= 1;

                    if prev.is_lower() {
                        if self.test_overlap_values(&old_values, prev_id) {
                            self.pair_manager.remove_buffered_pair(proxy_id, prev_id);
                        }
                        self.proxies[prev_id as usize].lower_bounds[axis] += 1;
                        self.bounds[axis][index].stabbing_count -= 1;
                    } else {
                        self.proxies[prev_id as usize].upper_bounds[axis] += 1;
                        self.bounds[axis][index].stabbing_count += 1;
                    }

                    self.proxies[proxy_id as usize].upper_bounds[axis] -= 1;
                    self.bounds[axis].swap(index - 1, index);
                    index -= 1;
                }
            }
        }

        Ok(())
    }

    /// Apply all buffered overlap changes to `callback`.
    pub fn commit(&mut self, callback: &mut dyn PairCallback) {
        self.pair_manager.commit(callback);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// All proxies whose quantized AABB overlaps `aabb`.
    pub fn query_aabb(&mut self, aabb: &Aabb) -> Vec<u16> {
        let values = self.compute_bounds(aabb);
        let bound_count = 2 * self.proxy_count;
        self.query_axis(values.lower[0], values.upper[0], 0, bound_count);
        self.query_axis(values.lower[1], values.upper[1], 1, bound_count);

        let results = core::mem::take(&mut self.query_results);
        self.time_stamp += 1;
        results
    }

    /// Proxies hit by a segment, as `(entry_lambda, proxy_id)` sorted by
    /// ascending hit parameter and capped at the `max_results` nearest hits.
    /// Candidates come from the segment's AABB; each is then slab-tested
    /// against its dequantized box.
    pub fn query_segment(
        &mut self,
        segment: &Segment,
        max_lambda: f32,
        max_results: usize,
    ) -> Vec<(f32, u16)> {
        let candidates = self.query_aabb(&segment.aabb());
        let mut hits = Vec::with_capacity(candidates.len());
        for proxy_id in candidates {
            let aabb = self.dequantized_aabb(proxy_id);
            if let Some(lambda) = aabb.ray_cast(segment, max_lambda) {
                hits.push((lambda, proxy_id));
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.truncate(max_results);
        hits
    }

    /// Reconstruct a proxy's AABB from its quantized endpoints, padded by one
    /// quantum per side to absorb the rounding.
    fn dequantized_aabb(&self, proxy_id: u16) -> Aabb {
        let p = &self.proxies[proxy_id as usize];
        let w = self.world_aabb.lower;
        let q = self.quantization_factor;
        let quantum = Vec2::new(1.0 / q.x, 1.0 / q.y);
        let lower = Vec2::new(
            w.x + self.bounds[0][p.lower_bounds[0] as usize].value as f32 / q.x,
            w.y + self.bounds[1][p.lower_bounds[1] as usize].value as f32 / q.y,
        );
        let upper = Vec2::new(
            w.x + self.bounds[0][p.upper_bounds[0] as usize].value as f32 / q.x,
            w.y + self.bounds[1][p.upper_bounds[1] as usize].value as f32 / q.y,
        );
        Aabb::new(lower - quantum, upper + quantum)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
impl BroadPhase {
    /// Consistency check: sorted endpoint order, stabbing counts, and cached
    /// endpoint indices. Panics on violation.
    fn validate(&self) {
        for axis in 0..2 {
            let bounds = &self.bounds[axis];
            assert_eq!(bounds.len(), 2 * self.proxy_count);

            let mut stabbing: u16 = 0;
            for (i, b) in bounds.iter().enumerate() {
                if i > 0 {
                    assert!(bounds[i - 1].value <= b.value, "axis {axis} unsorted at {i}");
                }
                // An upper endpoint's count excludes its own closing
                // interval, so adjust before comparing.
                if b.is_lower() {
                    stabbing += 1;
                    assert_eq!(
                        self.proxies[b.proxy_id as usize].lower_bounds[axis] as usize,
                        i
                    );
                } else {
                    stabbing -= 1;
                    assert_eq!(
                        self.proxies[b.proxy_id as usize].upper_bounds[axis] as usize,
                        i
                    );
                }
                assert_eq!(b.stabbing_count, stabbing, "axis {axis} stabbing at {i}");
            }
            assert_eq!(stabbing, 0);
        }
    }
}
