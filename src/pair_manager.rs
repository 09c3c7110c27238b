//! Buffered Proxy-Pair Manager
//!
//! The broad phase reports AABB overlap changes as they happen, in the middle
//! of its incremental sort. Those changes cannot be applied immediately: a
//! proxy move can report the same pair added and removed several times within
//! one update. This module buffers the changes and replays the *net* effect
//! at commit time, guaranteeing exactly one `pair_added` per new persistent
//! pair and exactly one `pair_removed` per dissolved one.
//!
//! Pairs are keyed by the unordered proxy-id pair, stored canonically as
//! `(min, max)` in an [`FnvHashMap`]. Pair churn is hash-heavy and the keys
//! are tiny, which is exactly the workload FNV is good at.
//!
//! Author: Moroya Sakamoto

use fnv::FnvHashMap;

/// Pair is in the change buffer awaiting commit.
const PAIR_BUFFERED: u8 = 0x01;
/// Pair's latest buffered change is a removal.
const PAIR_REMOVED: u8 = 0x02;
/// Pair has been reported to the callback as added (it is "live").
const PAIR_FINAL: u8 = 0x04;

/// A tracked proxy pair.
#[derive(Clone, Copy, Debug)]
struct Pair {
    status: u8,
    /// Client token returned by `pair_added`, handed back on removal.
    user_data: u32,
}

/// Receiver for committed pair changes.
///
/// `pair_added` returns a token (the engine stores a contact index here)
/// that is handed back to `pair_removed` when the pair dissolves.
pub trait PairCallback {
    /// A new persistent overlap between two proxies.
    fn pair_added(&mut self, proxy_a: u16, proxy_b: u16) -> u32;
    /// A previously reported overlap has ended.
    fn pair_removed(&mut self, proxy_a: u16, proxy_b: u16, user_data: u32);
}

/// Canonical unordered key.
#[inline]
fn pair_key(a: u16, b: u16) -> (u16, u16) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Buffered pair set. See the module docs for the commit protocol.
#[derive(Debug, Default)]
pub struct PairManager {
    pairs: FnvHashMap<(u16, u16), Pair>,
    buffer: Vec<(u16, u16)>,
}

impl PairManager {
    /// Empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked pairs (buffered and live).
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Buffer an overlap-begin event for a proxy pair.
    ///
    /// Add/remove flip-flops within one update collapse: a buffered removal
    /// followed by an add leaves the pair live with no callbacks fired.
    pub fn add_buffered_pair(&mut self, proxy_a: u16, proxy_b: u16) {
        debug_assert_ne!(proxy_a, proxy_b);
        let key = pair_key(proxy_a, proxy_b);
        let pair = self.pairs.entry(key).or_insert(Pair {
            status: 0,
            user_data: 0,
        });
        if pair.status & PAIR_BUFFERED == 0 {
            pair.status |= PAIR_BUFFERED;
            self.buffer.push(key);
        }
        pair.status &= !PAIR_REMOVED;
    }

    /// Buffer an overlap-end event for a proxy pair.
    pub fn remove_buffered_pair(&mut self, proxy_a: u16, proxy_b: u16) {
        debug_assert_ne!(proxy_a, proxy_b);
        let key = pair_key(proxy_a, proxy_b);
        let Some(pair) = self.pairs.get_mut(&key) else {
            // Never added; nothing to unwind.
            return;
        };
        if pair.status & PAIR_BUFFERED == 0 {
            pair.status |= PAIR_BUFFERED;
            self.buffer.push(key);
        }
        pair.status |= PAIR_REMOVED;
    }

    /// Replay the net buffered changes into `callback`.
    ///
    /// After commit the buffer is empty, every surviving pair is live, and
    /// committing again without new buffered changes is a no-op.
    pub fn commit(&mut self, callback: &mut dyn PairCallback) {
        let buffer = core::mem::take(&mut self.buffer);
        for key in buffer {
            let Some(pair) = self.pairs.get_mut(&key) else {
                continue;
            };
            pair.status &= !PAIR_BUFFERED;

            if pair.status & PAIR_REMOVED != 0 {
                let was_final = pair.status & PAIR_FINAL != 0;
                let user_data = pair.user_data;
                self.pairs.remove(&key);
                if was_final {
                    callback.pair_removed(key.0, key.1, user_data);
                }
            } else if pair.status & PAIR_FINAL == 0 {
                pair.user_data = callback.pair_added(key.0, key.1);
                pair.status |= PAIR_FINAL;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        added: Vec<(u16, u16)>,
        removed: Vec<(u16, u16, u32)>,
        next_token: u32,
    }

    impl PairCallback for Recorder {
        fn pair_added(&mut self, a: u16, b: u16) -> u32 {
            self.added.push((a, b));
            self.next_token += 1;
            self.next_token
        }
        fn pair_removed(&mut self, a: u16, b: u16, user_data: u32) {
            self.removed.push((a, b, user_data));
        }
    }

    #[test]
    fn test_add_then_commit_reports_once() {
        let mut pm = PairManager::new();
        let mut rec = Recorder::default();
        pm.add_buffered_pair(3, 1);
        pm.add_buffered_pair(1, 3); // duplicate, opposite order
        pm.commit(&mut rec);
        assert_eq!(rec.added, vec![(1, 3)]);
        assert_eq!(pm.pair_count(), 1);

        // Idempotent double commit
        pm.commit(&mut rec);
        assert_eq!(rec.added.len(), 1);
        assert!(rec.removed.is_empty());
    }

    #[test]
    fn test_add_remove_same_update_cancels() {
        let mut pm = PairManager::new();
        let mut rec = Recorder::default();
        pm.add_buffered_pair(0, 1);
        pm.remove_buffered_pair(0, 1);
        pm.commit(&mut rec);
        assert!(rec.added.is_empty());
        assert!(rec.removed.is_empty());
        assert_eq!(pm.pair_count(), 0);
    }

    #[test]
    fn test_remove_live_pair_returns_token() {
        let mut pm = PairManager::new();
        let mut rec = Recorder::default();
        pm.add_buffered_pair(0, 1);
        pm.commit(&mut rec);
        pm.remove_buffered_pair(1, 0);
        pm.commit(&mut rec);
        assert_eq!(rec.removed, vec![(0, 1, 1)]);
        assert_eq!(pm.pair_count(), 0);
    }

    #[test]
    fn test_remove_then_readd_keeps_pair_live() {
        let mut pm = PairManager::new();
        let mut rec = Recorder::default();
        pm.add_buffered_pair(4, 7);
        pm.commit(&mut rec);

        // Flip-flop within one update: net effect is "still overlapping"
        pm.remove_buffered_pair(4, 7);
        pm.add_buffered_pair(4, 7);
        pm.commit(&mut rec);
        assert_eq!(rec.added.len(), 1);
        assert!(rec.removed.is_empty());
        assert_eq!(pm.pair_count(), 1);
    }

    #[test]
    fn test_remove_unknown_pair_is_noop() {
        let mut pm = PairManager::new();
        let mut rec = Recorder::default();
        pm.remove_buffered_pair(9, 2);
        pm.commit(&mut rec);
        assert!(rec.added.is_empty() && rec.removed.is_empty());
    }
}
