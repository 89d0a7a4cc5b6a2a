use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

use super::Replacer;

/// Tracks access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// History of access timestamps (most recent at back, at most k kept)
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from `current`, or None for +inf
    /// (fewer than k recorded accesses).
    fn k_distance(&self, current: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current - self.history[self.history.len() - k])
        }
    }

    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

struct LruKState {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: Timestamp,
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// The victim is the evictable frame whose backward k-distance is largest,
/// where backward k-distance is the gap between the current timestamp and the
/// frame's k-th previous access. A frame with fewer than k recorded accesses
/// has +inf distance; ties among +inf frames break toward the earliest first
/// observed timestamp. The logical clock advances on every `pin`.
pub struct LruKReplacer {
    k: usize,
    capacity: usize,
    state: Mutex<LruKState>,
}

impl LruKReplacer {
    pub fn new(k: usize, capacity: usize) -> Self {
        assert!(k >= 1);
        Self {
            k,
            capacity,
            state: Mutex::new(LruKState {
                node_store: HashMap::new(),
                current_timestamp: 0,
                num_evictable: 0,
            }),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Replacer for LruKReplacer {
    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let state = &mut *state;
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        let node = state.node_store.entry(frame_id).or_insert_with(LruKNode::new);
        node.record_access(timestamp, self.k);
        if node.is_evictable {
            node.is_evictable = false;
            state.num_evictable -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let state = &mut *state;

        match state.node_store.get_mut(&frame_id) {
            Some(node) => {
                if !node.is_evictable {
                    node.is_evictable = true;
                    state.num_evictable += 1;
                }
            }
            None => {
                if state.node_store.len() >= self.capacity {
                    return;
                }
                let mut node = LruKNode::new();
                node.is_evictable = true;
                state.node_store.insert(frame_id, node);
                state.num_evictable += 1;
            }
        }
    }

    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.num_evictable == 0 {
            return None;
        }

        let current = state.current_timestamp;

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest: Option<Timestamp> = None;

        for (frame_id, node) in state.node_store.iter() {
            if !node.is_evictable {
                continue;
            }

            let k_dist = node.k_distance(current, self.k);
            let earliest = node.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Current victim is +inf, candidate finite: keep the victim
                (None, Some(_)) => false,
                // Candidate is +inf, current victim finite: take the candidate
                (Some(_), None) => true,
                // Both +inf: earliest first-observed timestamp wins
                (None, None) => match (victim_earliest, earliest) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (Some(_), None) => true,
                    _ => false,
                },
                // Both finite: larger distance wins
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if victim.is_none() || should_replace {
                victim = Some(*frame_id);
                victim_k_dist = k_dist;
                victim_earliest = earliest;
            }
        }

        if let Some(frame_id) = victim {
            state.node_store.remove(&frame_id);
            state.num_evictable -= 1;
        }
        victim
    }

    fn size(&self) -> usize {
        self.state.lock().num_evictable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_inf_distance_outranks_finite() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0 gets k accesses, frame 1 only one
        replacer.pin(FrameId::new(0));
        replacer.pin(FrameId::new(0));
        replacer.pin(FrameId::new(1));

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_inf_ties_break_by_earliest_access() {
        let replacer = LruKReplacer::new(3, 10);

        replacer.pin(FrameId::new(0));
        replacer.pin(FrameId::new(1));
        replacer.pin(FrameId::new(1));
        replacer.pin(FrameId::new(2));

        for i in 0..3 {
            replacer.unpin(FrameId::new(i));
        }

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_largest_k_distance_wins() {
        let replacer = LruKReplacer::new(2, 10);

        for i in 0..3u32 {
            replacer.pin(FrameId::new(i));
            replacer.pin(FrameId::new(i));
        }
        for i in 0..3u32 {
            replacer.unpin(FrameId::new(i));
        }

        // Frame 0's second access is the oldest, so its k-distance is largest
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_pin_clears_evictable() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.pin(FrameId::new(0));
        replacer.unpin(FrameId::new(0));
        assert_eq!(replacer.size(), 1);

        replacer.pin(FrameId::new(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_refused_at_capacity() {
        let replacer = LruKReplacer::new(2, 1);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }
}
