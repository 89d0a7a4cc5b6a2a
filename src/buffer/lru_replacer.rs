use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

struct LruEntry {
    /// Position in the recency order; larger stamps are more recent
    stamp: u64,
    evictable: bool,
}

struct LruState {
    entries: HashMap<FrameId, LruEntry>,
    /// Recency order: iteration yields least recently pinned first
    order: BTreeMap<u64, FrameId>,
    next_stamp: u64,
    num_evictable: usize,
}

/// Classic LRU replacement policy.
///
/// Tracked frames form an insertion-ordered list; `pin` moves a frame to the
/// most-recently-used end and marks it non-evictable, `victim` removes the
/// first evictable frame in order. Unpinning an untracked frame is refused
/// once the replacer already tracks `capacity` frames.
pub struct LruReplacer {
    capacity: usize,
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_stamp: 0,
                num_evictable: 0,
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let state = &mut *state;
        let stamp = state.next_stamp;
        state.next_stamp += 1;

        if let Some(entry) = state.entries.get_mut(&frame_id) {
            if entry.evictable {
                entry.evictable = false;
                state.num_evictable -= 1;
            }
            let old_stamp = entry.stamp;
            entry.stamp = stamp;
            state.order.remove(&old_stamp);
        } else {
            state.entries.insert(
                frame_id,
                LruEntry {
                    stamp,
                    evictable: false,
                },
            );
        }
        state.order.insert(stamp, frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        let state = &mut *state;

        if let Some(entry) = state.entries.get_mut(&frame_id) {
            if !entry.evictable {
                entry.evictable = true;
                state.num_evictable += 1;
            }
        } else {
            if state.entries.len() >= self.capacity {
                return;
            }
            let stamp = state.next_stamp;
            state.next_stamp += 1;
            state.entries.insert(
                frame_id,
                LruEntry {
                    stamp,
                    evictable: true,
                },
            );
            state.order.insert(stamp, frame_id);
            state.num_evictable += 1;
        }
    }

    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        let found = state
            .order
            .iter()
            .find(|(_, fid)| state.entries[fid].evictable)
            .map(|(&stamp, &fid)| (stamp, fid));

        if let Some((stamp, frame_id)) = found {
            state.order.remove(&stamp);
            state.entries.remove(&frame_id);
            state.num_evictable -= 1;
            Some(frame_id)
        } else {
            None
        }
    }

    fn size(&self) -> usize {
        self.state.lock().num_evictable
    }
}
