use std::str::FromStr;

use crate::common::{FrameId, QuarryError, DEFAULT_LRUK_K};

use super::{LruKReplacer, LruReplacer};

/// Page-replacement policy contract.
///
/// The buffer pool drives a replacer through four events: `pin` when a frame
/// goes in use (also records an access), `unpin` when its pin count reaches
/// zero, `victim` when a frame must be reclaimed, and `size` for the count of
/// evictable frames. Implementations keep their own mutex, which is subsumed
/// by the buffer-pool latch when reached through the pool.
pub trait Replacer: Send + Sync {
    /// Marks `frame_id` in use and non-evictable, recording an access.
    fn pin(&self, frame_id: FrameId);

    /// Marks `frame_id` evictable, tracking it if previously unseen.
    fn unpin(&self, frame_id: FrameId);

    /// Selects and removes an evictable frame, or reports none.
    fn victim(&self) -> Option<FrameId>;

    /// Returns the number of currently evictable frames.
    fn size(&self) -> usize;
}

/// Which replacement policy a buffer pool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerPolicy {
    Lru,
    LruK { k: usize },
}

impl ReplacerPolicy {
    pub fn build(self, capacity: usize) -> Box<dyn Replacer> {
        match self {
            ReplacerPolicy::Lru => Box::new(LruReplacer::new(capacity)),
            ReplacerPolicy::LruK { k } => Box::new(LruKReplacer::new(k, capacity)),
        }
    }
}

impl FromStr for ReplacerPolicy {
    type Err = QuarryError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "LRUReplacer" => Ok(ReplacerPolicy::Lru),
            "LRUKReplacer" => Ok(ReplacerPolicy::LruK { k: DEFAULT_LRUK_K }),
            other => Err(QuarryError::UnknownReplacer(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_name() {
        assert_eq!("LRUReplacer".parse::<ReplacerPolicy>().unwrap(), ReplacerPolicy::Lru);
        assert_eq!(
            "LRUKReplacer".parse::<ReplacerPolicy>().unwrap(),
            ReplacerPolicy::LruK { k: DEFAULT_LRUK_K }
        );
        assert!(matches!(
            "ClockReplacer".parse::<ReplacerPolicy>(),
            Err(QuarryError::UnknownReplacer(_))
        ));
    }
}
