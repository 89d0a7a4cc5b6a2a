//! Integration tests for the LRU replacer

use quarry::buffer::{LruReplacer, Replacer};
use quarry::common::FrameId;

#[test]
fn test_victim_order_follows_unpin_recency() {
    let replacer = LruReplacer::new(10);

    for i in 0..4 {
        replacer.pin(FrameId::new(i));
    }
    for i in 0..4 {
        replacer.unpin(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 4);

    // Touch frame 1 again: it moves to the MRU end
    replacer.pin(FrameId::new(1));
    replacer.unpin(FrameId::new(1));

    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    assert_eq!(replacer.victim(), Some(FrameId::new(3)));
    assert_eq!(replacer.victim(), Some(FrameId::new(1)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_pinned_entries_are_not_victims() {
    let replacer = LruReplacer::new(10);

    replacer.pin(FrameId::new(0));
    replacer.pin(FrameId::new(1));
    replacer.unpin(FrameId::new(0));

    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    assert_eq!(replacer.victim(), None);
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_repin_removes_candidate() {
    let replacer = LruReplacer::new(10);

    replacer.pin(FrameId::new(0));
    replacer.unpin(FrameId::new(0));
    assert_eq!(replacer.size(), 1);

    replacer.pin(FrameId::new(0));
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.victim(), None);

    replacer.unpin(FrameId::new(0));
    assert_eq!(replacer.victim(), Some(FrameId::new(0)));
}

#[test]
fn test_unpin_unknown_frame_refused_at_capacity() {
    let replacer = LruReplacer::new(3);

    for i in 0..3 {
        replacer.unpin(FrameId::new(i));
    }
    // A fourth untracked frame is refused
    replacer.unpin(FrameId::new(3));
    assert_eq!(replacer.size(), 3);

    for i in 0..3 {
        assert_eq!(replacer.victim(), Some(FrameId::new(i)));
    }
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_size_counts_only_evictable() {
    let replacer = LruReplacer::new(10);

    for i in 0..5 {
        replacer.pin(FrameId::new(i));
    }
    assert_eq!(replacer.size(), 0);

    replacer.unpin(FrameId::new(2));
    replacer.unpin(FrameId::new(4));
    assert_eq!(replacer.size(), 2);
}
