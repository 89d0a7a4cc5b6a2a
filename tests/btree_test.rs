//! Integration tests for the B+tree index.
//! Node capacity is fixed at 4 so a handful of keys exercises splits,
//! merges and root adjustment.

use std::sync::Arc;

use quarry::buffer::{BufferPoolManager, ReplacerPolicy};
use quarry::common::{PageId, RecordId, SlotId};
use quarry::index::BPTreeIndex;
use quarry::storage::disk::DiskManager;
use quarry::tuple::{Column, DataType, RecordSchema};
use rand::rng;
use rand::seq::SliceRandom;
use tempfile::TempDir;

fn create_index() -> (BPTreeIndex, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new());
    let fid = disk.create_file(dir.path().join("test.idx")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(
        32,
        ReplacerPolicy::LruK { k: 2 },
        disk,
    ));

    let key_schema = RecordSchema::new(vec![Column::new("k", DataType::Integer)]);
    let index = BPTreeIndex::create_with_capacity(bpm, fid, key_schema, 4, 4).unwrap();
    (index, dir)
}

fn key(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn rid(v: u32) -> RecordId {
    RecordId::new(PageId::new(v), SlotId::new(0))
}

/// Keys currently in the tree, in leaf-chain order.
fn all_keys(index: &BPTreeIndex) -> Vec<i32> {
    index
        .begin()
        .unwrap()
        .map(|item| {
            let (key, _) = item.unwrap();
            i32::from_le_bytes(key.as_slice().try_into().unwrap())
        })
        .collect()
}

#[test]
fn test_empty_tree() {
    let (index, _dir) = create_index();

    assert!(index.is_empty().unwrap());
    assert_eq!(index.height().unwrap(), 0);
    assert_eq!(index.size().unwrap(), 0);
    assert!(index.search(&key(1)).unwrap().is_empty());
    assert!(!index.delete(&key(1)).unwrap());
}

#[test]
fn test_first_split_grows_root() {
    let (index, _dir) = create_index();

    for v in [10, 20, 30, 40] {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }
    // Four keys fit the leaf root
    assert_eq!(index.height().unwrap(), 1);
    assert_eq!(index.size().unwrap(), 4);

    // The fifth insert splits the root leaf
    index.insert(&key(25), rid(25)).unwrap();
    assert_eq!(index.height().unwrap(), 2);
    assert_eq!(index.size().unwrap(), 5);

    assert_eq!(index.search(&key(25)).unwrap(), vec![rid(25)]);
    assert_eq!(all_keys(&index), vec![10, 20, 25, 30, 40]);
}

#[test]
fn test_search_range_inclusive() {
    let (index, _dir) = create_index();

    for v in 1..=10 {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }

    let rids = index.search_range(&key(3), &key(7)).unwrap();
    assert_eq!(rids, vec![rid(3), rid(4), rid(5), rid(6), rid(7)]);

    assert!(index.search_range(&key(11), &key(20)).unwrap().is_empty());
    assert_eq!(index.search_range(&key(10), &key(20)).unwrap(), vec![rid(10)]);
}

#[test]
fn test_delete_driven_coalesce_shrinks_tree() {
    let (index, _dir) = create_index();

    for v in [10, 20, 30, 40, 25] {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }
    assert_eq!(index.height().unwrap(), 2);

    assert!(index.delete(&key(40)).unwrap());
    assert!(index.delete(&key(30)).unwrap());

    // The right leaf merged back; the root is a leaf again
    assert_eq!(index.height().unwrap(), 1);
    assert_eq!(all_keys(&index), vec![10, 20, 25]);
    assert_eq!(index.size().unwrap(), 3);
}

#[test]
fn test_delete_to_empty_clears_root() {
    let (index, _dir) = create_index();

    for v in 1..=8 {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }
    for v in 1..=8 {
        assert!(index.delete(&key(v)).unwrap(), "delete {}", v);
    }

    assert!(index.is_empty().unwrap());
    assert_eq!(index.height().unwrap(), 0);
    assert_eq!(index.size().unwrap(), 0);

    // The tree accepts inserts again after going empty
    index.insert(&key(99), rid(99)).unwrap();
    assert_eq!(index.search(&key(99)).unwrap(), vec![rid(99)]);
}

#[test]
fn test_duplicate_keys_keep_arrival_order() {
    let (index, _dir) = create_index();

    index.insert(&key(7), rid(1)).unwrap();
    index.insert(&key(7), rid(2)).unwrap();
    index.insert(&key(7), rid(3)).unwrap();
    index.insert(&key(3), rid(30)).unwrap();

    assert_eq!(index.search(&key(7)).unwrap(), vec![rid(1), rid(2), rid(3)]);
    assert_eq!(index.size().unwrap(), 4);

    // Delete removes the first matching entry only
    assert!(index.delete(&key(7)).unwrap());
    assert_eq!(index.search(&key(7)).unwrap(), vec![rid(2), rid(3)]);
}

#[test]
fn test_duplicates_across_leaf_splits() {
    let (index, _dir) = create_index();

    // Enough duplicates to span several leaves at capacity 4
    for i in 0..10u32 {
        index.insert(&key(5), rid(i)).unwrap();
    }
    index.insert(&key(1), rid(100)).unwrap();
    index.insert(&key(9), rid(101)).unwrap();

    let rids = index.search(&key(5)).unwrap();
    assert_eq!(rids.len(), 10);
    assert_eq!(index.search_range(&key(5), &key(5)).unwrap().len(), 10);
}

#[test]
fn test_iterator_agrees_with_search_range() {
    let (index, _dir) = create_index();

    let mut values: Vec<i32> = (0..60).map(|i| i * 3).collect();
    values.shuffle(&mut rng());
    for &v in &values {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }

    let lo = 30;
    let hi = 120;
    let range_rids = index.search_range(&key(lo), &key(hi)).unwrap();

    let mut iter_rids = Vec::new();
    let mut iter = index.begin_at(&key(lo)).unwrap();
    while iter.is_valid().unwrap() {
        let k = i32::from_le_bytes(iter.key().unwrap().as_slice().try_into().unwrap());
        if k > hi {
            break;
        }
        iter_rids.push(iter.rid().unwrap());
        iter.next().unwrap();
    }

    assert_eq!(range_rids, iter_rids);
    assert!(!range_rids.is_empty());
}

#[test]
fn test_begin_at_positions_at_first_geq() {
    let (index, _dir) = create_index();

    for v in [10, 20, 30] {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }

    let iter = index.begin_at(&key(15)).unwrap();
    assert!(iter.is_valid().unwrap());
    assert_eq!(iter.key().unwrap(), key(20));

    let iter = index.begin_at(&key(31)).unwrap();
    assert!(!iter.is_valid().unwrap());
}

#[test]
fn test_clear_resets_tree() {
    let (index, _dir) = create_index();

    for v in 1..=20 {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }
    index.clear().unwrap();

    assert!(index.is_empty().unwrap());
    assert_eq!(index.size().unwrap(), 0);
    assert_eq!(index.height().unwrap(), 0);
    assert!(index.search(&key(5)).unwrap().is_empty());

    index.insert(&key(5), rid(5)).unwrap();
    assert_eq!(index.search(&key(5)).unwrap(), vec![rid(5)]);
}

#[test]
fn test_randomized_workload_keeps_order_and_count() {
    let (index, _dir) = create_index();

    let mut values: Vec<i32> = (0..200).collect();
    values.shuffle(&mut rng());
    for &v in &values {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }
    assert_eq!(index.size().unwrap(), 200);

    let mut deleted: Vec<i32> = values.clone();
    deleted.shuffle(&mut rng());
    deleted.truncate(100);
    for &v in &deleted {
        assert!(index.delete(&key(v)).unwrap(), "delete {}", v);
    }
    assert_eq!(index.size().unwrap(), 100);

    for v in 0..200 {
        let found = index.search(&key(v)).unwrap();
        if deleted.contains(&v) {
            assert!(found.is_empty(), "key {} should be gone", v);
        } else {
            assert_eq!(found, vec![rid(v as u32)], "key {} should remain", v);
        }
    }

    // The leaf chain yields the surviving keys in ascending order
    let keys = all_keys(&index);
    let mut expected: Vec<i32> = (0..200).filter(|v| !deleted.contains(v)).collect();
    expected.sort_unstable();
    assert_eq!(keys, expected);
}

#[test]
fn test_reopen_recovers_key_schema() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new());
    let fid = disk.create_file(dir.path().join("test.idx")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(
        32,
        ReplacerPolicy::LruK { k: 2 },
        disk.clone(),
    ));

    let key_schema = RecordSchema::new(vec![Column::new("k", DataType::Integer)]);
    {
        let index =
            BPTreeIndex::create_with_capacity(bpm.clone(), fid, key_schema.clone(), 4, 4).unwrap();
        for v in 1..=10 {
            index.insert(&key(v), rid(v as u32)).unwrap();
        }
        bpm.flush_all_pages(fid).unwrap();
    }

    let index = BPTreeIndex::open(bpm, fid).unwrap();
    assert_eq!(index.key_schema(), &key_schema);
    assert_eq!(index.size().unwrap(), 10);
    assert_eq!(index.search(&key(7)).unwrap(), vec![rid(7)]);
}

#[test]
fn test_concurrent_readers_and_writer() {
    use std::thread;

    let (index, _dir) = create_index();
    let index = Arc::new(index);

    for v in 0..50 {
        index.insert(&key(v), rid(v as u32)).unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..3 {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for v in 0..50 {
                let found = index.search(&key(v)).unwrap();
                assert!(found.len() <= 1);
            }
        }));
    }
    {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for v in 50..80 {
                index.insert(&key(v), rid(v as u32)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.size().unwrap(), 80);
    assert_eq!(all_keys(&index).len(), 80);
}
