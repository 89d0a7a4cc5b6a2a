//! Integration tests for the buffer pool manager

use std::sync::Arc;

use quarry::buffer::{BufferPoolManager, ReplacerPolicy};
use quarry::common::{FileId, PageId, QuarryError, PAGE_SIZE};
use quarry::storage::disk::DiskManager;
use tempfile::TempDir;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, Arc<DiskManager>, FileId, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new());
    let fid = disk.create_file(dir.path().join("test.db")).unwrap();
    let bpm = BufferPoolManager::new(pool_size, ReplacerPolicy::LruK { k: 2 }, disk.clone());
    (bpm, disk, fid, dir)
}

#[test]
fn test_read_write_round_trip() {
    let (bpm, _disk, fid, _dir) = create_bpm(8);
    let pid = PageId::new(0);

    {
        let mut guard = bpm.fetch_page_write(fid, pid).unwrap();
        let mut data = guard.data_mut();
        data[0] = 42;
        data[PAGE_SIZE - 1] = 255;
    }
    assert_eq!(bpm.pin_count(fid, pid), Some(0));

    {
        let guard = bpm.fetch_page_read(fid, pid).unwrap();
        let data = guard.data();
        assert_eq!(data[0], 42);
        assert_eq!(data[PAGE_SIZE - 1], 255);
    }
}

#[test]
fn test_eviction_flushes_dirty_page() {
    // Pool of two frames, two dirtied pages: a third fetch must evict one
    // of them with its bytes intact on disk.
    let (bpm, disk, fid, _dir) = create_bpm(2);

    {
        let mut guard = bpm.fetch_page_write(fid, PageId::new(0)).unwrap();
        guard.data_mut()[100] = 11;
    }
    {
        let mut guard = bpm.fetch_page_write(fid, PageId::new(1)).unwrap();
        guard.data_mut()[100] = 22;
    }

    // Both frames are occupied and evictable; page 2 forces an eviction
    let _guard = bpm.fetch_page_read(fid, PageId::new(2)).unwrap();

    // Page 0 saw its single access first, so LRU-K evicts it; its dirty
    // bytes must have reached disk.
    let mut data = [0u8; PAGE_SIZE];
    disk.read_page(fid, PageId::new(0), &mut data).unwrap();
    assert_eq!(data[100], 11);
}

#[test]
fn test_no_free_frame_leaves_pool_unchanged() {
    let (bpm, _disk, fid, _dir) = create_bpm(2);

    let _g0 = bpm.fetch_page_read(fid, PageId::new(0)).unwrap();
    let _g1 = bpm.fetch_page_read(fid, PageId::new(1)).unwrap();

    assert!(matches!(
        bpm.fetch_page_read(fid, PageId::new(2)),
        Err(QuarryError::NoFreeFrame)
    ));
    assert_eq!(bpm.pin_count(fid, PageId::new(0)), Some(1));
    assert_eq!(bpm.pin_count(fid, PageId::new(1)), Some(1));
    assert_eq!(bpm.pin_count(fid, PageId::new(2)), None);
}

#[test]
fn test_unpin_is_not_idempotent() {
    let (bpm, _disk, fid, _dir) = create_bpm(8);
    let pid = PageId::new(0);

    let guard = bpm.fetch_page_read(fid, pid).unwrap();
    assert_eq!(bpm.pin_count(fid, pid), Some(1));
    drop(guard);

    // The guard already released the only pin
    assert!(!bpm.unpin_page(fid, pid, false));
    assert!(!bpm.unpin_page(fid, pid, false));
    assert_eq!(bpm.pin_count(fid, pid), Some(0));
}

#[test]
fn test_flush_is_idempotent() {
    let (bpm, disk, fid, _dir) = create_bpm(8);
    let pid = PageId::new(0);

    {
        let mut guard = bpm.fetch_page_write(fid, pid).unwrap();
        guard.data_mut()[7] = 77;
    }

    assert!(bpm.flush_page(fid, pid).unwrap());
    let writes_after_first = disk.num_writes();
    assert!(bpm.flush_page(fid, pid).unwrap());
    // Second flush found a clean page and wrote nothing
    assert_eq!(disk.num_writes(), writes_after_first);

    let mut data = [0u8; PAGE_SIZE];
    disk.read_page(fid, pid, &mut data).unwrap();
    assert_eq!(data[7], 77);
}

#[test]
fn test_flush_all_pages() {
    let (bpm, disk, fid, _dir) = create_bpm(8);

    for i in 0..4u32 {
        let mut guard = bpm.fetch_page_write(fid, PageId::new(i)).unwrap();
        guard.data_mut()[0] = i as u8 + 1;
    }
    bpm.flush_all_pages(fid).unwrap();

    let mut data = [0u8; PAGE_SIZE];
    for i in 0..4u32 {
        disk.read_page(fid, PageId::new(i), &mut data).unwrap();
        assert_eq!(data[0], i as u8 + 1);
    }
}

#[test]
fn test_delete_page_refuses_while_pinned() {
    let (bpm, _disk, fid, _dir) = create_bpm(8);
    let pid = PageId::new(0);

    {
        let _guard = bpm.fetch_page_read(fid, pid).unwrap();
        assert!(matches!(
            bpm.delete_page(fid, pid),
            Err(QuarryError::PageStillPinned(_))
        ));
    }

    assert!(bpm.delete_page(fid, pid).unwrap());
    assert_eq!(bpm.pin_count(fid, pid), None);
    assert_eq!(bpm.free_frame_count(), 8);
}

#[test]
fn test_delete_all_pages_of_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new());
    let fid_a = disk.create_file(dir.path().join("a.db")).unwrap();
    let fid_b = disk.create_file(dir.path().join("b.db")).unwrap();
    let bpm = BufferPoolManager::new(8, ReplacerPolicy::Lru, disk);

    for i in 0..3u32 {
        bpm.fetch_page_read(fid_a, PageId::new(i)).unwrap();
        bpm.fetch_page_read(fid_b, PageId::new(i)).unwrap();
    }

    assert!(bpm.delete_all_pages(fid_a).unwrap());
    assert_eq!(bpm.pin_count(fid_a, PageId::new(0)), None);
    // The other file's pages stay resident
    assert_eq!(bpm.pin_count(fid_b, PageId::new(0)), Some(0));
}

#[test]
fn test_two_files_share_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new());
    let fid_a = disk.create_file(dir.path().join("a.db")).unwrap();
    let fid_b = disk.create_file(dir.path().join("b.db")).unwrap();
    let bpm = BufferPoolManager::new(8, ReplacerPolicy::LruK { k: 2 }, disk);

    {
        let mut guard = bpm.fetch_page_write(fid_a, PageId::new(0)).unwrap();
        guard.data_mut()[0] = 0xAA;
    }
    {
        let mut guard = bpm.fetch_page_write(fid_b, PageId::new(0)).unwrap();
        guard.data_mut()[0] = 0xBB;
    }

    // Same page id, different files: distinct frames
    let ga = bpm.fetch_page_read(fid_a, PageId::new(0)).unwrap();
    let gb = bpm.fetch_page_read(fid_b, PageId::new(0)).unwrap();
    assert_eq!(ga.data()[0], 0xAA);
    assert_eq!(gb.data()[0], 0xBB);
}

#[test]
fn test_lru_policy_pool() {
    let (dir, disk) = (tempfile::tempdir().unwrap(), Arc::new(DiskManager::new()));
    let fid = disk.create_file(dir.path().join("lru.db")).unwrap();
    let bpm = BufferPoolManager::new(2, ReplacerPolicy::Lru, disk.clone());

    {
        let mut guard = bpm.fetch_page_write(fid, PageId::new(0)).unwrap();
        guard.data_mut()[0] = 1;
    }
    {
        let mut guard = bpm.fetch_page_write(fid, PageId::new(1)).unwrap();
        guard.data_mut()[0] = 2;
    }

    // Page 0 is least recently used; fetching page 2 evicts it
    let _g = bpm.fetch_page_read(fid, PageId::new(2)).unwrap();
    assert_eq!(bpm.pin_count(fid, PageId::new(0)), None);

    let mut data = [0u8; PAGE_SIZE];
    disk.read_page(fid, PageId::new(0), &mut data).unwrap();
    assert_eq!(data[0], 1);
}
