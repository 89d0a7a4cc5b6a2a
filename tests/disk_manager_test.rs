//! Integration tests for the disk manager

use quarry::common::{PageId, QuarryError, PAGE_SIZE};
use quarry::storage::disk::DiskManager;

#[test]
fn test_create_write_read() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    let fid = dm.create_file(dir.path().join("a.db")).unwrap();

    let mut out = [0u8; PAGE_SIZE];
    out[0] = 1;
    out[4095] = 2;
    dm.write_page(fid, PageId::new(0), &out).unwrap();

    let mut back = [0u8; PAGE_SIZE];
    dm.read_page(fid, PageId::new(0), &mut back).unwrap();
    assert_eq!(back[0], 1);
    assert_eq!(back[4095], 2);
}

#[test]
fn test_sparse_write_extends_file() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    let fid = dm.create_file(dir.path().join("sparse.db")).unwrap();

    let data = [9u8; PAGE_SIZE];
    dm.write_page(fid, PageId::new(5), &data).unwrap();

    // The gap pages read back zeroed
    let mut back = [7u8; PAGE_SIZE];
    dm.read_page(fid, PageId::new(2), &mut back).unwrap();
    assert!(back.iter().all(|&b| b == 0));

    dm.read_page(fid, PageId::new(5), &mut back).unwrap();
    assert!(back.iter().all(|&b| b == 9));
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");

    {
        let dm = DiskManager::new();
        let fid = dm.create_file(&path).unwrap();
        let data = [123u8; PAGE_SIZE];
        dm.write_page(fid, PageId::new(1), &data).unwrap();
    }

    let dm = DiskManager::new();
    let fid = dm.open_file(&path).unwrap();
    let mut back = [0u8; PAGE_SIZE];
    dm.read_page(fid, PageId::new(1), &mut back).unwrap();
    assert_eq!(back[0], 123);
}

#[test]
fn test_open_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    assert!(dm.open_file(dir.path().join("missing.db")).is_err());
}

#[test]
fn test_independent_files() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    let fid_a = dm.create_file(dir.path().join("a.db")).unwrap();
    let fid_b = dm.create_file(dir.path().join("b.db")).unwrap();
    assert_ne!(fid_a, fid_b);

    let a = [0xAAu8; PAGE_SIZE];
    let b = [0xBBu8; PAGE_SIZE];
    dm.write_page(fid_a, PageId::new(0), &a).unwrap();
    dm.write_page(fid_b, PageId::new(0), &b).unwrap();

    let mut back = [0u8; PAGE_SIZE];
    dm.read_page(fid_a, PageId::new(0), &mut back).unwrap();
    assert_eq!(back[0], 0xAA);
    dm.read_page(fid_b, PageId::new(0), &mut back).unwrap();
    assert_eq!(back[0], 0xBB);
}

#[test]
fn test_file_name_and_close() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    let fid = dm.create_file(dir.path().join("users.tbl")).unwrap();

    assert_eq!(dm.file_name(fid).unwrap(), "users.tbl");

    dm.close_file(fid).unwrap();
    assert!(matches!(
        dm.file_name(fid),
        Err(QuarryError::FileMiss(_))
    ));
    assert!(matches!(
        dm.read_page(fid, PageId::new(0), &mut [0u8; PAGE_SIZE]),
        Err(QuarryError::FileMiss(_))
    ));
}

#[test]
fn test_io_counters() {
    let dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new();
    let fid = dm.create_file(dir.path().join("count.db")).unwrap();

    let data = [0u8; PAGE_SIZE];
    let mut buf = [0u8; PAGE_SIZE];
    dm.write_page(fid, PageId::new(0), &data).unwrap();
    dm.write_page(fid, PageId::new(1), &data).unwrap();
    dm.read_page(fid, PageId::new(0), &mut buf).unwrap();

    assert_eq!(dm.num_writes(), 2);
    assert_eq!(dm.num_reads(), 1);
}
