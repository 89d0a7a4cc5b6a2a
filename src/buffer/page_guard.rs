use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard,
};

use crate::common::{FileId, PageId, PageKey};
use crate::storage::page::PAGE_HEADER_SIZE;

use super::buffer_pool_manager::PoolShared;
use super::Frame;

/// RAII guard for read access to a pinned page.
///
/// The guard owns exactly one pin on `(file_id, page_id)`; dropping it unpins
/// with `is_dirty = false`. Page bytes are borrowed per accessor call from
/// the frame's lock, so pins never exclude one another - mutual exclusion
/// between writers of the same page is the caller's responsibility.
pub struct ReadPageGuard {
    key: PageKey,
    frame: Arc<Frame>,
    pool: Arc<PoolShared>,
}

impl ReadPageGuard {
    pub(crate) fn new(key: PageKey, frame: Arc<Frame>, pool: Arc<PoolShared>) -> Self {
        Self { key, frame, pool }
    }

    pub fn file_id(&self) -> FileId {
        self.key.file_id
    }

    pub fn page_id(&self) -> PageId {
        self.key.page_id
    }

    /// Borrows the whole page, generic header included.
    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.frame.data.read(), |d| &d[..])
    }

    /// Borrows the consumer-visible content area of the page.
    pub fn content(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.frame.data.read(), |d| &d[PAGE_HEADER_SIZE..])
    }

    /// Releases the pin early.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.pool.unpin_key(self.key, false);
    }
}

/// RAII guard for write access to a pinned page.
/// Dropping it unpins with `is_dirty = true`.
pub struct WritePageGuard {
    key: PageKey,
    frame: Arc<Frame>,
    pool: Arc<PoolShared>,
}

impl WritePageGuard {
    pub(crate) fn new(key: PageKey, frame: Arc<Frame>, pool: Arc<PoolShared>) -> Self {
        Self { key, frame, pool }
    }

    pub fn file_id(&self) -> FileId {
        self.key.file_id
    }

    pub fn page_id(&self) -> PageId {
        self.key.page_id
    }

    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.frame.data.read(), |d| &d[..])
    }

    pub fn data_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.frame.data.write(), |d| &mut d[..])
    }

    pub fn content(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.frame.data.read(), |d| &d[PAGE_HEADER_SIZE..])
    }

    pub fn content_mut(&mut self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.frame.data.write(), |d| &mut d[PAGE_HEADER_SIZE..])
    }

    /// Releases the pin early.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.pool.unpin_key(self.key, true);
    }
}
