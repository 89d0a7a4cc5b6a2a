use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{
    FileId, FrameId, PageId, PageKey, QuarryError, Result, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::disk::DiskManager;

use super::{Frame, ReadPageGuard, Replacer, ReplacerPolicy, WritePageGuard};

/// Book-keeping protected by the single pool latch
struct PoolState {
    /// Page table: maps resident page identities to frame IDs
    page_table: HashMap<PageKey, FrameId>,
    /// Frames that currently hold no page
    free_list: VecDeque<FrameId>,
    /// Replacement policy consulted when the free list is empty
    replacer: Box<dyn Replacer>,
}

/// Shared pool internals. Guards hold an Arc to this so their Drop can
/// release the pin they own even after the manager handle itself is gone.
pub(crate) struct PoolShared {
    frames: Vec<Arc<Frame>>,
    state: Mutex<PoolState>,
    disk: Arc<DiskManager>,
}

impl PoolShared {
    /// Decrements the pin of `(fid, pid)`, marking dirty first when asked.
    /// When the count reaches zero the frame becomes an eviction candidate.
    /// Returns false if the page is not resident or was not pinned.
    pub(crate) fn unpin_key(&self, key: PageKey, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&key) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            state.replacer.unpin(frame_id);
        }
        true
    }
}

/// BufferPoolManager mediates between the in-memory frame array and the disk
/// manager. Every page access pins a frame; the replacer observes pin and
/// unpin events and nominates victims once no free frame remains.
///
/// One mutex guards the page table, the free list and the replacer, and is
/// held across each public operation. Disk I/O on the eviction path runs
/// under it; pin counts live on the frames and change either under the latch
/// or from a guard's drop, which re-enters the pool.
pub struct BufferPoolManager {
    pool_size: usize,
    shared: Arc<PoolShared>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, policy: ReplacerPolicy, disk: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let shared = Arc::new(PoolShared {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: policy.build(pool_size),
            }),
            disk,
        });

        Self { pool_size, shared }
    }

    /// Pins `(fid, pid)` and returns a guard with read access to the page.
    pub fn fetch_page_read(&self, file_id: FileId, page_id: PageId) -> Result<ReadPageGuard> {
        let key = PageKey::new(file_id, page_id);
        let frame_id = self.fetch_page(key)?;
        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
        Ok(ReadPageGuard::new(key, frame, Arc::clone(&self.shared)))
    }

    /// Pins `(fid, pid)` and returns a guard with write access to the page.
    pub fn fetch_page_write(&self, file_id: FileId, page_id: PageId) -> Result<WritePageGuard> {
        let key = PageKey::new(file_id, page_id);
        let frame_id = self.fetch_page(key)?;
        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
        Ok(WritePageGuard::new(key, frame, Arc::clone(&self.shared)))
    }

    /// Releases one pin on `(fid, pid)`. Returns false if the page is not
    /// resident or its pin count is already zero.
    pub fn unpin_page(&self, file_id: FileId, page_id: PageId, is_dirty: bool) -> bool {
        self.shared
            .unpin_key(PageKey::new(file_id, page_id), is_dirty)
    }

    /// Writes the page out and clears its dirty flag if it is resident and
    /// dirty. Returns whether the page was resident.
    pub fn flush_page(&self, file_id: FileId, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(QuarryError::PageMiss(page_id));
        }

        let state = self.shared.state.lock();
        let key = PageKey::new(file_id, page_id);

        let Some(&frame_id) = state.page_table.get(&key) else {
            return Ok(false);
        };
        self.flush_frame(&self.shared.frames[frame_id.as_usize()])?;
        Ok(true)
    }

    /// Flushes every resident page of `file_id`.
    pub fn flush_all_pages(&self, file_id: FileId) -> Result<()> {
        let state = self.shared.state.lock();

        for (key, &frame_id) in state.page_table.iter() {
            if key.file_id == file_id {
                self.flush_frame(&self.shared.frames[frame_id.as_usize()])?;
            }
        }
        Ok(())
    }

    /// Evicts `(fid, pid)` from the pool, flushing first if dirty, and
    /// returns the frame to the free list. Refuses while the page is pinned.
    /// A page that is not resident deletes trivially.
    pub fn delete_page(&self, file_id: FileId, page_id: PageId) -> Result<bool> {
        let mut state = self.shared.state.lock();
        let key = PageKey::new(file_id, page_id);

        let Some(&frame_id) = state.page_table.get(&key) else {
            return Ok(true);
        };
        let frame = &self.shared.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Err(QuarryError::PageStillPinned(page_id));
        }

        self.flush_frame(frame)?;
        state.page_table.remove(&key);
        state.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        Ok(true)
    }

    /// `delete_page` for every resident page of `file_id`.
    /// Refuses without deleting anything if any of them is pinned.
    pub fn delete_all_pages(&self, file_id: FileId) -> Result<bool> {
        let mut state = self.shared.state.lock();

        let keys: Vec<PageKey> = state
            .page_table
            .keys()
            .filter(|k| k.file_id == file_id)
            .copied()
            .collect();

        for key in &keys {
            let frame_id = state.page_table[key];
            if self.shared.frames[frame_id.as_usize()].pin_count() > 0 {
                return Err(QuarryError::PageStillPinned(key.page_id));
            }
        }

        for key in keys {
            let frame_id = state.page_table[&key];
            let frame = &self.shared.frames[frame_id.as_usize()];
            self.flush_frame(frame)?;
            state.page_table.remove(&key);
            state.replacer.pin(frame_id);
            frame.reset();
            state.free_list.push_back(frame_id);
        }
        Ok(true)
    }

    /// Returns the pin count of a resident page, for callers and tests.
    pub fn pin_count(&self, file_id: FileId, page_id: PageId) -> Option<u32> {
        let state = self.shared.state.lock();
        state
            .page_table
            .get(&PageKey::new(file_id, page_id))
            .map(|&frame_id| self.shared.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.shared.disk
    }

    /// Writes a frame's page out if dirty and clears the dirty flag.
    fn flush_frame(&self, frame: &Frame) -> Result<()> {
        if frame.is_dirty() {
            let key = frame.key();
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.shared.disk.write_page(key.file_id, key.page_id, &data)?;
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Brings `(fid, pid)` into the pool (cache hit or disk read) and pins
    /// it. On any failure the pool state is left unchanged and no pin is
    /// acquired.
    fn fetch_page(&self, key: PageKey) -> Result<FrameId> {
        if key.page_id == INVALID_PAGE_ID {
            return Err(QuarryError::PageMiss(key.page_id));
        }

        let mut state = self.shared.state.lock();

        if let Some(&frame_id) = state.page_table.get(&key) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.pin();
            state.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.available_frame(&mut state)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        {
            let mut data = frame.data.write();
            if let Err(e) = self
                .shared
                .disk
                .read_page(key.file_id, key.page_id, &mut data[..])
            {
                drop(data);
                frame.reset();
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        frame.set_key(key);
        frame.set_dirty(false);
        frame.pin();
        state.page_table.insert(key, frame_id);
        state.replacer.pin(frame_id);
        Ok(frame_id)
    }

    /// Takes the head of the free list, or evicts a victim: a dirty victim is
    /// flushed, its page-table entry removed and its frame reset for reuse.
    fn available_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = state.replacer.victim() else {
            return Err(QuarryError::NoFreeFrame);
        };
        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_key = frame.key();

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.shared
                .disk
                .write_page(old_key.file_id, old_key.page_id, &data)?;
        }

        state.page_table.remove(&old_key);
        frame.reset();
        Ok(frame_id)
    }
}
