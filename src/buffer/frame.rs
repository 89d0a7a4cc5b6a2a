use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageKey, PAGE_SIZE};

/// Frame manages a single slot of the buffer pool: the in-memory copy of the
/// resident page plus its pin count and dirty flag. A frame with a positive
/// pin count is never chosen as an eviction victim.
pub struct Frame {
    frame_id: FrameId,
    /// Identity of the resident page (INVALID when the frame is free)
    key: RwLock<PageKey>,
    /// Number of holders currently borrowing this frame's page
    pin_count: AtomicU32,
    /// Whether the in-memory bytes differ from the bytes on disk
    is_dirty: AtomicBool,
    /// The page bytes (pub(crate) for guard access)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            key: RwLock::new(PageKey::INVALID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn key(&self) -> PageKey {
        *self.key.read()
    }

    pub fn set_key(&self, key: PageKey) {
        *self.key.write() = key;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Copies the frame's page bytes into the given buffer.
    pub fn copy_to(&self, out: &mut [u8]) {
        assert_eq!(out.len(), PAGE_SIZE);
        let guard = self.data.read();
        out.copy_from_slice(&**guard);
    }

    /// Resets the frame to its free state.
    pub fn reset(&self) {
        *self.key.write() = PageKey::INVALID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}
