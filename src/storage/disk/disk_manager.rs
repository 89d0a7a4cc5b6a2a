use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::common::{FileId, PageId, QuarryError, Result, PAGE_SIZE};

struct FileSlot {
    path: PathBuf,
    file: Mutex<File>,
}

/// DiskManager owns the persistent page bytes of every open database file.
/// Pages are addressed by `(file_id, page_id)`; all I/O is synchronous and
/// operates on whole PAGE_SIZE blocks.
///
/// The outer RwLock allows concurrent I/O against different files; the inner
/// Mutex serializes access to each file's cursor.
pub struct DiskManager {
    files: RwLock<HashMap<FileId, FileSlot>>,
    next_file_id: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            next_file_id: AtomicU32::new(0),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        }
    }

    /// Creates the file at `path` (or opens it if it already exists) and
    /// registers it, returning its file ID.
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        Ok(self.register(path.as_ref().to_path_buf(), file))
    }

    /// Opens an existing file at `path` and registers it.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Ok(self.register(path.as_ref().to_path_buf(), file))
    }

    fn register(&self, path: PathBuf, file: File) -> FileId {
        let file_id = FileId::new(self.next_file_id.fetch_add(1, Ordering::SeqCst));
        self.files.write().insert(
            file_id,
            FileSlot {
                path,
                file: Mutex::new(file),
            },
        );
        file_id
    }

    /// Syncs and unregisters a file.
    pub fn close_file(&self, file_id: FileId) -> Result<()> {
        let slot = self
            .files
            .write()
            .remove(&file_id)
            .ok_or(QuarryError::FileMiss(file_id))?;
        slot.file.lock().sync_all()?;
        Ok(())
    }

    /// Reads a page from disk into the provided buffer.
    /// Reads past the end of the file yield zeroed bytes.
    pub fn read_page(&self, file_id: FileId, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let files = self.files.read();
        let slot = files.get(&file_id).ok_or(QuarryError::FileMiss(file_id))?;

        let mut file = slot.file.lock();
        file.seek(SeekFrom::Start(page_id.as_u64() * PAGE_SIZE as u64))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer, extending the file
    /// when the page lies past its current end.
    pub fn write_page(&self, file_id: FileId, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let files = self.files.read();
        let slot = files.get(&file_id).ok_or(QuarryError::FileMiss(file_id))?;

        let mut file = slot.file.lock();
        file.seek(SeekFrom::Start(page_id.as_u64() * PAGE_SIZE as u64))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the display name of a file (its final path component).
    pub fn file_name(&self, file_id: FileId) -> Result<String> {
        let files = self.files.read();
        let slot = files.get(&file_id).ok_or(QuarryError::FileMiss(file_id))?;
        Ok(slot
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn sync(&self) -> Result<()> {
        let files = self.files.read();
        for slot in files.values() {
            slot.file.lock().sync_all()?;
        }
        Ok(())
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let files = self.files.get_mut();
        for slot in files.values_mut() {
            let _ = slot.file.get_mut().sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new();
        let fid = dm.create_file(dir.path().join("z.db")).unwrap();

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(fid, PageId::new(3), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new();
        let fid = dm.create_file(dir.path().join("rw.db")).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        out[0] = 42;
        out[PAGE_SIZE - 1] = 128;
        dm.write_page(fid, PageId::new(1), &out).unwrap();

        let mut back = [0u8; PAGE_SIZE];
        dm.read_page(fid, PageId::new(1), &mut back).unwrap();
        assert_eq!(back[0], 42);
        assert_eq!(back[PAGE_SIZE - 1], 128);
    }
}
