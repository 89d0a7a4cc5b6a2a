use thiserror::Error;

use super::types::{FileId, PageId, RecordId};

/// Database error types
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool has no free frame and no evictable victim")]
    NoFreeFrame,

    #[error("Record {0} not found")]
    RecordMiss(RecordId),

    #[error("Record {0} already exists")]
    RecordExists(RecordId),

    #[error("Operation names an invalid or missing page: {0}")]
    PageMiss(PageId),

    #[error("Index initialization failed: {0}")]
    IndexFail(String),

    #[error("Expected resident resource is unavailable: {0}")]
    EmptyResource(&'static str),

    #[error("Unknown replacer: {0}")]
    UnknownReplacer(String),

    #[error("Unknown storage model: {0}")]
    UnknownStorageModel(String),

    #[error("File {0} not found")]
    FileMiss(FileId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Record of {record_size} bytes cannot fit a single page")]
    RecordTooLarge { record_size: usize },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type Result<T> = std::result::Result<T, QuarryError>;
