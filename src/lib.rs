//! Quarry - the storage-engine core of a disk-backed relational database.
//!
//! The engine caches fixed-size pages of many files in one buffer pool and
//! builds two record structures on top of it: a B+tree index from fixed-size
//! keys to record identifiers, and a slotted-page table heap. Higher layers
//! (parser, planner, executors) are external collaborators; the only one
//! modeled here is the index-scan cursor they drive.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): disk I/O and the generic on-disk page layout
//!   - `DiskManager`: synchronous page reads/writes addressed by `(file, page)`
//!   - `page`: the per-page header carrying the free-chain link
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: page table, free list and eviction
//!   - `LruReplacer` / `LruKReplacer`: pluggable replacement policies
//!   - `ReadPageGuard` / `WritePageGuard`: RAII pin lifetimes
//!
//! - **Tuple layer** (`tuple`): fixed-width schemas, values and records
//!
//! - **Table heap** (`table`): slotted-page record storage (NARY or PAX)
//!   with a free-page chain and RID-based CRUD
//!
//! - **Index** (`index`): disk-backed B+tree with range scans and iterators
//!
//! - **Execution** (`execution`): the index-scan cursor
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quarry::buffer::{BufferPoolManager, ReplacerPolicy};
//! use quarry::storage::disk::DiskManager;
//! use quarry::table::{StorageModel, TableHandle};
//! use quarry::tuple::{Column, DataType, Record, RecordSchema, Value};
//!
//! let disk = Arc::new(DiskManager::new());
//! let file_id = disk.create_file("users.tbl").unwrap();
//! let bpm = Arc::new(BufferPoolManager::new(64, ReplacerPolicy::LruK { k: 2 }, disk.clone()));
//!
//! let schema = RecordSchema::new(vec![
//!     Column::new("id", DataType::Integer),
//!     Column::new("name", DataType::Char(16)),
//! ]);
//! let table = TableHandle::create(bpm, disk, file_id, schema.clone(), StorageModel::NAry).unwrap();
//!
//! let record = Record::from_values(&schema, &[Value::Integer(1), Value::chars("ada")]).unwrap();
//! let rid = table.insert_record(&record).unwrap();
//! assert_eq!(table.get_record(rid).unwrap(), record);
//! ```

pub mod buffer;
pub mod common;
pub mod execution;
pub mod index;
pub mod storage;
pub mod table;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{FileId, PageId, QuarryError, RecordId, Result, SlotId};
