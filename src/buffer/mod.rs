mod buffer_pool_manager;
mod frame;
mod lru_k_replacer;
mod lru_replacer;
mod page_guard;
mod replacer;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use lru_k_replacer::LruKReplacer;
pub use lru_replacer::LruReplacer;
pub use page_guard::{ReadPageGuard, WritePageGuard};
pub use replacer::{Replacer, ReplacerPolicy};
