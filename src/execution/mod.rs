mod index_scan;

pub use index_scan::{CmpOp, Condition, IndexScanCursor};
