mod page_layout;

pub use page_layout::*;
