mod data_type;
mod record;
mod schema;
mod value;

pub use data_type::DataType;
pub use record::{Chunk, Record};
pub use schema::{Column, RecordSchema};
pub use value::Value;
