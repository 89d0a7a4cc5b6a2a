use crate::common::Result;

use super::{RecordSchema, Value};

/// One table row: a null bitmap plus the fixed-width field payload.
/// The schema that lays it out lives on the owning handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    nullmap: Vec<u8>,
    data: Vec<u8>,
}

impl Record {
    /// Builds a record from one value per column; all fields are non-null.
    pub fn from_values(schema: &RecordSchema, values: &[Value]) -> Result<Self> {
        Ok(Self {
            nullmap: vec![0u8; schema.nullmap_size()],
            data: schema.encode_values(values)?,
        })
    }

    /// Wraps raw nullmap and payload bytes read back from a page.
    pub fn from_parts(nullmap: Vec<u8>, data: Vec<u8>) -> Self {
        Self { nullmap, data }
    }

    pub fn nullmap(&self) -> &[u8] {
        &self.nullmap
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.nullmap[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn set_null(&mut self, index: usize, null: bool) {
        if null {
            self.nullmap[index / 8] |= 1 << (index % 8);
        } else {
            self.nullmap[index / 8] &= !(1 << (index % 8));
        }
    }

    /// Decodes field `index` under the given schema.
    pub fn value_at(&self, schema: &RecordSchema, index: usize) -> Value {
        let column = schema.column(index);
        let offset = schema.offset(index);
        Value::decode(column.data_type(), &self.data[offset..offset + column.size()])
    }
}

/// Whole-page columnar extraction: one value vector per requested column,
/// covering the occupied slots of a single page in slot order.
#[derive(Debug, Clone)]
pub struct Chunk {
    schema: RecordSchema,
    columns: Vec<Vec<Value>>,
}

impl Chunk {
    pub fn new(schema: RecordSchema, columns: Vec<Vec<Value>>) -> Self {
        debug_assert_eq!(schema.column_count(), columns.len());
        Self { schema, columns }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn column(&self, index: usize) -> &[Value] {
        &self.columns[index]
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{Column, DataType};

    #[test]
    fn test_record_values_round_trip() {
        let schema = RecordSchema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Char(4)),
        ]);
        let record =
            Record::from_values(&schema, &[Value::Integer(7), Value::chars("ab")]).unwrap();

        assert_eq!(record.value_at(&schema, 0), Value::Integer(7));
        assert_eq!(record.value_at(&schema, 1), Value::Chars(b"ab\0\0".to_vec()));
        assert!(!record.is_null(0));
    }

    #[test]
    fn test_null_bits() {
        let schema = RecordSchema::new(vec![Column::new("id", DataType::Integer)]);
        let mut record = Record::from_values(&schema, &[Value::Integer(0)]).unwrap();

        record.set_null(0, true);
        assert!(record.is_null(0));
        record.set_null(0, false);
        assert!(!record.is_null(0));
    }
}
