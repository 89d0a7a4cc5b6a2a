use std::cmp::Ordering;

use crate::common::{QuarryError, Result};

use super::{DataType, Record, Value};

/// A single column of a record or key schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Fixed-width record layout: columns laid out back to back in declaration
/// order. The same type describes table rows and index keys; key comparison
/// walks the concatenated fields in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    columns: Vec<Column>,
    offsets: Vec<usize>,
    record_len: usize,
}

impl RecordSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut offsets = Vec::with_capacity(columns.len());
        let mut offset = 0;
        for column in &columns {
            offsets.push(offset);
            offset += column.size();
        }
        Self {
            columns,
            offsets,
            record_len: offset,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Byte offset of column `index` within the encoded record.
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Total width of an encoded record in bytes.
    pub fn record_len(&self) -> usize {
        self.record_len
    }

    /// Width of the per-row null bitmap.
    pub fn nullmap_size(&self) -> usize {
        self.columns.len().div_ceil(8)
    }

    /// Encodes one value per column into a contiguous buffer.
    pub fn encode_values(&self, values: &[Value]) -> Result<Vec<u8>> {
        if values.len() != self.columns.len() {
            return Err(QuarryError::SchemaMismatch(format!(
                "{} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        let mut data = vec![0u8; self.record_len];
        for (i, value) in values.iter().enumerate() {
            let offset = self.offsets[i];
            value.encode_into(
                self.columns[i].data_type(),
                &mut data[offset..offset + self.columns[i].size()],
            )?;
        }
        Ok(data)
    }

    /// Compares two encoded records field by field in declaration order.
    pub fn compare_encoded(&self, a: &[u8], b: &[u8]) -> Ordering {
        debug_assert_eq!(a.len(), self.record_len);
        debug_assert_eq!(b.len(), self.record_len);
        for (i, column) in self.columns.iter().enumerate() {
            let offset = self.offsets[i];
            let end = offset + column.size();
            let ord =
                Value::compare_encoded(column.data_type(), &a[offset..end], &b[offset..end]);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Builds the encoded key for this (key) schema out of a record of
    /// `table_schema`, matching columns by name.
    pub fn project_key(&self, table_schema: &RecordSchema, record: &Record) -> Result<Vec<u8>> {
        let mut key = vec![0u8; self.record_len];
        for (i, column) in self.columns.iter().enumerate() {
            let source = table_schema.column_index(column.name()).ok_or_else(|| {
                QuarryError::SchemaMismatch(format!("key column {} not in table", column.name()))
            })?;
            if table_schema.column(source).data_type() != column.data_type() {
                return Err(QuarryError::SchemaMismatch(format!(
                    "key column {} type differs from table column",
                    column.name()
                )));
            }
            let src_off = table_schema.offset(source);
            let dst_off = self.offsets[i];
            key[dst_off..dst_off + column.size()]
                .copy_from_slice(&record.data()[src_off..src_off + column.size()]);
        }
        Ok(key)
    }

    /// Serialization format: column count (2 bytes) then per column
    /// name_len (2 bytes) + name + data type.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for column in &self.columns {
            let name = column.name().as_bytes();
            bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
            bytes.extend_from_slice(name);
            column.data_type().serialize(&mut bytes);
        }
        bytes
    }

    pub fn serialized_size(&self) -> usize {
        self.serialize().len()
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let corrupt =
            || QuarryError::SchemaMismatch("truncated serialized schema".to_string());

        if data.len() < 2 {
            return Err(corrupt());
        }
        let count = u16::from_le_bytes([data[0], data[1]]) as usize;
        let mut offset = 2;
        let mut columns = Vec::with_capacity(count);

        for _ in 0..count {
            if data.len() < offset + 2 {
                return Err(corrupt());
            }
            let name_len = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;
            if data.len() < offset + name_len {
                return Err(corrupt());
            }
            let name = String::from_utf8_lossy(&data[offset..offset + name_len]).into_owned();
            offset += name_len;

            let (data_type, used) = DataType::deserialize(&data[offset..]).ok_or_else(corrupt)?;
            offset += used;
            columns.push(Column::new(name, data_type));
        }
        Ok(Self::new(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> RecordSchema {
        RecordSchema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Char(8)),
            Column::new("score", DataType::BigInt),
        ])
    }

    #[test]
    fn test_layout_offsets() {
        let schema = sample_schema();
        assert_eq!(schema.record_len(), 20);
        assert_eq!(schema.offset(0), 0);
        assert_eq!(schema.offset(1), 4);
        assert_eq!(schema.offset(2), 12);
        assert_eq!(schema.nullmap_size(), 1);
    }

    #[test]
    fn test_serialize_round_trip() {
        let schema = sample_schema();
        let bytes = schema.serialize();
        let back = RecordSchema::deserialize(&bytes).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_compare_encoded_orders_by_first_difference() {
        let schema = sample_schema();
        let a = schema
            .encode_values(&[Value::Integer(1), Value::chars("bbb"), Value::BigInt(9)])
            .unwrap();
        let b = schema
            .encode_values(&[Value::Integer(1), Value::chars("ccc"), Value::BigInt(0)])
            .unwrap();
        assert_eq!(schema.compare_encoded(&a, &b), Ordering::Less);
    }
}
