use std::str::FromStr;

use crate::common::{QuarryError, Result};
use crate::storage::page::PAGE_CONTENT_SIZE;
use crate::tuple::{Chunk, RecordSchema, Value};

/// Physical layout of records within a slotted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageModel {
    /// Row store: each slot holds its nullmap and payload contiguously
    NAry,
    /// Partitioned attributes: nullmaps first, then one strip per column
    Pax,
}

impl StorageModel {
    pub fn as_u8(self) -> u8 {
        match self {
            StorageModel::NAry => 0,
            StorageModel::Pax => 1,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(StorageModel::NAry),
            1 => Ok(StorageModel::Pax),
            other => Err(QuarryError::UnknownStorageModel(other.to_string())),
        }
    }
}

impl FromStr for StorageModel {
    type Err = QuarryError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "NARY" => Ok(StorageModel::NAry),
            "PAX" => Ok(StorageModel::Pax),
            other => Err(QuarryError::UnknownStorageModel(other.to_string())),
        }
    }
}

/// Slot geometry shared by every data page of one table.
///
/// Page content layout:
///
/// NARY                              PAX
/// +--------------------+           +--------------------+
/// | occupancy bitmap   |           | occupancy bitmap   |
/// +--------------------+           +--------------------+
/// | slot 0: null | rec |           | nullmaps, row-major|
/// | slot 1: null | rec |           +--------------------+
/// | ...                |           | column 0 strip     |
/// +--------------------+           | column 1 strip     |
///                                  | ...                |
///                                  +--------------------+
#[derive(Debug, Clone)]
pub struct PageLayout {
    model: StorageModel,
    rec_size: usize,
    nullmap_size: usize,
    rec_per_page: usize,
    bitmap_size: usize,
    field_sizes: Vec<usize>,
    /// Byte offset of each column strip from the strip base (PAX)
    field_offsets: Vec<usize>,
}

impl PageLayout {
    /// Derives the densest layout the content area can hold.
    /// Fails when even a single record does not fit one page.
    pub fn derive(schema: &RecordSchema, model: StorageModel) -> Result<Self> {
        let rec_size = schema.record_len();
        let nullmap_size = schema.nullmap_size();
        let slot_width = rec_size + nullmap_size;

        let mut rec_per_page = (PAGE_CONTENT_SIZE * 8) / (slot_width * 8 + 1);
        while rec_per_page > 0
            && rec_per_page.div_ceil(8) + rec_per_page * slot_width > PAGE_CONTENT_SIZE
        {
            rec_per_page -= 1;
        }
        if rec_per_page == 0 {
            return Err(QuarryError::RecordTooLarge {
                record_size: slot_width,
            });
        }

        Ok(Self::with_capacity(schema, model, rec_per_page))
    }

    /// Builds the layout for a known record-per-page count (from a header).
    pub fn with_capacity(
        schema: &RecordSchema,
        model: StorageModel,
        rec_per_page: usize,
    ) -> Self {
        let field_sizes: Vec<usize> = schema.columns().iter().map(|c| c.size()).collect();
        let mut field_offsets = Vec::with_capacity(field_sizes.len());
        let mut offset = 0;
        for size in &field_sizes {
            field_offsets.push(offset);
            offset += size * rec_per_page;
        }

        Self {
            model,
            rec_size: schema.record_len(),
            nullmap_size: schema.nullmap_size(),
            rec_per_page,
            bitmap_size: rec_per_page.div_ceil(8),
            field_sizes,
            field_offsets,
        }
    }

    pub fn model(&self) -> StorageModel {
        self.model
    }

    pub fn rec_size(&self) -> usize {
        self.rec_size
    }

    pub fn nullmap_size(&self) -> usize {
        self.nullmap_size
    }

    pub fn rec_per_page(&self) -> usize {
        self.rec_per_page
    }

    /// Offset of a slot's nullmap within the page content.
    fn nullmap_offset(&self, slot: usize) -> usize {
        match self.model {
            StorageModel::NAry => {
                self.bitmap_size + slot * (self.nullmap_size + self.rec_size)
            }
            StorageModel::Pax => self.bitmap_size + slot * self.nullmap_size,
        }
    }

    /// Offset of field `col` of `slot` within the page content.
    fn field_offset(&self, slot: usize, col: usize, schema_offset: usize) -> usize {
        match self.model {
            StorageModel::NAry => {
                self.bitmap_size
                    + slot * (self.nullmap_size + self.rec_size)
                    + self.nullmap_size
                    + schema_offset
            }
            StorageModel::Pax => {
                let strips_base = self.bitmap_size + self.rec_per_page * self.nullmap_size;
                strips_base + self.field_offsets[col] + slot * self.field_sizes[col]
            }
        }
    }
}

pub fn bitmap_get(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

pub fn bitmap_set(bitmap: &mut [u8], index: usize, value: bool) {
    if value {
        bitmap[index / 8] |= 1 << (index % 8);
    } else {
        bitmap[index / 8] &= !(1 << (index % 8));
    }
}

/// Finds the first bit with the given value at or after `from`.
pub fn bitmap_find_first(bitmap: &[u8], len: usize, from: usize, value: bool) -> Option<usize> {
    (from..len).find(|&i| bitmap_get(bitmap, i) == value)
}

/// Read-only view of a slotted data page's content area.
pub struct TablePageRef<'a> {
    content: &'a [u8],
    layout: &'a PageLayout,
}

impl<'a> TablePageRef<'a> {
    pub fn new(content: &'a [u8], layout: &'a PageLayout) -> Self {
        Self { content, layout }
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.content[..self.layout.bitmap_size]
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        bitmap_get(self.bitmap(), slot)
    }

    /// Number of occupied slots: popcount of the occupancy bitmap.
    pub fn record_num(&self) -> usize {
        (0..self.layout.rec_per_page)
            .filter(|&i| bitmap_get(self.bitmap(), i))
            .count()
    }

    pub fn find_first(&self, from: usize, occupied: bool) -> Option<usize> {
        bitmap_find_first(self.bitmap(), self.layout.rec_per_page, from, occupied)
    }

    /// Copies a slot's nullmap and payload out of the page.
    pub fn read_slot(&self, slot: usize, schema: &RecordSchema) -> (Vec<u8>, Vec<u8>) {
        let layout = self.layout;
        let nm_off = layout.nullmap_offset(slot);
        let nullmap = self.content[nm_off..nm_off + layout.nullmap_size].to_vec();

        let mut data = vec![0u8; layout.rec_size];
        match layout.model {
            StorageModel::NAry => {
                let base = nm_off + layout.nullmap_size;
                data.copy_from_slice(&self.content[base..base + layout.rec_size]);
            }
            StorageModel::Pax => {
                for (col, column) in schema.columns().iter().enumerate() {
                    let src = layout.field_offset(slot, col, schema.offset(col));
                    let dst = schema.offset(col);
                    data[dst..dst + column.size()]
                        .copy_from_slice(&self.content[src..src + column.size()]);
                }
            }
        }
        (nullmap, data)
    }

    /// Extracts the requested columns of every occupied slot, in slot order.
    pub fn read_chunk(&self, schema: &RecordSchema, chunk_schema: &RecordSchema) -> Result<Chunk> {
        let mut source_cols = Vec::with_capacity(chunk_schema.column_count());
        for column in chunk_schema.columns() {
            let index = schema.column_index(column.name()).ok_or_else(|| {
                QuarryError::SchemaMismatch(format!(
                    "chunk column {} not in table",
                    column.name()
                ))
            })?;
            source_cols.push(index);
        }

        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); source_cols.len()];
        for slot in 0..self.layout.rec_per_page {
            if !self.is_occupied(slot) {
                continue;
            }
            for (out, &col) in columns.iter_mut().zip(&source_cols) {
                let column = schema.column(col);
                let offset = self.layout.field_offset(slot, col, schema.offset(col));
                out.push(Value::decode(
                    column.data_type(),
                    &self.content[offset..offset + column.size()],
                ));
            }
        }
        Ok(Chunk::new(chunk_schema.clone(), columns))
    }
}

/// Mutable view of a slotted data page's content area.
pub struct TablePageMut<'a> {
    content: &'a mut [u8],
    layout: &'a PageLayout,
}

impl<'a> TablePageMut<'a> {
    pub fn new(content: &'a mut [u8], layout: &'a PageLayout) -> Self {
        Self { content, layout }
    }

    pub fn as_ref(&self) -> TablePageRef<'_> {
        TablePageRef::new(&*self.content, self.layout)
    }

    pub fn set_occupied(&mut self, slot: usize, occupied: bool) {
        let bitmap = &mut self.content[..self.layout.bitmap_size];
        bitmap_set(bitmap, slot, occupied);
    }

    /// Writes a slot's nullmap and payload into the page.
    pub fn write_slot(&mut self, slot: usize, nullmap: &[u8], data: &[u8], schema: &RecordSchema) {
        let layout = self.layout;
        debug_assert_eq!(nullmap.len(), layout.nullmap_size);
        debug_assert_eq!(data.len(), layout.rec_size);

        let nm_off = layout.nullmap_offset(slot);
        self.content[nm_off..nm_off + layout.nullmap_size].copy_from_slice(nullmap);

        match layout.model {
            StorageModel::NAry => {
                let base = nm_off + layout.nullmap_size;
                self.content[base..base + layout.rec_size].copy_from_slice(data);
            }
            StorageModel::Pax => {
                for (col, column) in schema.columns().iter().enumerate() {
                    let dst = layout.field_offset(slot, col, schema.offset(col));
                    let src = schema.offset(col);
                    self.content[dst..dst + column.size()]
                        .copy_from_slice(&data[src..src + column.size()]);
                }
            }
        }
    }
}
