use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{
    FileId, PageId, QuarryError, RecordId, Result, SlotId, FILE_HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::disk::DiskManager;
use crate::storage::page as page_layout;
use crate::tuple::{Chunk, Record, RecordSchema};

use super::table_page::{PageLayout, StorageModel, TablePageMut, TablePageRef};

/// Persistent table metadata, stored in the content area of page 0 and
/// followed by the serialized record schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    pub rec_size: u32,
    pub nullmap_size: u32,
    pub rec_per_page: u32,
    /// Total pages in the file, header page included
    pub page_num: u32,
    /// Head of the chain of pages with at least one free slot
    pub first_free_page: PageId,
    pub storage_model: StorageModel,
}

const REC_SIZE_OFFSET: usize = 0;
const NULLMAP_SIZE_OFFSET: usize = 4;
const REC_PER_PAGE_OFFSET: usize = 8;
const PAGE_NUM_OFFSET: usize = 12;
const FIRST_FREE_OFFSET: usize = 16;
const MODEL_OFFSET: usize = 20;

/// Bytes of the fixed table header; the schema blob starts here.
pub const TABLE_HEADER_SIZE: usize = 21;

impl TableHeader {
    fn read_u32(content: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(content[offset..offset + 4].try_into().unwrap())
    }

    pub fn read_from(content: &[u8]) -> Result<Self> {
        Ok(Self {
            rec_size: Self::read_u32(content, REC_SIZE_OFFSET),
            nullmap_size: Self::read_u32(content, NULLMAP_SIZE_OFFSET),
            rec_per_page: Self::read_u32(content, REC_PER_PAGE_OFFSET),
            page_num: Self::read_u32(content, PAGE_NUM_OFFSET),
            first_free_page: PageId::new(Self::read_u32(content, FIRST_FREE_OFFSET)),
            storage_model: StorageModel::from_u8(content[MODEL_OFFSET])?,
        })
    }

    pub fn write_to(&self, content: &mut [u8]) {
        content[REC_SIZE_OFFSET..REC_SIZE_OFFSET + 4].copy_from_slice(&self.rec_size.to_le_bytes());
        content[NULLMAP_SIZE_OFFSET..NULLMAP_SIZE_OFFSET + 4]
            .copy_from_slice(&self.nullmap_size.to_le_bytes());
        content[REC_PER_PAGE_OFFSET..REC_PER_PAGE_OFFSET + 4]
            .copy_from_slice(&self.rec_per_page.to_le_bytes());
        content[PAGE_NUM_OFFSET..PAGE_NUM_OFFSET + 4].copy_from_slice(&self.page_num.to_le_bytes());
        content[FIRST_FREE_OFFSET..FIRST_FREE_OFFSET + 4]
            .copy_from_slice(&self.first_free_page.as_u32().to_le_bytes());
        content[MODEL_OFFSET] = self.storage_model.as_u8();
    }
}

/// Record heap over one table file.
///
/// Records live in slotted pages chained from the header's
/// `first_free_page`; a page joins the chain whenever it has a free slot and
/// leaves it the moment it fills. Every operation pins its target page
/// through the buffer pool for the duration of the access and unpins dirty
/// iff it mutated the page. The handle itself holds no latch - mutual
/// exclusion between writers is the caller's concern.
pub struct TableHandle {
    file_id: FileId,
    bpm: Arc<BufferPoolManager>,
    disk: Arc<DiskManager>,
    schema: RecordSchema,
    layout: PageLayout,
}

impl TableHandle {
    /// Initializes a fresh table file: derives the page layout and writes
    /// the header page.
    pub fn create(
        bpm: Arc<BufferPoolManager>,
        disk: Arc<DiskManager>,
        file_id: FileId,
        schema: RecordSchema,
        storage_model: StorageModel,
    ) -> Result<Self> {
        let layout = PageLayout::derive(&schema, storage_model)?;

        let header = TableHeader {
            rec_size: schema.record_len() as u32,
            nullmap_size: schema.nullmap_size() as u32,
            rec_per_page: layout.rec_per_page() as u32,
            page_num: 1,
            first_free_page: INVALID_PAGE_ID,
            storage_model,
        };

        let schema_blob = schema.serialize();
        {
            let mut guard = bpm.fetch_page_write(file_id, FILE_HEADER_PAGE_ID)?;
            let mut page = guard.data_mut();
            page_layout::init_page_header(&mut page);
            let content = page_layout::content_mut(&mut page);
            header.write_to(content);
            content[TABLE_HEADER_SIZE..TABLE_HEADER_SIZE + schema_blob.len()]
                .copy_from_slice(&schema_blob);
        }
        bpm.flush_page(file_id, FILE_HEADER_PAGE_ID)?;

        Ok(Self {
            file_id,
            bpm,
            disk,
            schema,
            layout,
        })
    }

    /// Opens an existing table file, recovering schema and layout from the
    /// header page.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        disk: Arc<DiskManager>,
        file_id: FileId,
    ) -> Result<Self> {
        let (header, schema) = {
            let guard = bpm.fetch_page_read(file_id, FILE_HEADER_PAGE_ID)?;
            let content = guard.content();
            let header = TableHeader::read_from(&content)?;
            let schema = RecordSchema::deserialize(&content[TABLE_HEADER_SIZE..])?;
            (header, schema)
        };

        let layout = PageLayout::with_capacity(
            &schema,
            header.storage_model,
            header.rec_per_page as usize,
        );

        Ok(Self {
            file_id,
            bpm,
            disk,
            schema,
            layout,
        })
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn storage_model(&self) -> StorageModel {
        self.layout.model()
    }

    pub fn table_name(&self) -> Result<String> {
        self.disk.file_name(self.file_id)
    }

    /// Snapshot of the persistent header, for callers and tests.
    pub fn header(&self) -> Result<TableHeader> {
        let guard = self.bpm.fetch_page_read(self.file_id, FILE_HEADER_PAGE_ID)?;
        let content = guard.content();
        TableHeader::read_from(&content)
    }

    /// Inserts a record into the first page with a free slot, allocating a
    /// new page when the free chain is empty. Returns the record's RID.
    pub fn insert_record(&self, record: &Record) -> Result<RecordId> {
        self.check_record(record)?;
        let mut header = self.header()?;

        if header.first_free_page == INVALID_PAGE_ID {
            let page_id = PageId::new(header.page_num);
            header.page_num += 1;

            let mut guard = self.bpm.fetch_page_write(self.file_id, page_id)?;
            let mut page = guard.data_mut();
            page.fill(0);
            page_layout::init_page_header(&mut page);
            page_layout::set_next_free_page_id(&mut page, header.first_free_page);
            header.first_free_page = page_id;
        }

        let page_id = header.first_free_page;
        let mut guard = self.bpm.fetch_page_write(self.file_id, page_id)?;

        let (slot, now_full) = {
            let mut content = guard.content_mut();
            let mut page = TablePageMut::new(&mut content, &self.layout);
            let slot = page
                .as_ref()
                .find_first(0, false)
                .ok_or(QuarryError::EmptyResource("free slot on free-chain page"))?;
            page.write_slot(slot, record.nullmap(), record.data(), &self.schema);
            page.set_occupied(slot, true);
            (slot, page.as_ref().record_num() == self.layout.rec_per_page())
        };

        if now_full {
            // Full pages leave the chain; the insert path only ever uses the head.
            let mut page = guard.data_mut();
            header.first_free_page = page_layout::next_free_page_id(&page);
            page_layout::set_next_free_page_id(&mut page, INVALID_PAGE_ID);
        }
        drop(guard);
        self.write_header(&header)?;

        Ok(RecordId::new(page_id, SlotId::new(slot as u16)))
    }

    /// Inserts a record at a caller-chosen RID; the slot must be empty.
    pub fn insert_record_at(&self, rid: RecordId, record: &Record) -> Result<()> {
        self.check_record(record)?;
        let mut header = self.header()?;
        self.check_rid(&header, rid)?;

        let mut guard = self.bpm.fetch_page_write(self.file_id, rid.page_id)?;

        let now_full = {
            let mut content = guard.content_mut();
            let mut page = TablePageMut::new(&mut content, &self.layout);
            if page.as_ref().is_occupied(rid.slot_id.as_usize()) {
                return Err(QuarryError::RecordExists(rid));
            }
            page.write_slot(
                rid.slot_id.as_usize(),
                record.nullmap(),
                record.data(),
                &self.schema,
            );
            page.set_occupied(rid.slot_id.as_usize(), true);
            page.as_ref().record_num() == self.layout.rec_per_page()
        };

        if now_full && header.first_free_page == rid.page_id {
            let mut page = guard.data_mut();
            header.first_free_page = page_layout::next_free_page_id(&page);
            page_layout::set_next_free_page_id(&mut page, INVALID_PAGE_ID);
            drop(page);
            drop(guard);
            self.write_header(&header)?;
        }
        Ok(())
    }

    /// Returns a copy of the record at `rid`.
    pub fn get_record(&self, rid: RecordId) -> Result<Record> {
        let header = self.header()?;
        self.check_rid(&header, rid)?;

        let guard = self.bpm.fetch_page_read(self.file_id, rid.page_id)?;
        let content = guard.content();
        let page = TablePageRef::new(&content, &self.layout);

        if !page.is_occupied(rid.slot_id.as_usize()) {
            return Err(QuarryError::RecordMiss(rid));
        }
        let (nullmap, data) = page.read_slot(rid.slot_id.as_usize(), &self.schema);
        Ok(Record::from_parts(nullmap, data))
    }

    /// Extracts the requested columns of every record on one page.
    pub fn get_chunk(&self, page_id: PageId, chunk_schema: &RecordSchema) -> Result<Chunk> {
        let header = self.header()?;
        if page_id == INVALID_PAGE_ID
            || page_id == FILE_HEADER_PAGE_ID
            || page_id.as_u32() >= header.page_num
        {
            return Err(QuarryError::PageMiss(page_id));
        }

        let guard = self.bpm.fetch_page_read(self.file_id, page_id)?;
        let content = guard.content();
        TablePageRef::new(&content, &self.layout).read_chunk(&self.schema, chunk_schema)
    }

    /// Overwrites the record at `rid` in place.
    pub fn update_record(&self, rid: RecordId, record: &Record) -> Result<()> {
        self.check_record(record)?;
        let header = self.header()?;
        self.check_rid(&header, rid)?;

        let mut guard = self.bpm.fetch_page_write(self.file_id, rid.page_id)?;
        let mut content = guard.content_mut();
        let mut page = TablePageMut::new(&mut content, &self.layout);

        if !page.as_ref().is_occupied(rid.slot_id.as_usize()) {
            return Err(QuarryError::RecordMiss(rid));
        }
        page.write_slot(
            rid.slot_id.as_usize(),
            record.nullmap(),
            record.data(),
            &self.schema,
        );
        Ok(())
    }

    /// Clears the record's slot. A page that was full rejoins the free chain.
    pub fn delete_record(&self, rid: RecordId) -> Result<()> {
        let mut header = self.header()?;
        self.check_rid(&header, rid)?;

        let mut guard = self.bpm.fetch_page_write(self.file_id, rid.page_id)?;

        let was_full = {
            let mut content = guard.content_mut();
            let mut page = TablePageMut::new(&mut content, &self.layout);
            if !page.as_ref().is_occupied(rid.slot_id.as_usize()) {
                return Err(QuarryError::RecordMiss(rid));
            }
            let was_full = page.as_ref().record_num() == self.layout.rec_per_page();
            page.set_occupied(rid.slot_id.as_usize(), false);
            was_full
        };

        if was_full {
            let mut page = guard.data_mut();
            page_layout::set_next_free_page_id(&mut page, header.first_free_page);
            header.first_free_page = rid.page_id;
            drop(page);
            drop(guard);
            self.write_header(&header)?;
        }
        Ok(())
    }

    /// First occupied slot in page order, or None for an empty table.
    pub fn first_rid(&self) -> Result<Option<RecordId>> {
        let header = self.header()?;
        let mut page_id = FILE_HEADER_PAGE_ID.as_u32() + 1;

        while page_id < header.page_num {
            let guard = self.bpm.fetch_page_read(self.file_id, PageId::new(page_id))?;
            let content = guard.content();
            let page = TablePageRef::new(&content, &self.layout);
            if let Some(slot) = page.find_first(0, true) {
                return Ok(Some(RecordId::new(
                    PageId::new(page_id),
                    SlotId::new(slot as u16),
                )));
            }
            page_id += 1;
        }
        Ok(None)
    }

    /// Next occupied slot after `rid` in (page, slot) order.
    pub fn next_rid(&self, rid: RecordId) -> Result<Option<RecordId>> {
        let header = self.header()?;
        let mut page_id = rid.page_id.as_u32();
        let mut from = rid.slot_id.as_usize() + 1;

        while page_id < header.page_num {
            let guard = self.bpm.fetch_page_read(self.file_id, PageId::new(page_id))?;
            let content = guard.content();
            let page = TablePageRef::new(&content, &self.layout);
            if let Some(slot) = page.find_first(from, true) {
                return Ok(Some(RecordId::new(
                    PageId::new(page_id),
                    SlotId::new(slot as u16),
                )));
            }
            page_id += 1;
            from = 0;
        }
        Ok(None)
    }

    fn write_header(&self, header: &TableHeader) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(self.file_id, FILE_HEADER_PAGE_ID)?;
        let mut content = guard.content_mut();
        header.write_to(&mut content);
        Ok(())
    }

    fn check_record(&self, record: &Record) -> Result<()> {
        if record.data().len() != self.layout.rec_size()
            || record.nullmap().len() != self.layout.nullmap_size()
        {
            return Err(QuarryError::SchemaMismatch(format!(
                "record of {} bytes does not match table record size {}",
                record.data().len(),
                self.layout.rec_size()
            )));
        }
        Ok(())
    }

    fn check_rid(&self, header: &TableHeader, rid: RecordId) -> Result<()> {
        if rid.page_id == INVALID_PAGE_ID
            || rid.page_id == FILE_HEADER_PAGE_ID
            || rid.page_id.as_u32() >= header.page_num
        {
            return Err(QuarryError::PageMiss(rid.page_id));
        }
        if rid.slot_id.as_usize() >= self.layout.rec_per_page() {
            return Err(QuarryError::RecordMiss(rid));
        }
        Ok(())
    }
}
