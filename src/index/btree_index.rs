use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{
    FileId, PageId, QuarryError, RecordId, Result, FILE_HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page as page_layout;
use crate::storage::page::PAGE_CONTENT_SIZE;
use crate::tuple::RecordSchema;

use super::btree_page::{
    BPTreeNodeMut, BPTreeNodeRef, INTERNAL_VALUE_SIZE, LEAF_VALUE_SIZE, NODE_HEADER_SIZE,
};
use super::BPTreeIterator;

/// Persistent index metadata, stored in the content area of page 0 and
/// followed by the serialized key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BPTreeIndexHeader {
    pub root_page_id: PageId,
    /// Head of the chain of deallocated pages available for reuse
    pub first_free_page_id: PageId,
    pub tree_height: u32,
    /// Total pages in the file, header page included
    pub page_num: u32,
    pub num_entries: u64,
    pub key_size: u16,
    pub value_size: u16,
    pub leaf_max_size: u16,
    pub internal_max_size: u16,
}

const ROOT_OFFSET: usize = 0;
const FIRST_FREE_OFFSET: usize = 4;
const HEIGHT_OFFSET: usize = 8;
const PAGE_NUM_OFFSET: usize = 12;
const NUM_ENTRIES_OFFSET: usize = 16;
const KEY_SIZE_OFFSET: usize = 24;
const VALUE_SIZE_OFFSET: usize = 26;
const LEAF_MAX_OFFSET: usize = 28;
const INTERNAL_MAX_OFFSET: usize = 30;

/// Bytes of the fixed index header; the schema blob starts here.
pub const INDEX_HEADER_SIZE: usize = 32;

impl BPTreeIndexHeader {
    pub fn read_from(content: &[u8]) -> Self {
        let u32_at = |off: usize| u32::from_le_bytes(content[off..off + 4].try_into().unwrap());
        let u16_at = |off: usize| u16::from_le_bytes(content[off..off + 2].try_into().unwrap());
        Self {
            root_page_id: PageId::new(u32_at(ROOT_OFFSET)),
            first_free_page_id: PageId::new(u32_at(FIRST_FREE_OFFSET)),
            tree_height: u32_at(HEIGHT_OFFSET),
            page_num: u32_at(PAGE_NUM_OFFSET),
            num_entries: u64::from_le_bytes(
                content[NUM_ENTRIES_OFFSET..NUM_ENTRIES_OFFSET + 8]
                    .try_into()
                    .unwrap(),
            ),
            key_size: u16_at(KEY_SIZE_OFFSET),
            value_size: u16_at(VALUE_SIZE_OFFSET),
            leaf_max_size: u16_at(LEAF_MAX_OFFSET),
            internal_max_size: u16_at(INTERNAL_MAX_OFFSET),
        }
    }

    pub fn write_to(&self, content: &mut [u8]) {
        content[ROOT_OFFSET..ROOT_OFFSET + 4]
            .copy_from_slice(&self.root_page_id.as_u32().to_le_bytes());
        content[FIRST_FREE_OFFSET..FIRST_FREE_OFFSET + 4]
            .copy_from_slice(&self.first_free_page_id.as_u32().to_le_bytes());
        content[HEIGHT_OFFSET..HEIGHT_OFFSET + 4]
            .copy_from_slice(&self.tree_height.to_le_bytes());
        content[PAGE_NUM_OFFSET..PAGE_NUM_OFFSET + 4]
            .copy_from_slice(&self.page_num.to_le_bytes());
        content[NUM_ENTRIES_OFFSET..NUM_ENTRIES_OFFSET + 8]
            .copy_from_slice(&self.num_entries.to_le_bytes());
        content[KEY_SIZE_OFFSET..KEY_SIZE_OFFSET + 2]
            .copy_from_slice(&self.key_size.to_le_bytes());
        content[VALUE_SIZE_OFFSET..VALUE_SIZE_OFFSET + 2]
            .copy_from_slice(&self.value_size.to_le_bytes());
        content[LEAF_MAX_OFFSET..LEAF_MAX_OFFSET + 2]
            .copy_from_slice(&self.leaf_max_size.to_le_bytes());
        content[INTERNAL_MAX_OFFSET..INTERNAL_MAX_OFFSET + 2]
            .copy_from_slice(&self.internal_max_size.to_le_bytes());
    }
}

/// Disk-backed B+tree mapping fixed-size keys to RIDs.
///
/// Keys are compared field by field under the index's key schema. Duplicate
/// keys are permitted and keep arrival order within the leaf level. One
/// reader-writer latch covers the whole tree: lookups and scans share it,
/// structural mutation takes it exclusively, so a writer's top-down page
/// guards can never deadlock with another writer's.
pub struct BPTreeIndex {
    pub(crate) file_id: FileId,
    pub(crate) bpm: Arc<BufferPoolManager>,
    pub(crate) key_schema: RecordSchema,
    latch: RwLock<()>,
}

impl BPTreeIndex {
    /// Creates an index whose node capacities are derived from the page
    /// size. An already-initialized file is reopened instead.
    pub fn create(
        bpm: Arc<BufferPoolManager>,
        file_id: FileId,
        key_schema: RecordSchema,
    ) -> Result<Self> {
        let key_size = key_schema.record_len();
        let usable = PAGE_CONTENT_SIZE - NODE_HEADER_SIZE;
        let leaf_max = (usable / (key_size + LEAF_VALUE_SIZE)).saturating_sub(1);
        let internal_max = (usable / (key_size + INTERNAL_VALUE_SIZE)).saturating_sub(1);
        Self::create_with_capacity(bpm, file_id, key_schema, leaf_max, internal_max)
    }

    /// Creates an index with explicit node capacities (tests run with 4).
    pub fn create_with_capacity(
        bpm: Arc<BufferPoolManager>,
        file_id: FileId,
        key_schema: RecordSchema,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let key_size = key_schema.record_len();

        if INDEX_HEADER_SIZE + key_schema.serialized_size() > PAGE_CONTENT_SIZE {
            return Err(QuarryError::IndexFail(
                "key schema too large to fit the index header page".to_string(),
            ));
        }
        let leaf_bytes = NODE_HEADER_SIZE + (leaf_max_size + 1) * (key_size + LEAF_VALUE_SIZE);
        let internal_bytes =
            NODE_HEADER_SIZE + (internal_max_size + 1) * (key_size + INTERNAL_VALUE_SIZE);
        if leaf_max_size < 2
            || internal_max_size < 2
            || leaf_bytes > PAGE_CONTENT_SIZE
            || internal_bytes > PAGE_CONTENT_SIZE
        {
            return Err(QuarryError::IndexFail(
                "key too large for a B+tree node to fit a single page".to_string(),
            ));
        }

        let index = Self {
            file_id,
            bpm,
            key_schema,
            latch: RwLock::new(()),
        };

        let existing = index.read_header()?;
        if existing.page_num != 0 {
            if existing.key_size as usize != key_size {
                return Err(QuarryError::IndexFail(
                    "existing index has a different key size".to_string(),
                ));
            }
            return Ok(index);
        }

        let header = BPTreeIndexHeader {
            root_page_id: INVALID_PAGE_ID,
            first_free_page_id: INVALID_PAGE_ID,
            tree_height: 0,
            page_num: 1,
            num_entries: 0,
            key_size: key_size as u16,
            value_size: LEAF_VALUE_SIZE as u16,
            leaf_max_size: leaf_max_size as u16,
            internal_max_size: internal_max_size as u16,
        };

        let schema_blob = index.key_schema.serialize();
        {
            let mut guard = index
                .bpm
                .fetch_page_write(file_id, FILE_HEADER_PAGE_ID)?;
            let mut page = guard.data_mut();
            page_layout::init_page_header(&mut page);
            let content = page_layout::content_mut(&mut page);
            header.write_to(content);
            content[INDEX_HEADER_SIZE..INDEX_HEADER_SIZE + schema_blob.len()]
                .copy_from_slice(&schema_blob);
        }
        index.bpm.flush_page(file_id, FILE_HEADER_PAGE_ID)?;
        Ok(index)
    }

    /// Opens an existing index, recovering the key schema from the header.
    pub fn open(bpm: Arc<BufferPoolManager>, file_id: FileId) -> Result<Self> {
        let key_schema = {
            let guard = bpm.fetch_page_read(file_id, FILE_HEADER_PAGE_ID)?;
            let content = guard.content();
            let header = BPTreeIndexHeader::read_from(&content);
            if header.page_num == 0 {
                return Err(QuarryError::EmptyResource("index header page"));
            }
            RecordSchema::deserialize(&content[INDEX_HEADER_SIZE..])?
        };

        Ok(Self {
            file_id,
            bpm,
            key_schema,
            latch: RwLock::new(()),
        })
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn key_schema(&self) -> &RecordSchema {
        &self.key_schema
    }

    /// Adds a `key -> rid` mapping. Duplicate keys are permitted.
    pub fn insert(&self, key: &[u8], rid: RecordId) -> Result<()> {
        let _guard = self.latch.write();
        self.check_key(key)?;

        let header = self.read_header()?;
        if header.root_page_id == INVALID_PAGE_ID {
            self.start_new_tree(key, rid)
        } else {
            self.insert_into_leaf(key, rid)
        }
    }

    /// Removes the first entry matching `key`; false if absent.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.latch.write();
        self.check_key(key)?;

        let Some(leaf_pid) = self.find_leaf_page(key, false)? else {
            return Ok(false);
        };

        let mut guard = self.bpm.fetch_page_write(self.file_id, leaf_pid)?;
        let (removed, needs_rebalance) = {
            let mut content = guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut content);
            let removed = node.remove_leaf(key, &self.key_schema);
            let view = node.as_ref();
            (removed, view.size() <= view.min_size())
        };
        drop(guard);

        if !removed {
            return Ok(false);
        }

        let mut header = self.read_header()?;
        header.num_entries -= 1;
        self.write_header(&header)?;

        if needs_rebalance {
            self.coalesce_or_redistribute(leaf_pid)?;
        }
        Ok(true)
    }

    /// All RIDs stored under `key`, in arrival order.
    pub fn search(&self, key: &[u8]) -> Result<Vec<RecordId>> {
        let _guard = self.latch.read();
        self.check_key(key)?;
        self.collect_range(key, key)
    }

    /// RIDs of every entry with `low <= key <= high`, in ascending key order.
    pub fn search_range(&self, low: &[u8], high: &[u8]) -> Result<Vec<RecordId>> {
        let _guard = self.latch.read();
        self.check_key(low)?;
        self.check_key(high)?;
        self.collect_range(low, high)
    }

    fn collect_range(&self, low: &[u8], high: &[u8]) -> Result<Vec<RecordId>> {
        let Some(mut leaf_pid) = self.find_leaf_page_for_range(low, true)? else {
            return Ok(Vec::new());
        };

        let mut result = Vec::new();
        while leaf_pid != INVALID_PAGE_ID {
            let guard = self.bpm.fetch_page_read(self.file_id, leaf_pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);

            for i in node.lower_bound(low, &self.key_schema)..node.size() {
                if self.key_schema.compare_encoded(node.key_at(i), high) == Ordering::Greater {
                    return Ok(result);
                }
                result.push(node.rid_at(i));
            }
            leaf_pid = node.next_page_id();
        }
        Ok(result)
    }

    /// Iterator positioned at the first entry of the leftmost leaf.
    pub fn begin(&self) -> Result<BPTreeIterator<'_>> {
        let _guard = self.latch.read();
        let leaf_pid = self.find_leftmost_leaf()?.unwrap_or(INVALID_PAGE_ID);
        Ok(BPTreeIterator::new(self, leaf_pid, 0))
    }

    /// Iterator positioned at the first entry with key >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BPTreeIterator<'_>> {
        let _guard = self.latch.read();
        self.check_key(key)?;

        let Some(leaf_pid) = self.find_leaf_page_for_range(key, true)? else {
            return Ok(self.end());
        };

        let guard = self.bpm.fetch_page_read(self.file_id, leaf_pid)?;
        let content = guard.content();
        let node = BPTreeNodeRef::new(&content);
        let index = node.lower_bound(key, &self.key_schema);

        if index >= node.size() {
            Ok(BPTreeIterator::new(self, node.next_page_id(), 0))
        } else {
            Ok(BPTreeIterator::new(self, leaf_pid, index))
        }
    }

    /// Past-the-end iterator.
    pub fn end(&self) -> BPTreeIterator<'_> {
        BPTreeIterator::new(self, INVALID_PAGE_ID, 0)
    }

    /// Deallocates every node and resets the header to an empty tree.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.latch.write();

        let mut header = self.read_header()?;
        if header.root_page_id != INVALID_PAGE_ID {
            self.clear_page(header.root_page_id)?;
            header = self.read_header()?;
        }

        header.root_page_id = INVALID_PAGE_ID;
        header.first_free_page_id = INVALID_PAGE_ID;
        header.tree_height = 0;
        header.num_entries = 0;
        header.page_num = 1;
        self.write_header(&header)
    }

    pub fn size(&self) -> Result<u64> {
        let _guard = self.latch.read();
        Ok(self.read_header()?.num_entries)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let _guard = self.latch.read();
        Ok(self.read_header()?.root_page_id == INVALID_PAGE_ID)
    }

    pub fn height(&self) -> Result<u32> {
        let _guard = self.latch.read();
        Ok(self.read_header()?.tree_height)
    }

    /// Header snapshot, for callers and tests.
    pub fn header(&self) -> Result<BPTreeIndexHeader> {
        let _guard = self.latch.read();
        self.read_header()
    }

    // ---- descent ----

    /// Walks from the root to the leaf that owns `key` (or the leftmost
    /// leaf). None when the tree is empty.
    pub(crate) fn find_leaf_page(&self, key: &[u8], left_most: bool) -> Result<Option<PageId>> {
        let header = self.read_header()?;
        let mut pid = header.root_page_id;
        if pid == INVALID_PAGE_ID {
            return Ok(None);
        }

        loop {
            let guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            if node.is_leaf() {
                return Ok(Some(pid));
            }
            pid = if left_most {
                node.child_at(0)
            } else {
                node.lookup_child(key, &self.key_schema)
            };
        }
    }

    pub(crate) fn find_leftmost_leaf(&self) -> Result<Option<PageId>> {
        self.find_leaf_page(&[], true)
    }

    /// Descent variant for range endpoints: an inclusive lower bound must
    /// not skip equal keys sitting in a left subtree.
    fn find_leaf_page_for_range(&self, key: &[u8], is_lower_bound: bool) -> Result<Option<PageId>> {
        let header = self.read_header()?;
        let mut pid = header.root_page_id;
        if pid == INVALID_PAGE_ID {
            return Ok(None);
        }

        loop {
            let guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            if node.is_leaf() {
                return Ok(Some(pid));
            }
            pid = if is_lower_bound {
                node.lookup_child_lower_bound(key, &self.key_schema)
            } else {
                node.lookup_child(key, &self.key_schema)
            };
        }
    }

    // ---- insertion ----

    fn start_new_tree(&self, key: &[u8], rid: RecordId) -> Result<()> {
        let pid = self.new_page()?;

        let mut header = self.read_header()?;
        header.root_page_id = pid;
        header.tree_height = 1;
        header.num_entries += 1;
        self.write_header(&header)?;

        let mut guard = self.bpm.fetch_page_write(self.file_id, pid)?;
        let mut content = guard.content_mut();
        let mut node = BPTreeNodeMut::new(&mut content);
        node.init_leaf(
            pid,
            INVALID_PAGE_ID,
            header.key_size as usize,
            header.leaf_max_size as usize,
        );
        node.insert_leaf(key, rid, &self.key_schema);
        Ok(())
    }

    fn insert_into_leaf(&self, key: &[u8], rid: RecordId) -> Result<()> {
        let leaf_pid = self
            .find_leaf_page(key, false)?
            .ok_or(QuarryError::EmptyResource("leaf for insert"))?;

        let mut guard = self.bpm.fetch_page_write(self.file_id, leaf_pid)?;

        let fits = {
            let mut content = guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut content);
            if node.as_ref().size() < node.as_ref().max_size() {
                node.insert_leaf(key, rid, &self.key_schema);
                true
            } else {
                false
            }
        };

        if !fits {
            // Split: the upper half moves to a fresh right sibling, the new
            // entry lands on whichever side its key belongs to.
            let new_pid = self.new_page()?;
            let mut new_guard = self.bpm.fetch_page_write(self.file_id, new_pid)?;

            let middle_key = {
                let mut content = guard.content_mut();
                let mut node = BPTreeNodeMut::new(&mut content);
                let mut new_content = new_guard.content_mut();
                let mut new_node = BPTreeNodeMut::new(&mut new_content);

                let view = node.as_ref();
                new_node.init_leaf(new_pid, view.parent_page_id(), view.key_size(), view.max_size());
                drop(view);

                node.move_half_to_leaf(&mut new_node);
                let middle_key = new_node.as_ref().key_at(0).to_vec();

                if self.key_schema.compare_encoded(key, &middle_key) == Ordering::Less {
                    node.insert_leaf(key, rid, &self.key_schema);
                } else {
                    new_node.insert_leaf(key, rid, &self.key_schema);
                }

                new_node.set_next_page_id(node.as_ref().next_page_id());
                node.set_next_page_id(new_pid);
                middle_key
            };

            drop(new_guard);
            drop(guard);
            self.insert_into_parent(leaf_pid, &middle_key, new_pid)?;
        } else {
            drop(guard);
        }

        let mut header = self.read_header()?;
        header.num_entries += 1;
        self.write_header(&header)
    }

    fn insert_into_parent(&self, old_pid: PageId, key: &[u8], new_pid: PageId) -> Result<()> {
        let (is_root, parent_pid) = {
            let guard = self.bpm.fetch_page_read(self.file_id, old_pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            (node.is_root(), node.parent_page_id())
        };

        if is_root {
            return self.insert_into_new_root(old_pid, key, new_pid);
        }

        let mut guard = self.bpm.fetch_page_write(self.file_id, parent_pid)?;
        let overfull = {
            let mut content = guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut content);
            if !node.insert_node_after(old_pid, key, new_pid) {
                return Err(QuarryError::EmptyResource("split child missing from parent"));
            }
            node.as_ref().size() > node.as_ref().max_size()
        };

        if !overfull {
            return Ok(());
        }

        let new_parent_pid = self.new_page()?;
        let mut new_guard = self.bpm.fetch_page_write(self.file_id, new_parent_pid)?;

        let (push_key, moved_children) = {
            let mut content = guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut content);
            let mut new_content = new_guard.content_mut();
            let mut new_node = BPTreeNodeMut::new(&mut new_content);

            let view = node.as_ref();
            new_node.init_internal(
                new_parent_pid,
                view.parent_page_id(),
                view.key_size(),
                view.max_size(),
            );
            drop(view);

            let moved = node.move_half_to_internal(&mut new_node);
            (new_node.as_ref().key_at(0).to_vec(), moved)
        };

        drop(new_guard);
        drop(guard);

        for child in moved_children {
            self.set_parent(child, new_parent_pid)?;
        }
        self.insert_into_parent(parent_pid, &push_key, new_parent_pid)
    }

    fn insert_into_new_root(&self, old_pid: PageId, key: &[u8], new_pid: PageId) -> Result<()> {
        let root_pid = self.new_page()?;

        let mut header = self.read_header()?;
        header.root_page_id = root_pid;
        header.tree_height += 1;
        self.write_header(&header)?;

        {
            let mut guard = self.bpm.fetch_page_write(self.file_id, root_pid)?;
            let mut content = guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut content);
            node.init_internal(
                root_pid,
                INVALID_PAGE_ID,
                header.key_size as usize,
                header.internal_max_size as usize,
            );
            node.populate_new_root(old_pid, key, new_pid);
        }

        self.set_parent(old_pid, root_pid)?;
        self.set_parent(new_pid, root_pid)
    }

    fn set_parent(&self, pid: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(self.file_id, pid)?;
        let mut content = guard.content_mut();
        BPTreeNodeMut::new(&mut content).set_parent_page_id(parent);
        Ok(())
    }

    // ---- deletion ----

    fn coalesce_or_redistribute(&self, pid: PageId) -> Result<()> {
        let (is_root, parent_pid) = {
            let guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            (node.is_root(), node.parent_page_id())
        };

        if is_root {
            return self.adjust_root(pid);
        }

        let (index, neighbor_pid, can_merge) = {
            let parent_guard = self.bpm.fetch_page_read(self.file_id, parent_pid)?;
            let parent_content = parent_guard.content();
            let parent = BPTreeNodeRef::new(&parent_content);

            let index = parent
                .child_index_of(pid)
                .ok_or(QuarryError::EmptyResource("node missing from its parent"))?;
            // Sibling choice: leftmost nodes take their right neighbor,
            // everything else borrows from the left.
            let neighbor_index = if index == 0 { 1 } else { index - 1 };
            let neighbor_pid = parent.child_at(neighbor_index);

            let node_guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            let node_content = node_guard.content();
            let node = BPTreeNodeRef::new(&node_content);

            let neighbor_guard = self.bpm.fetch_page_read(self.file_id, neighbor_pid)?;
            let neighbor_content = neighbor_guard.content();
            let neighbor = BPTreeNodeRef::new(&neighbor_content);

            (
                index,
                neighbor_pid,
                neighbor.size() + node.size() <= node.max_size(),
            )
        };

        if can_merge {
            if index == 0 {
                // Leftmost: the right sibling merges into this node
                self.coalesce(pid, neighbor_pid, parent_pid, 1)
            } else {
                self.coalesce(neighbor_pid, pid, parent_pid, index)
            }
        } else {
            self.redistribute(pid, neighbor_pid, parent_pid, index)
        }
    }

    /// Merges `source` into `recipient` (its left neighbor in key order),
    /// splices the parent entry at `index` out, and frees the source page.
    fn coalesce(
        &self,
        recipient_pid: PageId,
        source_pid: PageId,
        parent_pid: PageId,
        index: usize,
    ) -> Result<()> {
        let mut recipient_guard = self.bpm.fetch_page_write(self.file_id, recipient_pid)?;
        let mut source_guard = self.bpm.fetch_page_write(self.file_id, source_pid)?;
        let mut parent_guard = self.bpm.fetch_page_write(self.file_id, parent_pid)?;

        let (moved_children, parent_needs_rebalance) = {
            let mut recipient_content = recipient_guard.content_mut();
            let mut recipient = BPTreeNodeMut::new(&mut recipient_content);
            let mut source_content = source_guard.content_mut();
            let mut source = BPTreeNodeMut::new(&mut source_content);
            let mut parent_content = parent_guard.content_mut();
            let mut parent = BPTreeNodeMut::new(&mut parent_content);

            let moved = if source.as_ref().is_leaf() {
                source.move_all_to_leaf(&mut recipient);
                Vec::new()
            } else {
                let middle_key = parent.as_ref().key_at(index).to_vec();
                source.move_all_to_internal(&mut recipient, &middle_key)
            };

            parent.remove_at(index);
            let view = parent.as_ref();
            (moved, view.size() <= view.min_size())
        };

        drop(parent_guard);
        drop(source_guard);
        drop(recipient_guard);

        for child in moved_children {
            self.set_parent(child, recipient_pid)?;
        }
        self.delete_page(source_pid)?;

        if parent_needs_rebalance {
            self.coalesce_or_redistribute(parent_pid)?;
        }
        Ok(())
    }

    /// Moves one entry from `neighbor` into `node` and refreshes the parent
    /// separator to the new boundary.
    fn redistribute(
        &self,
        node_pid: PageId,
        neighbor_pid: PageId,
        parent_pid: PageId,
        index: usize,
    ) -> Result<()> {
        let mut node_guard = self.bpm.fetch_page_write(self.file_id, node_pid)?;
        let mut neighbor_guard = self.bpm.fetch_page_write(self.file_id, neighbor_pid)?;
        let mut parent_guard = self.bpm.fetch_page_write(self.file_id, parent_pid)?;

        let reparented = {
            let mut node_content = node_guard.content_mut();
            let mut node = BPTreeNodeMut::new(&mut node_content);
            let mut neighbor_content = neighbor_guard.content_mut();
            let mut neighbor = BPTreeNodeMut::new(&mut neighbor_content);
            let mut parent_content = parent_guard.content_mut();
            let mut parent = BPTreeNodeMut::new(&mut parent_content);

            if node.as_ref().is_leaf() {
                if index == 0 {
                    // Borrow the right neighbor's first entry
                    let size = node.as_ref().size();
                    node.set_key_at(size, neighbor.as_ref().key_at(0));
                    let rid = neighbor.as_ref().rid_at(0);
                    node.set_rid_at(size, rid);
                    node.set_size(size + 1);

                    let nsize = neighbor.as_ref().size();
                    for i in 0..nsize - 1 {
                        let rid = neighbor.as_ref().rid_at(i + 1);
                        neighbor.set_key_at(i, &neighbor.as_ref().key_at(i + 1).to_vec());
                        neighbor.set_rid_at(i, rid);
                    }
                    neighbor.set_size(nsize - 1);
                    parent.set_key_at(1, neighbor.as_ref().key_at(0));
                } else {
                    // Borrow the left neighbor's last entry
                    let size = node.as_ref().size();
                    for i in (1..=size).rev() {
                        let rid = node.as_ref().rid_at(i - 1);
                        node.set_key_at(i, &node.as_ref().key_at(i - 1).to_vec());
                        node.set_rid_at(i, rid);
                    }
                    let nsize = neighbor.as_ref().size();
                    node.set_key_at(0, neighbor.as_ref().key_at(nsize - 1));
                    let rid = neighbor.as_ref().rid_at(nsize - 1);
                    node.set_rid_at(0, rid);
                    node.set_size(size + 1);
                    neighbor.set_size(nsize - 1);
                    parent.set_key_at(index, node.as_ref().key_at(0));
                }
                None
            } else if index == 0 {
                // Internal: rotate the right neighbor's first child through
                // the parent separator
                let size = node.as_ref().size();
                node.set_key_at(size, parent.as_ref().key_at(1));
                let child = neighbor.as_ref().child_at(0);
                node.set_child_at(size, child);
                node.set_size(size + 1);

                parent.set_key_at(1, neighbor.as_ref().key_at(1));
                let nsize = neighbor.as_ref().size();
                for i in 0..nsize - 1 {
                    let c = neighbor.as_ref().child_at(i + 1);
                    neighbor.set_key_at(i, &neighbor.as_ref().key_at(i + 1).to_vec());
                    neighbor.set_child_at(i, c);
                }
                neighbor.set_size(nsize - 1);
                Some(child)
            } else {
                // Internal: rotate the left neighbor's last child in front
                let size = node.as_ref().size();
                for i in (1..=size).rev() {
                    let c = node.as_ref().child_at(i - 1);
                    node.set_key_at(i, &node.as_ref().key_at(i - 1).to_vec());
                    node.set_child_at(i, c);
                }
                let nsize = neighbor.as_ref().size();
                let child = neighbor.as_ref().child_at(nsize - 1);
                node.set_child_at(0, child);
                node.set_key_at(1, parent.as_ref().key_at(index));
                parent.set_key_at(index, neighbor.as_ref().key_at(nsize - 1));
                node.set_size(size + 1);
                neighbor.set_size(nsize - 1);
                Some(child)
            }
        };

        drop(parent_guard);
        drop(neighbor_guard);
        drop(node_guard);

        if let Some(child) = reparented {
            self.set_parent(child, node_pid)?;
        }
        Ok(())
    }

    /// Shrinks the tree when the root falls below its minimum: an empty leaf
    /// root clears the tree, an internal root with one child promotes it.
    fn adjust_root(&self, root_pid: PageId) -> Result<()> {
        enum RootAction {
            Keep,
            ClearTree,
            Promote(PageId),
        }

        let action = {
            let guard = self.bpm.fetch_page_read(self.file_id, root_pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            if node.is_leaf() {
                if node.size() == 0 {
                    RootAction::ClearTree
                } else {
                    RootAction::Keep
                }
            } else if node.size() == 1 {
                RootAction::Promote(node.child_at(0))
            } else {
                RootAction::Keep
            }
        };

        match action {
            RootAction::Keep => Ok(()),
            RootAction::ClearTree => {
                let mut header = self.read_header()?;
                header.root_page_id = INVALID_PAGE_ID;
                header.tree_height = 0;
                self.write_header(&header)?;
                self.delete_page(root_pid)
            }
            RootAction::Promote(child) => {
                let mut header = self.read_header()?;
                header.root_page_id = child;
                header.tree_height -= 1;
                self.write_header(&header)?;
                self.set_parent(child, INVALID_PAGE_ID)?;
                self.delete_page(root_pid)
            }
        }
    }

    // ---- free-page management ----

    /// Pops the head of the free chain, or grows the file by one page.
    fn new_page(&self) -> Result<PageId> {
        let mut header = self.read_header()?;

        let pid = if header.first_free_page_id != INVALID_PAGE_ID {
            let pid = header.first_free_page_id;
            let guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            header.first_free_page_id = page_layout::next_free_page_id(&guard.data());
            pid
        } else {
            let pid = PageId::new(header.page_num);
            header.page_num += 1;
            pid
        };

        self.write_header(&header)?;
        Ok(pid)
    }

    /// Pushes a page onto the free chain.
    fn delete_page(&self, pid: PageId) -> Result<()> {
        let mut header = self.read_header()?;
        {
            let mut guard = self.bpm.fetch_page_write(self.file_id, pid)?;
            let mut page = guard.data_mut();
            page_layout::set_next_free_page_id(&mut page, header.first_free_page_id);
        }
        header.first_free_page_id = pid;
        self.write_header(&header)
    }

    fn clear_page(&self, pid: PageId) -> Result<()> {
        let children = {
            let guard = self.bpm.fetch_page_read(self.file_id, pid)?;
            let content = guard.content();
            let node = BPTreeNodeRef::new(&content);
            if node.is_leaf() {
                Vec::new()
            } else {
                (0..node.size()).map(|i| node.child_at(i)).collect()
            }
        };

        for child in children {
            self.clear_page(child)?;
        }
        self.delete_page(pid)
    }

    // ---- helpers ----

    pub(crate) fn read_header(&self) -> Result<BPTreeIndexHeader> {
        let guard = self.bpm.fetch_page_read(self.file_id, FILE_HEADER_PAGE_ID)?;
        let content = guard.content();
        Ok(BPTreeIndexHeader::read_from(&content))
    }

    fn write_header(&self, header: &BPTreeIndexHeader) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(self.file_id, FILE_HEADER_PAGE_ID)?;
        let mut content = guard.content_mut();
        header.write_to(&mut content);
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_schema.record_len() {
            return Err(QuarryError::SchemaMismatch(format!(
                "key of {} bytes under a schema of {}",
                key.len(),
                self.key_schema.record_len()
            )));
        }
        Ok(())
    }
}
