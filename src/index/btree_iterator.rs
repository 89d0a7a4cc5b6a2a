use crate::common::{PageId, RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::BPTreeNodeRef;
use super::BPTreeIndex;

/// Forward iterator over the leaf chain in ascending key order.
///
/// Holds only `(leaf page id, slot)`; each access pins the current leaf
/// through a transient read guard, so the iterator never outlasts a pin.
pub struct BPTreeIterator<'a> {
    index: &'a BPTreeIndex,
    leaf_page_id: PageId,
    slot: usize,
}

impl<'a> BPTreeIterator<'a> {
    pub(crate) fn new(index: &'a BPTreeIndex, leaf_page_id: PageId, slot: usize) -> Self {
        Self {
            index,
            leaf_page_id,
            slot,
        }
    }

    pub fn is_valid(&self) -> Result<bool> {
        if self.leaf_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let guard = self
            .index
            .bpm
            .fetch_page_read(self.index.file_id, self.leaf_page_id)?;
        let content = guard.content();
        Ok(self.slot < BPTreeNodeRef::new(&content).size())
    }

    /// Advances one entry, following the leaf chain across node boundaries.
    pub fn next(&mut self) -> Result<()> {
        let guard = self
            .index
            .bpm
            .fetch_page_read(self.index.file_id, self.leaf_page_id)?;
        let content = guard.content();
        let node = BPTreeNodeRef::new(&content);

        self.slot += 1;
        if self.slot >= node.size() {
            self.leaf_page_id = node.next_page_id();
            self.slot = 0;
        }
        Ok(())
    }

    pub fn key(&self) -> Result<Vec<u8>> {
        let guard = self
            .index
            .bpm
            .fetch_page_read(self.index.file_id, self.leaf_page_id)?;
        let content = guard.content();
        Ok(BPTreeNodeRef::new(&content).key_at(self.slot).to_vec())
    }

    pub fn rid(&self) -> Result<RecordId> {
        let guard = self
            .index
            .bpm
            .fetch_page_read(self.index.file_id, self.leaf_page_id)?;
        let content = guard.content();
        Ok(BPTreeNodeRef::new(&content).rid_at(self.slot))
    }
}

impl Iterator for BPTreeIterator<'_> {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.is_valid() {
            Ok(false) => None,
            Ok(true) => {
                let item = self.key().and_then(|key| self.rid().map(|rid| (key, rid)));
                if item.is_ok() {
                    if let Err(e) = BPTreeIterator::next(self) {
                        return Some(Err(e));
                    }
                }
                Some(item)
            }
            Err(e) => Some(Err(e)),
        }
    }
}
