use crate::common::{Lsn, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Every on-disk page starts with the same generic header:
///
/// +---------------------+
/// | next_free_page_id   |  4 bytes
/// | lsn                 |  8 bytes (reserved for the log manager, always 0)
/// +---------------------+
/// | content area        |  PAGE_SIZE - 12 bytes, layout decided by consumer
/// +---------------------+
///
/// The next-free link is only meaningful while the page sits on its file's
/// free chain; live pages carry whatever the last chain traversal left there.
pub const PAGE_HEADER_SIZE: usize = 12;

/// Bytes available to the page consumer (table heap, B+tree node, file header)
pub const PAGE_CONTENT_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

const NEXT_FREE_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;

pub fn next_free_page_id(page: &[u8]) -> PageId {
    let bytes: [u8; 4] = page[NEXT_FREE_OFFSET..NEXT_FREE_OFFSET + 4]
        .try_into()
        .unwrap();
    PageId::new(u32::from_le_bytes(bytes))
}

pub fn set_next_free_page_id(page: &mut [u8], page_id: PageId) {
    page[NEXT_FREE_OFFSET..NEXT_FREE_OFFSET + 4].copy_from_slice(&page_id.as_u32().to_le_bytes());
}

pub fn page_lsn(page: &[u8]) -> Lsn {
    let bytes: [u8; 8] = page[LSN_OFFSET..LSN_OFFSET + 8].try_into().unwrap();
    u64::from_le_bytes(bytes)
}

pub fn set_page_lsn(page: &mut [u8], lsn: Lsn) {
    page[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.to_le_bytes());
}

/// Splits off the consumer-visible content area of a page.
pub fn content(page: &[u8]) -> &[u8] {
    &page[PAGE_HEADER_SIZE..]
}

pub fn content_mut(page: &mut [u8]) -> &mut [u8] {
    &mut page[PAGE_HEADER_SIZE..]
}

/// Initializes the generic header of a fresh page.
pub fn init_page_header(page: &mut [u8]) {
    set_next_free_page_id(page, INVALID_PAGE_ID);
    set_page_lsn(page, 0);
}
