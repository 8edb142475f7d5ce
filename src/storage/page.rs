use std::fmt;

use crate::{
    io::{read_exact, Decode, Encode},
    storage::schema::Schema,
    transaction::Transaction,
};

pub const EMPTY_PAGE_INDEX: u32 = 0;

/// Discriminates the page kinds living in the two file formats. Heap
/// files hold only `Heap` pages; B+ tree files hold the other four.
#[derive(PartialEq, Copy, Clone, Eq, Hash)]
pub enum PageCategory {
    RootPointer,
    Internal,
    Leaf,
    Header,
    Heap,
}

impl PageCategory {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PageCategory::RootPointer,
            1 => PageCategory::Internal,
            2 => PageCategory::Leaf,
            3 => PageCategory::Header,
            4 => PageCategory::Heap,
            _ => panic!("invalid page category: {}", value),
        }
    }
}

impl Encode for PageCategory {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decode for PageCategory {
    fn decode<R: std::io::Read>(reader: &mut R) -> Self {
        let value = read_exact(reader, 1);
        PageCategory::from_u8(value[0])
    }
}

impl fmt::Display for PageCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PageCategory::RootPointer => write!(f, "ROOT_POINTER"),
            PageCategory::Internal => write!(f, "INTERNAL"),
            PageCategory::Leaf => write!(f, "LEAF"),
            PageCategory::Header => write!(f, "HEADER"),
            PageCategory::Heap => write!(f, "HEAP"),
        }
    }
}

impl fmt::Debug for PageCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Identifies a unique page. The unit of locking, IO and cache
/// residency.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub category: PageCategory,
    pub table_id: u32,

    /// 0-based position of the page within its file.
    pub page_index: u32,
}

impl PageId {
    pub fn new(category: PageCategory, table_id: u32, page_index: u32) -> Self {
        Self {
            category,
            table_id,
            page_index,
        }
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }
}

/// # Format
///
/// - 1 byte: category
/// - 4 bytes: table id
/// - 4 bytes: page index
impl Encode for PageId {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.category.encode());
        buf.extend_from_slice(&self.table_id.to_le_bytes());
        buf.extend_from_slice(&self.page_index.to_le_bytes());
        buf
    }
}

impl Decode for PageId {
    fn decode<R: std::io::Read>(reader: &mut R) -> Self {
        let category = PageCategory::decode(reader);
        let table_id = u32::decode(reader);
        let page_index = u32::decode(reader);
        Self {
            category,
            table_id,
            page_index,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{}-{}-{}>",
            self.category, self.table_id, self.page_index
        )
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// State shared by every page kind: identity, parent linkage (B+ tree
/// pages only), the dirty mark with its owning transaction, and the
/// before-image snapshot used by logging and rollback.
pub struct BasePage {
    pid: PageId,

    parent_page_index: u32,

    /// The transaction that made the in-memory page differ from its
    /// on-disk image, if any.
    dirtier: Option<u64>,

    before_image: Vec<u8>,
}

impl BasePage {
    pub fn new(pid: &PageId) -> BasePage {
        BasePage {
            pid: *pid,
            parent_page_index: 0,
            dirtier: None,
            before_image: Vec::new(),
        }
    }

    pub fn get_pid(&self) -> PageId {
        self.pid
    }

    pub fn get_parent_pid(&self) -> PageId {
        let category = if self.parent_page_index == 0 {
            PageCategory::RootPointer
        } else {
            PageCategory::Internal
        };
        PageId::new(category, self.pid.table_id, self.parent_page_index)
    }

    pub fn set_parent_pid(&mut self, pid: &PageId) {
        self.parent_page_index = pid.page_index;
    }

    pub fn get_dirtier(&self) -> Option<u64> {
        self.dirtier
    }

    pub fn mark_dirty(&mut self, tx: Option<&Transaction>) {
        self.dirtier = tx.map(|t| t.get_id());
    }

    pub fn get_before_image(&self) -> Vec<u8> {
        self.before_image.clone()
    }

    pub fn set_before_image(&mut self, data: Vec<u8>) {
        self.before_image = data;
    }
}

/// The operations every cached page must offer: construction from a
/// page image, identity, serialization, and before-image management.
pub trait Page {
    fn new(pid: &PageId, bytes: &[u8], schema: &Schema, key_field: usize) -> Self
    where
        Self: Sized;

    fn get_pid(&self) -> PageId;

    fn get_parent_pid(&self) -> PageId;

    fn set_parent_pid(&mut self, pid: &PageId);

    fn get_page_data(&self) -> Vec<u8>;

    fn get_before_image(&self) -> Vec<u8>;

    /// Snapshot the current contents as the new rollback target. Called
    /// on load and at commit points.
    fn set_before_image(&mut self);

    fn get_dirtier(&self) -> Option<u64>;

    fn mark_dirty(&mut self, tx: Option<&Transaction>);
}

pub fn empty_page_data(page_size: usize) -> Vec<u8> {
    vec![0; page_size]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_round_trip() {
        let pid = PageId::new(PageCategory::Leaf, 42, 7);
        let mut reader = std::io::Cursor::new(pid.encode());
        assert_eq!(PageId::decode(&mut reader), pid);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", PageCategory::Header), "HEADER");
        assert_ne!(PageCategory::Heap, PageCategory::Leaf);
    }
}
