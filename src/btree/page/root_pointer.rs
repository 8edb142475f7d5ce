use crate::{
    buffer::BufferPool,
    io::{ByteWriter, Decode},
    storage::{
        page::{BasePage, Page, PageCategory, PageId, EMPTY_PAGE_INDEX},
        schema::Schema,
    },
    transaction::Transaction,
};

/// The singleton page at offset 0 of a B+ tree file. Knows where the
/// root lives and where the header-page chain starts.
///
/// # Binary Layout
///
/// - 4 bytes: root page index
/// - 1 byte: root page category (leaf/internal)
/// - 4 bytes: first header page index (0 = none)
pub struct BTreeRootPointerPage {
    base: BasePage,

    /// Kept as a plain `PageId` instead of an `Option`: a B+ tree
    /// always has a root (a fresh file points at leaf page 1).
    root_pid: PageId,

    header_page_index: u32,
}

impl std::ops::Deref for BTreeRootPointerPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeRootPointerPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeRootPointerPage {
    pub fn get_root_pid(&self) -> PageId {
        self.root_pid
    }

    pub fn set_root_pid(&mut self, pid: &PageId) {
        self.root_pid = *pid;
    }

    pub fn get_header_pid(&self) -> Option<PageId> {
        if self.header_page_index == EMPTY_PAGE_INDEX {
            None
        } else {
            Some(PageId::new(
                PageCategory::Header,
                self.get_pid().table_id,
                self.header_page_index,
            ))
        }
    }

    pub fn set_header_pid(&mut self, pid: &PageId) {
        self.header_page_index = pid.page_index;
    }
}

impl Page for BTreeRootPointerPage {
    fn new(pid: &PageId, bytes: &[u8], _schema: &Schema, _key_field: usize) -> Self {
        let mut reader = std::io::Cursor::new(bytes);
        let root_page_index = u32::decode(&mut reader);
        let root_category = if root_page_index == EMPTY_PAGE_INDEX {
            // a freshly formatted file: the root is the first leaf
            PageCategory::Leaf
        } else {
            PageCategory::decode(&mut reader)
        };
        let header_page_index = if root_page_index == EMPTY_PAGE_INDEX {
            EMPTY_PAGE_INDEX
        } else {
            u32::decode(&mut reader)
        };

        let root_pid = PageId::new(
            root_category,
            pid.get_table_id(),
            root_page_index.max(1),
        );

        let mut page = Self {
            base: BasePage::new(pid),
            root_pid,
            header_page_index,
        };
        page.set_before_image();
        page
    }

    fn get_pid(&self) -> PageId {
        self.base.get_pid()
    }

    fn get_parent_pid(&self) -> PageId {
        self.base.get_parent_pid()
    }

    fn set_parent_pid(&mut self, pid: &PageId) {
        self.base.set_parent_pid(pid);
    }

    fn get_page_data(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();

        writer.write(&self.root_pid.page_index);
        writer.write(&self.root_pid.category);
        writer.write(&self.header_page_index);

        writer.to_padded_bytes(BufferPool::get_page_size())
    }

    fn get_before_image(&self) -> Vec<u8> {
        self.base.get_before_image()
    }

    fn set_before_image(&mut self) {
        let data = self.get_page_data();
        self.base.set_before_image(data);
    }

    fn get_dirtier(&self) -> Option<u64> {
        self.base.get_dirtier()
    }

    fn mark_dirty(&mut self, tx: Option<&Transaction>) {
        self.base.mark_dirty(tx);
    }
}
