use bit_vec::BitVec;

use crate::{
    buffer::BufferPool,
    io::{bitmap_from_bytes, bitmap_to_bytes, ByteWriter},
    storage::{
        page::{BasePage, Page, PageId},
        schema::Schema,
    },
    transaction::Transaction,
};

/// Tracks pages of the B+ tree file that were freed by merges and can
/// be handed out again. A set bit means the page index is free.
///
/// # Binary Layout
///
/// - 2 bytes: bitmap slot count
/// - ceil(n/8) bytes: bitmap (slot 0 is bit 0 of byte 0)
pub struct BTreeHeaderPage {
    base: BasePage,

    header: BitVec,

    slot_count: usize,
}

impl BTreeHeaderPage {
    /// One header page covers as many page indexes as its body has
    /// bits, which is plenty for a teaching engine.
    fn calculate_slots_count() -> usize {
        (BufferPool::get_page_size() - 2) * 8
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    /// Mark a page index as free (true) or in use (false).
    pub fn mark_slot_status(&mut self, slot_index: usize, free: bool) {
        self.header.set(slot_index, free);
    }

    /// The first reusable page index, if any.
    pub fn get_free_slot(&self) -> Option<u32> {
        for i in 0..self.slot_count {
            if self.header[i] {
                return Some(i as u32);
            }
        }
        None
    }
}

impl Page for BTreeHeaderPage {
    fn new(pid: &PageId, bytes: &[u8], _schema: &Schema, _key_field: usize) -> Self {
        let slot_count =
            u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as usize;

        let mut page = if slot_count == 0 {
            // a page handed out fresh from the file, nothing free yet
            let fresh_slots = Self::calculate_slots_count();
            Self {
                base: BasePage::new(pid),
                header: BitVec::from_elem(fresh_slots, false),
                slot_count: fresh_slots,
            }
        } else {
            let header = bitmap_from_bytes(&bytes[2..], slot_count);
            Self {
                base: BasePage::new(pid),
                header,
                slot_count,
            }
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

        writer.write(&(self.slot_count as u16));
        writer.write_bytes(&bitmap_to_bytes(&self.header));

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageCategory;

    #[test]
    fn test_free_slot_round_trip() {
        let pid = PageId::new(PageCategory::Header, 1, 3);
        let data = vec![0; BufferPool::get_page_size()];
        let mut page = BTreeHeaderPage::new(&pid, &data, &Schema::small_int_schema(2), 0);

        assert_eq!(page.get_free_slot(), None);

        page.mark_slot_status(17, true);
        assert_eq!(page.get_free_slot(), Some(17));

        let reparsed = BTreeHeaderPage::new(
            &pid,
            &page.get_page_data(),
            &Schema::small_int_schema(2),
            0,
        );
        assert_eq!(reparsed.get_free_slot(), Some(17));
    }
}
