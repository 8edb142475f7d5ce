use std::{
    io::Cursor,
    sync::{Arc, RwLock},
};

use bit_vec::BitVec;

use crate::{
    buffer::BufferPool,
    error::DbError,
    io::{bitmap_from_bytes, bitmap_to_bytes, ByteWriter},
    storage::{
        page::{BasePage, Page, PageId},
        schema::Schema,
        tuple::{StoredTuple, Tuple},
    },
    transaction::Transaction,
    types::DbResult,
    utils::HandyRwLock,
};

/// A page of an unordered heap file.
///
/// # Binary Layout
///
/// - ceil(N/8) bytes: slot bitmap (slot 0 is bit 0 of byte 0)
/// - N * tuple_size bytes: tuple bodies, zero-filled when the slot is
///   empty
pub struct HeapPage {
    base: BasePage,

    slot_count: usize,

    // true means occupied, false means empty
    header: BitVec,

    // all slots, including the empty ones
    tuples: Vec<Tuple>,

    schema: Schema,
}

impl std::ops::Deref for HeapPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for HeapPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl HeapPage {
    /// The number of tuples a heap page can hold: each slot costs its
    /// body plus one header bit.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_slot = schema.get_size() * 8 + 1;
        BufferPool::get_page_size() * 8 / bits_per_slot
    }

    pub fn calculate_header_size(slot_count: usize) -> usize {
        (slot_count + 7) / 8
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|i| !self.is_slot_used(*i)).count()
    }

    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    /// Put the tuple into the first empty slot, scanning the bitmap in
    /// index order. Returns the record id of the new tuple.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<StoredTuple, DbError> {
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                self.tuples[i] = tuple.clone();
                self.mark_slot_status(i, true);
                return Ok(StoredTuple::new(tuple, i, self.get_pid()));
            }
        }

        Err(DbError::new(&format!(
            "no empty slot on page {}",
            self.get_pid()
        )))
    }

    /// Clear the slot the stored tuple points at.
    pub fn delete_tuple(&mut self, tuple: &StoredTuple) -> DbResult {
        if tuple.get_pid() != self.get_pid() {
            return Err(DbError::illegal(&format!(
                "tuple {} does not live on page {}",
                tuple,
                self.get_pid()
            )));
        }

        let slot_index = tuple.get_slot_index();
        if slot_index >= self.slot_count {
            return Err(DbError::illegal(&format!(
                "slot {} out of range on page {}",
                slot_index,
                self.get_pid()
            )));
        }
        if !self.is_slot_used(slot_index) {
            return Err(DbError::new(&format!(
                "slot {} on page {} is already empty",
                slot_index,
                self.get_pid()
            )));
        }

        self.mark_slot_status(slot_index, false);
        Ok(())
    }

    pub fn get_tuple(&self, slot_index: usize) -> Option<StoredTuple> {
        if self.is_slot_used(slot_index) {
            return Some(StoredTuple::new(
                &self.tuples[slot_index],
                slot_index,
                self.get_pid(),
            ));
        }
        None
    }
}

impl Page for HeapPage {
    fn new(pid: &PageId, bytes: &[u8], schema: &Schema, _key_field: usize) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);

        let header = bitmap_from_bytes(&bytes[..header_size], slot_count);

        let mut tuples = Vec::with_capacity(slot_count);
        let tuple_size = schema.get_size();
        for i in 0..slot_count {
            let start = header_size + i * tuple_size;
            let mut reader = Cursor::new(&bytes[start..start + tuple_size]);
            tuples.push(Tuple::decode_from(&mut reader, schema));
        }

        let mut page = Self {
            base: BasePage::new(pid),
            slot_count,
            header,
            tuples,
            schema: schema.clone(),
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

        writer.write_bytes(&bitmap_to_bytes(&self.header));

        let tuple_size = self.schema.get_size();
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                self.tuples[i].encode_to(&mut writer, &self.schema);
            } else {
                writer.write_bytes(&vec![0; tuple_size]);
            }
        }

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

/// Iterates the occupied slots of a heap page in index order.
pub struct HeapPageIterator {
    page: Arc<RwLock<HeapPage>>,
    cursor: i64,
}

impl HeapPageIterator {
    pub fn new(page: Arc<RwLock<HeapPage>>) -> Self {
        Self { page, cursor: -1 }
    }
}

impl Iterator for HeapPageIterator {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.cursor += 1;
            let cursor = self.cursor as usize;
            if cursor >= page.get_slots_count() {
                return None;
            }

            if let Some(t) = page.get_tuple(cursor) {
                return Some(t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageCategory;

    fn empty_heap_page(schema: &Schema) -> HeapPage {
        let pid = PageId::new(PageCategory::Heap, 1, 0);
        let data = vec![0; BufferPool::get_page_size()];
        HeapPage::new(&pid, &data, schema, 0)
    }

    #[test]
    fn test_slot_count() {
        let schema = Schema::small_int_schema(2);
        // 4096 * 8 / (16 * 8 + 1)
        assert_eq!(HeapPage::calculate_slots_count(&schema), 254);
    }

    #[test]
    fn test_insert_delete_round_trip() {
        let schema = Schema::small_int_schema(2);
        let mut page = empty_heap_page(&schema);

        let t1 = Tuple::new_int_tuple(7, 2);
        let stored = page.insert_tuple(&t1).unwrap();
        assert_eq!(stored.get_slot_index(), 0);
        assert_eq!(page.tuples_count(), 1);

        // serialize, reparse, the tuple survives
        let data = page.get_page_data();
        let reparsed = HeapPage::new(&page.get_pid(), &data, &schema, 0);
        assert_eq!(reparsed.get_tuple(0).unwrap().get_tuple(), &t1);

        page.delete_tuple(&stored).unwrap();
        assert_eq!(page.tuples_count(), 0);

        // deleting twice is a fault
        assert!(page.delete_tuple(&stored).is_err());
    }
}
