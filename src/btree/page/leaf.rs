use std::{
    io::Cursor,
    sync::{Arc, RwLock},
};

use bit_vec::BitVec;
use log::debug;

use crate::{
    buffer::BufferPool,
    io::{bitmap_from_bytes, bitmap_to_bytes, ByteWriter, Decode},
    storage::{
        page::{BasePage, Page, PageCategory, PageId, EMPTY_PAGE_INDEX},
        schema::Schema,
        tuple::{Cell, StoredTuple, Tuple},
    },
    transaction::Transaction,
    utils::{half_full, HandyRwLock},
};

/// A leaf of the B+ tree: tuples sorted by the key field, doubly
/// linked with its siblings.
///
/// # Binary Layout
///
/// - 4 bytes: parent page index (0 = root pointer)
/// - 4 bytes: left sibling page index (0 = none)
/// - 4 bytes: right sibling page index (0 = none)
/// - ceil(N/8) bytes: slot bitmap (slot 0 is bit 0 of byte 0)
/// - N * tuple_size bytes: tuple bodies
pub struct BTreeLeafPage {
    base: BasePage,

    slot_count: usize,

    // true means occupied, false means empty
    header: BitVec,

    // all slots, including the empty ones
    tuples: Vec<Tuple>,

    schema: Schema,

    right_sibling_index: u32,
    left_sibling_index: u32,

    key_field: usize,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeLeafPage {
    /// The tuple capacity of a leaf. Besides its body and header bit,
    /// each page pays for the parent pointer and the two sibling
    /// pointers.
    pub fn calculate_slots_count(schema: &Schema) -> usize {
        let bits_per_slot = schema.get_size() * 8 + 1;
        let extra_bits = 3 * 4 * 8;
        (BufferPool::get_page_size() * 8 - extra_bits) / bits_per_slot
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

    /// A leaf is stable while it is at least half full, or while it is
    /// the root.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.tuples_count() >= half_full(self.slot_count)
    }

    pub fn get_right_pid(&self) -> Option<PageId> {
        if self.right_sibling_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Leaf,
            self.get_pid().table_id,
            self.right_sibling_index,
        ))
    }

    pub fn set_right_pid(&mut self, pid: Option<PageId>) {
        self.right_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    pub fn get_left_pid(&self) -> Option<PageId> {
        if self.left_sibling_index == EMPTY_PAGE_INDEX {
            return None;
        }
        Some(PageId::new(
            PageCategory::Leaf,
            self.get_pid().table_id,
            self.left_sibling_index,
        ))
    }

    pub fn set_left_pid(&mut self, pid: Option<PageId>) {
        self.left_sibling_index = match pid {
            Some(pid) => pid.page_index,
            None => EMPTY_PAGE_INDEX,
        };
    }

    fn key_of(&self, tuple: &Tuple) -> Cell {
        tuple.get_cell(self.key_field)
    }

    /// Add the tuple so that the slots stay in key order.
    pub fn insert_tuple(&mut self, tuple: &Tuple) {
        // the first empty slot
        let mut first_empty_slot: i64 = -1;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                first_empty_slot = i as i64;
                break;
            }
        }
        if first_empty_slot == -1 {
            panic!("no empty slot on leaf page {}", self.get_pid());
        }

        // the last occupied slot whose key is <= the new key; -1 means
        // the tuple goes in front of everything
        let mut last_less_slot: i64 = -1;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                if self.key_of(&self.tuples[i]) <= self.key_of(tuple) {
                    last_less_slot = i as i64;
                } else {
                    break;
                }
            }
        }

        // shift records towards the empty slot, opening a gap next to
        // last_less_slot
        let good_slot: usize;
        if first_empty_slot < last_less_slot {
            for i in first_empty_slot..last_less_slot {
                self.move_tuple((i + 1) as usize, i as usize);
            }
            good_slot = last_less_slot as usize;
        } else {
            for i in ((last_less_slot + 1)..first_empty_slot).rev() {
                self.move_tuple(i as usize, (i + 1) as usize);
            }
            good_slot = (last_less_slot + 1) as usize;
        }

        self.tuples[good_slot] = tuple.clone();
        self.mark_slot_status(good_slot, true);

        debug!(
            "leaf {} insert at slot {}, empty: {}, less: {}",
            self.get_pid(),
            good_slot,
            first_empty_slot,
            last_less_slot
        );
    }

    // move a tuple between slots; the destination must be empty
    fn move_tuple(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) {
            return;
        }

        self.tuples[to] = self.tuples[from].clone();
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    pub fn delete_tuple(&mut self, slot_index: usize) {
        self.mark_slot_status(slot_index, false);
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

    /// Panics on broken ordering, linkage or occupancy. Test support.
    pub fn check_integrity(
        &self,
        parent_pid: &PageId,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) {
        assert_eq!(self.get_pid().category, PageCategory::Leaf);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound.clone();
        for t in BTreeLeafPageIterator::new(self) {
            if let Some(previous) = &previous {
                assert!(
                    previous <= &self.key_of(&t),
                    "leaf {} keys out of order: {} > {}",
                    self.get_pid(),
                    previous,
                    self.key_of(&t),
                );
            }
            previous = Some(self.key_of(&t));
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            assert!(
                previous <= upper_bound,
                "leaf {} last key {} exceeds upper bound {}",
                self.get_pid(),
                previous,
                upper_bound,
            );
        }

        if check_occupancy && depth > 0 {
            // splits leave floor-half pages behind, so the floor is
            // the bound to hold
            assert!(
                self.tuples_count() >= self.slot_count / 2,
                "leaf {} below half-full: {}/{} tuples",
                self.get_pid(),
                self.tuples_count(),
                self.slot_count,
            );
        }
    }
}

impl Page for BTreeLeafPage {
    fn new(pid: &PageId, bytes: &[u8], schema: &Schema, key_field: usize) -> Self {
        let slot_count = Self::calculate_slots_count(schema);
        let header_size = Self::calculate_header_size(slot_count);

        let mut reader = Cursor::new(bytes);
        let parent_index = u32::decode(&mut reader);
        let left_sibling_index = u32::decode(&mut reader);
        let right_sibling_index = u32::decode(&mut reader);

        let bitmap_start = 12;
        let header = bitmap_from_bytes(
            &bytes[bitmap_start..bitmap_start + header_size],
            slot_count,
        );

        let mut tuples = Vec::with_capacity(slot_count);
        let tuple_size = schema.get_size();
        let body_start = bitmap_start + header_size;
        for i in 0..slot_count {
            let start = body_start + i * tuple_size;
            let mut reader = Cursor::new(&bytes[start..start + tuple_size]);
            tuples.push(Tuple::decode_from(&mut reader, schema));
        }

        let mut base = BasePage::new(pid);
        base.set_parent_pid(&PageId::new(
            PageCategory::Internal,
            pid.table_id,
            parent_index,
        ));

        let mut page = Self {
            base,
            slot_count,
            header,
            tuples,
            schema: schema.clone(),
            right_sibling_index,
            left_sibling_index,
            key_field,
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

        writer.write(&self.get_parent_pid().page_index);
        writer.write(&self.left_sibling_index);
        writer.write(&self.right_sibling_index);
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

pub struct BTreeLeafPageIterator<'page> {
    page: &'page BTreeLeafPage,
    cursor: i64,
    reverse_cursor: i64,
}

impl<'page> BTreeLeafPageIterator<'page> {
    pub fn new(page: &'page BTreeLeafPage) -> Self {
        Self {
            page,
            cursor: -1,
            reverse_cursor: page.slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIterator<'_> {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            let cursor = self.cursor as usize;
            if cursor >= self.page.slot_count {
                return None;
            }

            if let Some(t) = self.page.get_tuple(cursor) {
                return Some(t);
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor < 0 {
                return None;
            }

            if let Some(t) = self.page.get_tuple(self.reverse_cursor as usize) {
                return Some(t);
            }
        }
    }
}

/// Same walk over a shared page handle, so callers can keep iterating
/// after the borrow of the page would have ended.
pub struct BTreeLeafPageIteratorRc {
    page: Arc<RwLock<BTreeLeafPage>>,
    cursor: i64,
    reverse_cursor: i64,
}

impl BTreeLeafPageIteratorRc {
    pub fn new(page: Arc<RwLock<BTreeLeafPage>>) -> Self {
        let slot_count = page.rl().get_slots_count();
        Self {
            page,
            cursor: -1,
            reverse_cursor: slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIteratorRc {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.cursor += 1;
            let cursor = self.cursor as usize;
            if cursor >= page.slot_count {
                return None;
            }

            if let Some(t) = page.get_tuple(cursor) {
                return Some(t);
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIteratorRc {
    fn next_back(&mut self) -> Option<Self::Item> {
        let page = self.page.rl();
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor < 0 {
                return None;
            }

            if let Some(t) = page.get_tuple(self.reverse_cursor as usize) {
                return Some(t);
            }
        }
    }
}
