use std::{fmt, io::Cursor};

use bit_vec::BitVec;

use crate::{
    buffer::BufferPool,
    error::DbError,
    io::{bitmap_from_bytes, bitmap_to_bytes, ByteWriter, Decode},
    storage::{
        page::{BasePage, Page, PageCategory, PageId},
        schema::Schema,
        tuple::Cell,
    },
    transaction::Transaction,
    utils::half_full,
};

/// An internal node: m sorted keys and m+1 child pointers. Slot 0
/// never holds a key (a node with m keys has m+1 children), so the
/// entry in slot i separates children[i-1] and children[i]. Caveat:
/// the left child of an entry is the nearest *used* slot to its left,
/// since deletion can leave holes.
///
/// # Binary Layout
///
/// - 4 bytes: parent page index (0 = root pointer)
/// - 1 byte: child page category (leaf/internal)
/// - ceil((m+1)/8) bytes: slot bitmap (slot 0 is bit 0 of byte 0)
/// - (m+1) * key_size bytes: key array (slot 0 zero-filled)
/// - (m+1) * 4 bytes: child page index array
pub struct BTreeInternalPage {
    base: BasePage,

    keys: Vec<Cell>,
    children: Vec<u32>,
    child_category: PageCategory,

    slot_count: usize,

    header: BitVec,

    key_field: usize,
    schema: Schema,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BasePage;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

impl BTreeInternalPage {
    /// Maximum child count. Every slot (slot 0 included, though its
    /// key body stays zero-filled) pays for a key body, a child
    /// pointer and a header bit; the page additionally carries the
    /// parent pointer and the child category byte.
    pub fn calculate_children_cap(key_size: usize) -> usize {
        let bits_per_slot = key_size * 8 + 4 * 8 + 1;
        let extra_bits = 4 * 8 + 8;
        (BufferPool::get_page_size() * 8 - extra_bits) / bits_per_slot
    }

    /// Maximum entry (key) count, i.e. children - 1.
    pub fn calculate_entries_cap(key_size: usize) -> usize {
        Self::calculate_children_cap(key_size) - 1
    }

    fn key_size(&self) -> usize {
        self.schema.get_type(self.key_field).get_size()
    }

    pub fn get_entries_cap(&self) -> usize {
        self.slot_count - 1
    }

    pub fn get_children_cap(&self) -> usize {
        self.slot_count
    }

    pub fn empty_slots_count(&self) -> usize {
        // slot 0 holds no key, so it does not count
        (1..self.slot_count).filter(|i| !self.is_slot_used(*i)).count()
    }

    pub fn entries_count(&self) -> usize {
        self.slot_count - 1 - self.empty_slots_count()
    }

    pub fn children_count(&self) -> usize {
        self.entries_count() + 1
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    /// Stable while at least half full, or while it is the root.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.children_count() >= half_full(self.get_children_cap())
    }

    fn child_pid(&self, slot_index: usize) -> PageId {
        PageId::new(
            self.child_category,
            self.get_pid().table_id,
            self.children[slot_index],
        )
    }

    pub fn get_entry(&self, slot_index: usize) -> Option<Entry> {
        if !self.is_slot_used(slot_index) {
            return None;
        }

        // the left child lives in the nearest used slot to the left
        for left in (0..slot_index).rev() {
            if self.is_slot_used(left) {
                let mut e = Entry::new(
                    &self.keys[slot_index],
                    &self.child_pid(left),
                    &self.child_pid(slot_index),
                );
                e.set_record_id(slot_index);
                return Some(e);
            }
        }
        None
    }

    /// The entry whose children are exactly the given pair, needed
    /// when rebalancing two siblings through their parent.
    pub fn get_entry_by_children(
        &self,
        left_pid: &PageId,
        right_pid: &PageId,
    ) -> Option<Entry> {
        BTreeInternalPageIterator::new(self)
            .find(|e| e.get_left_child() == *left_pid && e.get_right_child() == *right_pid)
    }

    pub fn get_first_child_pid(&self) -> PageId {
        let mut it = BTreeInternalPageIterator::new(self);
        it.next().unwrap().get_left_child()
    }

    pub fn get_last_child_pid(&self) -> PageId {
        let mut it = BTreeInternalPageIterator::new(self);
        it.next_back().unwrap().get_right_child()
    }

    pub fn insert_entry(&mut self, e: &Entry) -> Result<(), DbError> {
        self.child_category = e.get_left_child().category;

        // the very first entry occupies slots 0 and 1
        if self.entries_count() == 0 {
            self.children[0] = e.get_left_child().page_index;
            self.children[1] = e.get_right_child().page_index;
            self.keys[1] = e.get_key();
            self.mark_slot_status(0, true);
            self.mark_slot_status(1, true);
            return Ok(());
        }

        if self.empty_slots_count() == 0 {
            return Err(DbError::new(&format!(
                "no empty slot on internal page {}",
                self.get_pid()
            )));
        }

        // the first empty key slot
        let mut empty_slot: i64 = -1;
        for i in 1..self.slot_count {
            if !self.is_slot_used(i) {
                empty_slot = i as i64;
                break;
            }
        }

        // find the slot the new entry belongs next to, by matching one
        // of its children against an existing child pointer
        let mut slot_just_ahead: i64 = -1;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                continue;
            }

            if self.children[i] == e.get_left_child().page_index {
                // the new entry goes right after this slot
                slot_just_ahead = i as i64;
                break;
            }
            if self.children[i] == e.get_right_child().page_index {
                // the new entry splits this slot's left range; its left
                // child becomes this slot's child
                slot_just_ahead = i as i64;
                self.children[i] = e.get_left_child().page_index;
                break;
            }
        }

        if slot_just_ahead == -1 {
            return Err(DbError::new(&format!(
                "no child pointer matches entry {} on page {}",
                e,
                self.get_pid()
            )));
        }

        // shift entries to open a gap right after slot_just_ahead
        let good_slot: usize;
        if empty_slot < slot_just_ahead {
            for i in empty_slot..slot_just_ahead {
                self.move_entry((i + 1) as usize, i as usize);
            }
            good_slot = slot_just_ahead as usize;
        } else {
            for i in ((slot_just_ahead + 1)..empty_slot).rev() {
                self.move_entry(i as usize, (i + 1) as usize);
            }
            good_slot = (slot_just_ahead + 1) as usize;
        }

        self.keys[good_slot] = e.get_key();
        self.children[good_slot] = e.get_right_child().page_index;
        self.mark_slot_status(good_slot, true);
        Ok(())
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        if self.is_slot_used(from) && !self.is_slot_used(to) {
            self.keys[to] = self.keys[from].clone();
            self.children[to] = self.children[from];
            self.mark_slot_status(from, false);
            self.mark_slot_status(to, true);
        }
    }

    /// Remove the key in the slot together with the child pointer on
    /// its right.
    pub fn delete_key_and_right_child(&mut self, record_id: usize) {
        self.mark_slot_status(record_id, false);
    }

    /// Remove the key in the slot together with the child pointer on
    /// its left; the right child pointer moves into the nearest used
    /// slot to the left.
    pub fn delete_key_and_left_child(&mut self, record_id: usize) {
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = self.children[record_id];
                self.mark_slot_status(record_id, false);
                return;
            }
        }
    }

    /// Overwrite the entry in its slot (key and both children).
    pub fn update_entry(&mut self, entry: &Entry) {
        let record_id = entry.get_record_id();

        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = entry.get_left_child().page_index;
                break;
            }
        }

        self.children[record_id] = entry.get_right_child().page_index;
        self.keys[record_id] = entry.get_key();
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
        assert_eq!(self.get_pid().category, PageCategory::Internal);
        assert_eq!(&self.get_parent_pid(), parent_pid);

        let mut previous = lower_bound.clone();
        for e in BTreeInternalPageIterator::new(self) {
            if let Some(previous) = &previous {
                assert!(
                    previous <= &e.get_key(),
                    "internal {} keys out of order: {} > {}",
                    self.get_pid(),
                    previous,
                    e,
                );
            }
            previous = Some(e.get_key());
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            assert!(previous <= upper_bound);
        }

        if check_occupancy && depth > 0 {
            // splits leave floor-half pages behind, so the floor is
            // the bound to hold
            assert!(
                self.children_count() >= self.get_children_cap() / 2,
                "internal {} below half-full: {}/{} children",
                self.get_pid(),
                self.children_count(),
                self.get_children_cap(),
            );
        }
    }
}

impl Page for BTreeInternalPage {
    fn new(pid: &PageId, bytes: &[u8], schema: &Schema, key_field: usize) -> Self {
        let key_size = schema.get_type(key_field).get_size();
        let slot_count = Self::calculate_children_cap(key_size);
        let header_size = (slot_count + 7) / 8;

        let mut reader = Cursor::new(bytes);
        let parent_index = u32::decode(&mut reader);
        let child_category = PageCategory::decode(&mut reader);

        let bitmap_start = 5;
        let header = bitmap_from_bytes(
            &bytes[bitmap_start..bitmap_start + header_size],
            slot_count,
        );

        let keys_start = bitmap_start + header_size;
        let mut keys = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let start = keys_start + i * key_size;
            let mut reader = Cursor::new(&bytes[start..start + key_size]);
            keys.push(Cell::from_slot_bytes(
                &mut reader,
                &schema.get_type(key_field),
            ));
        }

        let children_start = keys_start + slot_count * key_size;
        let mut children = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let start = children_start + i * 4;
            let mut reader = Cursor::new(&bytes[start..start + 4]);
            children.push(u32::decode(&mut reader));
        }

        let mut base = BasePage::new(pid);
        base.set_parent_pid(&PageId::new(
            PageCategory::Internal,
            pid.table_id,
            parent_index,
        ));

        let mut page = Self {
            base,
            keys,
            children,
            child_category,
            slot_count,
            header,
            key_field,
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

        writer.write(&self.get_parent_pid().page_index);
        writer.write(&self.child_category);
        writer.write_bytes(&bitmap_to_bytes(&self.header));

        let key_type = self.schema.get_type(self.key_field);
        let key_size = self.key_size();
        for i in 0..self.slot_count {
            if self.is_slot_used(i) && i > 0 {
                writer.write_bytes(&self.keys[i].to_slot_bytes(&key_type));
            } else {
                writer.write_bytes(&vec![0; key_size]);
            }
        }
        for i in 0..self.slot_count {
            writer.write(&self.children[i]);
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

/// A key with its two child pointers. All keys in the left child's
/// subtree are <= the key; all keys in the right child's subtree are
/// >= the key.
#[derive(Clone)]
pub struct Entry {
    key: Cell,
    left: PageId,
    right: PageId,

    // slot position within the page
    record_id: usize,
}

impl Entry {
    pub fn new(key: &Cell, left: &PageId, right: &PageId) -> Self {
        Self {
            key: key.clone(),
            left: *left,
            right: *right,
            record_id: 0,
        }
    }

    pub fn get_key(&self) -> Cell {
        self.key.clone()
    }

    pub fn set_key(&mut self, key: Cell) {
        self.key = key;
    }

    pub fn get_left_child(&self) -> PageId {
        self.left
    }

    pub fn get_right_child(&self) -> PageId {
        self.right
    }

    pub fn set_record_id(&mut self, record_id: usize) {
        self.record_id = record_id;
    }

    pub fn get_record_id(&self) -> usize {
        self.record_id
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.key, self.left, self.right)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

pub struct BTreeInternalPageIterator<'page> {
    page: &'page BTreeInternalPage,

    cursor: usize,
    left_child_position: usize,

    reverse_cursor: usize,
    right_child_position: usize,
}

impl<'page> BTreeInternalPageIterator<'page> {
    pub fn new(page: &'page BTreeInternalPage) -> Self {
        // seed the reverse walk on the right-most used slot
        let mut right_child_position = page.slot_count;
        loop {
            if right_child_position == 0 {
                break;
            }
            right_child_position -= 1;
            if page.is_slot_used(right_child_position) {
                break;
            }
        }

        Self {
            page,
            cursor: 0,
            left_child_position: 0,
            reverse_cursor: right_child_position,
            right_child_position,
        }
    }
}

impl Iterator for BTreeInternalPageIterator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            let cursor = self.cursor;
            if cursor >= self.page.slot_count {
                return None;
            }

            if !self.page.is_slot_used(cursor) {
                continue;
            }

            let mut e = Entry::new(
                &self.page.keys[cursor],
                &self.page.child_pid(self.left_child_position),
                &self.page.child_pid(cursor),
            );
            e.set_record_id(cursor);

            self.left_child_position = cursor;
            return Some(e);
        }
    }
}

impl DoubleEndedIterator for BTreeInternalPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            match self.reverse_cursor.checked_sub(1) {
                Some(left_index) => {
                    self.reverse_cursor = left_index;
                    if !self.page.is_slot_used(left_index) {
                        continue;
                    }
                    if self.right_child_position == 0 {
                        return None;
                    }

                    let mut e = Entry::new(
                        &self.page.keys[self.right_child_position],
                        &self.page.child_pid(left_index),
                        &self.page.child_pid(self.right_child_position),
                    );
                    e.set_record_id(self.right_child_position);

                    self.right_child_position = left_index;
                    return Some(e);
                }
                None => {
                    return None;
                }
            }
        }
    }
}
