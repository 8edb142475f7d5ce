use std::{
    collections::hash_map::DefaultHasher,
    fs::{File, OpenOptions},
    hash::{Hash, Hasher},
    io::{Read, Seek, SeekFrom, Write},
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex, MutexGuard,
    },
    time::SystemTime,
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage,
        BTreeLeafPageIterator, BTreeRootPointerPage, Entry,
    },
    buffer::BufferPool,
    common::Database,
    error::DbError,
    storage::{
        page::{empty_page_data, Page, PageCategory, PageId},
        schema::Schema,
        tuple::{Cell, StoredTuple, Tuple},
    },
    transaction::{Permission, Transaction},
    types::{DbResult, Pod, ResultPod},
    utils::HandyRwLock,
};

pub enum SearchFor {
    Target(Cell),
    LeftMost,
    RightMost,
}

/// A B+ tree file keyed on one column. Point lookups and range scans
/// go through `find_leaf_page`; inserts split pages upward, deletes
/// merge or redistribute downward.
pub struct BTreeTable {
    name: String,

    /// The column the index is keyed on.
    pub key_field: usize,

    schema: Schema,

    file: Mutex<File>,

    table_id: u32,

    /// The highest page index handed out so far. The root pointer page
    /// is index 0 and the first leaf is index 1.
    page_index: AtomicU32,
}

impl BTreeTable {
    pub fn new(table_name: &str, key_field: usize, schema: &Schema) -> Self {
        let db_path = Database::global().get_path();
        let table_path = db_path.join(table_name).with_extension("table");

        let f = Mutex::new(
            OpenOptions::new()
                .write(true)
                .read(true)
                .create(true)
                .open(table_path)
                .unwrap(),
        );

        let mut hasher = DefaultHasher::new();
        table_name.hash(&mut hasher);
        SystemTime::now().hash(&mut hasher);
        let table_id = hasher.finish() as u32;

        Self::file_init(&f);

        let page_size = BufferPool::get_page_size();
        let last_index = {
            let file = f.lock().unwrap();
            (file.metadata().unwrap().len() as usize / page_size - 1) as u32
        };

        Self {
            name: table_name.to_string(),
            key_field,
            schema: schema.clone(),
            file: f,
            table_id,
            page_index: AtomicU32::new(last_index),
        }
    }

    /// Format a fresh file: the root pointer page and one empty leaf
    /// the root pointer refers to.
    fn file_init(f: &Mutex<File>) {
        let mut file = f.lock().unwrap();
        if file.metadata().unwrap().len() > 0 {
            return;
        }

        let page_size = BufferPool::get_page_size();

        // the root pointer: root = leaf page 1, no header pages
        let mut data = empty_page_data(page_size);
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4] = PageCategory::Leaf as u8;
        file.write_all(&data).unwrap();

        // the first leaf
        file.write_all(&empty_page_data(page_size)).unwrap();
        file.flush().unwrap();
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_schema(&self) -> Schema {
        self.schema.clone()
    }

    pub fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// The page count, not counting the root pointer page.
    pub fn pages_count(&self) -> usize {
        let len = self.get_file().metadata().unwrap().len() as usize;
        len / BufferPool::get_page_size() - 1
    }

    pub fn set_page_index(&self, i: u32) {
        self.page_index.store(i, Ordering::Relaxed);
    }

    pub fn read_page_data(&self, pid: &PageId) -> Result<Vec<u8>, DbError> {
        let page_size = BufferPool::get_page_size();
        let mut file = self.get_file();

        file.seek(SeekFrom::Start(pid.page_index as u64 * page_size as u64))?;
        let mut buf = vec![0; page_size];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_page_to_disk(&self, pid: &PageId, data: &[u8]) -> DbResult {
        let page_size = BufferPool::get_page_size() as u64;
        let mut file = self.get_file();

        file.seek(SeekFrom::Start(pid.page_index as u64 * page_size))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    pub fn write_empty_page_to_disk(&self, pid: &PageId) -> DbResult {
        self.write_page_to_disk(pid, &empty_page_data(BufferPool::get_page_size()))
    }
}

// root access
impl BTreeTable {
    pub fn get_root_ptr_page(&self, tx: &Transaction) -> ResultPod<BTreeRootPointerPage> {
        let root_ptr_pid = PageId::new(PageCategory::RootPointer, self.table_id, 0);
        Database::buffer_pool().get_root_ptr_page(tx, Permission::ReadWrite, &root_ptr_pid)
    }

    pub fn get_root_pid(&self, tx: &Transaction) -> Result<PageId, DbError> {
        let root_ptr = self.get_root_ptr_page(tx)?;
        let mut root_pid = root_ptr.rl().get_root_pid();
        root_pid.table_id = self.table_id;
        Ok(root_pid)
    }

    pub fn set_root_pid(&self, tx: &Transaction, root_pid: &PageId) -> DbResult {
        let root_ptr = self.get_root_ptr_page(tx)?;
        let mut page = root_ptr.wl();
        page.set_root_pid(root_pid);
        page.mark_dirty(Some(tx));
        Ok(())
    }
}

// search
impl BTreeTable {
    /// Recursive descent to the left-most leaf that may contain the
    /// search field. Non-leaf pages on the path are taken shared; the
    /// target leaf is taken with the caller's permission. Entries with
    /// a key >= the field send the walk down their left child, so
    /// duplicate keys resolve to the left.
    pub fn find_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: PageId,
        search: &SearchFor,
    ) -> ResultPod<BTreeLeafPage> {
        match pid.category {
            PageCategory::Leaf => {
                Database::buffer_pool().get_leaf_page(tx, perm, &pid)
            }
            PageCategory::Internal => {
                let page_pod =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, &pid)?;

                let mut child_pid: Option<PageId> = None;

                // hold the page
                {
                    let page = page_pod.rl();
                    let mut last_entry: Option<Entry> = None;

                    for e in BTreeInternalPageIterator::new(&page) {
                        match search {
                            SearchFor::Target(cell) => {
                                if &e.get_key() >= cell {
                                    child_pid = Some(e.get_left_child());
                                    break;
                                }
                            }
                            SearchFor::LeftMost => {
                                child_pid = Some(e.get_left_child());
                                break;
                            }
                            SearchFor::RightMost => {
                                // keep walking, the last entry wins
                                child_pid = Some(e.get_right_child());
                            }
                        }
                        last_entry = Some(e);
                    }

                    if child_pid.is_none() {
                        // every key was smaller, descend right-most
                        match last_entry {
                            Some(e) => child_pid = Some(e.get_right_child()),
                            None => {
                                return Err(DbError::new(&format!(
                                    "internal page {} has no entries",
                                    pid
                                )))
                            }
                        }
                    }
                }
                // release the page

                self.find_leaf_page(tx, perm, child_pid.unwrap(), search)
            }
            _ => Err(DbError::illegal(&format!(
                "cannot search through page {}",
                pid
            ))),
        }
    }

    pub fn get_first_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::LeftMost)
    }

    pub fn get_last_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::RightMost)
    }
}

// insert
impl BTreeTable {
    /// Insert a tuple keeping the leaf order; splits the leaf (and
    /// recursively its ancestors) when there is no room.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult {
        let root_pid = self.get_root_pid(tx)?;
        let field = tuple.get_cell(self.key_field);

        let mut leaf_pod = self.find_leaf_page(
            tx,
            Permission::ReadWrite,
            root_pid,
            &SearchFor::Target(field.clone()),
        )?;

        if leaf_pod.rl().empty_slots_count() == 0 {
            leaf_pod = self.split_leaf_page(tx, leaf_pod, &field)?;
        }

        let mut leaf = leaf_pod.wl();
        leaf.insert_tuple(tuple);
        leaf.mark_dirty(Some(tx));
        Ok(())
    }

    /// Split a full leaf. The upper half of its tuples move to a fresh
    /// right sibling, the sibling chain is respliced, and the key of
    /// the new sibling's first tuple is copied up into the parent
    /// (the key stays in the leaf). Returns the leaf the pending
    /// insert belongs in.
    pub fn split_leaf_page(
        &self,
        tx: &Transaction,
        page_pod: Pod<BTreeLeafPage>,
        field: &Cell,
    ) -> ResultPod<BTreeLeafPage> {
        let new_sibling_pod = self.get_empty_leaf_page(tx)?;
        let parent_pid: PageId;
        let key: Cell;

        // hold the old page and its new sibling
        {
            let mut new_sibling = new_sibling_pod.wl();
            let mut page = page_pod.wl();

            let move_count = page.tuples_count() / 2;

            let mut delete_slots: Vec<usize> = Vec::new();
            {
                let it = BTreeLeafPageIterator::new(&page);
                for tuple in it.rev().take(move_count) {
                    delete_slots.push(tuple.get_slot_index());
                    new_sibling.insert_tuple(&tuple);
                }
            }
            for slot in delete_slots {
                page.delete_tuple(slot);
            }

            // the separator is the first key of the right-hand page
            let mut it = BTreeLeafPageIterator::new(&new_sibling);
            key = it.next().unwrap().get_cell(self.key_field);

            parent_pid = page.get_parent_pid();
        }
        // release the old page and its new sibling

        // Attach to the parent. Splitting the parent (when it is full
        // itself) happens outside the borrows above since it may touch
        // many children.
        let parent_pod = self.get_parent_with_empty_slots(tx, parent_pid, field)?;

        // hold the parent, the old page and the new sibling
        {
            let mut parent = parent_pod.wl();
            let mut page = page_pod.wl();
            let mut new_sibling = new_sibling_pod.wl();

            let entry = Entry::new(&key, &page.get_pid(), &new_sibling.get_pid());
            parent.insert_entry(&entry)?;
            parent.mark_dirty(Some(tx));

            // splice the sibling chain
            if let Some(old_right_pid) = page.get_right_pid() {
                let old_right_pod = Database::buffer_pool().get_leaf_page(
                    tx,
                    Permission::ReadWrite,
                    &old_right_pid,
                )?;
                let mut old_right = old_right_pod.wl();
                old_right.set_left_pid(Some(new_sibling.get_pid()));
                old_right.mark_dirty(Some(tx));
            }

            new_sibling.set_right_pid(page.get_right_pid());
            new_sibling.set_left_pid(Some(page.get_pid()));
            page.set_right_pid(Some(new_sibling.get_pid()));

            page.set_parent_pid(&parent.get_pid());
            new_sibling.set_parent_pid(&parent.get_pid());

            page.mark_dirty(Some(tx));
            new_sibling.mark_dirty(Some(tx));
        }
        // release the parent, the old page and the new sibling

        if field > &key {
            Ok(new_sibling_pod)
        } else {
            Ok(page_pod)
        }
    }

    /// A parent page ready to take one more entry: the existing parent
    /// if it has room, a split of it if not, or a brand new root when
    /// the split has reached the root pointer.
    fn get_parent_with_empty_slots(
        &self,
        tx: &Transaction,
        parent_pid: PageId,
        field: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        match parent_pid.category {
            PageCategory::RootPointer => {
                let new_parent_pod = self.get_empty_internal_page(tx)?;
                self.set_root_pid(tx, &new_parent_pod.rl().get_pid())?;
                Ok(new_parent_pod)
            }
            PageCategory::Internal => {
                let parent_pod = Database::buffer_pool().get_internal_page(
                    tx,
                    Permission::ReadWrite,
                    &parent_pid,
                )?;

                let empty_slots = parent_pod.rl().empty_slots_count();
                if empty_slots > 0 {
                    Ok(parent_pod)
                } else {
                    self.split_internal_page(tx, parent_pod, field)
                }
            }
            _ => Err(DbError::illegal(&format!(
                "page {} cannot be a parent",
                parent_pid
            ))),
        }
    }

    /// Split a full internal page. The upper half of its entries move
    /// to a fresh right sibling and the middle entry is pushed up: it
    /// leaves this level and becomes the parent entry whose children
    /// are the two halves. Parent pointers of every moved child are
    /// rewired.
    fn split_internal_page(
        &self,
        tx: &Transaction,
        page_pod: Pod<BTreeInternalPage>,
        field: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        let sibling_pod = self.get_empty_internal_page(tx)?;
        let key: Cell;
        let mut parent_pid: PageId;

        // hold the page and its new sibling
        {
            let mut sibling = sibling_pod.wl();
            let mut page = page_pod.wl();

            parent_pid = page.get_parent_pid();

            let move_count = page.entries_count() / 2;

            let mut delete_slots: Vec<usize> = Vec::new();
            let middle_entry;
            {
                let mut it = BTreeInternalPageIterator::new(&page);
                for e in it.by_ref().rev().take(move_count) {
                    delete_slots.push(e.get_record_id());
                    sibling.insert_entry(&e)?;

                    // the moved entry's right child now lives under the
                    // sibling
                    self.set_parent(tx, &e.get_right_child(), &sibling.get_pid())?;
                }

                middle_entry = it.next_back().unwrap();
            }

            // the middle entry leaves this level
            delete_slots.push(middle_entry.get_record_id());
            for slot in delete_slots {
                page.delete_key_and_right_child(slot);
            }

            self.set_parent(tx, &middle_entry.get_right_child(), &sibling.get_pid())?;
            key = middle_entry.get_key();

            page.mark_dirty(Some(tx));
            sibling.mark_dirty(Some(tx));
        }
        // release the page and its new sibling

        let parent_pod = self.get_parent_with_empty_slots(tx, parent_pid, field)?;
        parent_pid = parent_pod.rl().get_pid();
        {
            let mut page = page_pod.wl();
            page.set_parent_pid(&parent_pid);
            page.mark_dirty(Some(tx));
        }
        {
            let mut sibling = sibling_pod.wl();
            sibling.set_parent_pid(&parent_pid);
            sibling.mark_dirty(Some(tx));
        }

        // hold the parent
        {
            let mut parent = parent_pod.wl();
            let entry = Entry::new(
                &key,
                &page_pod.rl().get_pid(),
                &sibling_pod.rl().get_pid(),
            );
            parent.insert_entry(&entry)?;
            parent.mark_dirty(Some(tx));
        }
        // release the parent

        if field > &key {
            Ok(sibling_pod)
        } else {
            Ok(page_pod)
        }
    }

    pub(crate) fn set_parent(
        &self,
        tx: &Transaction,
        child_pid: &PageId,
        parent_pid: &PageId,
    ) -> DbResult {
        match child_pid.category {
            PageCategory::Internal => {
                let child_pod = Database::buffer_pool().get_internal_page(
                    tx,
                    Permission::ReadWrite,
                    child_pid,
                )?;
                let mut child = child_pod.wl();
                child.set_parent_pid(parent_pid);
                child.mark_dirty(Some(tx));
            }
            PageCategory::Leaf => {
                let child_pod = Database::buffer_pool().get_leaf_page(
                    tx,
                    Permission::ReadWrite,
                    child_pid,
                )?;
                let mut child = child_pod.wl();
                child.set_parent_pid(parent_pid);
                child.mark_dirty(Some(tx));
            }
            _ => {
                return Err(DbError::illegal(&format!(
                    "page {} cannot be a child",
                    child_pid
                )))
            }
        }
        Ok(())
    }
}

// page allocation
impl BTreeTable {
    /// The index for a fresh page: a reclaimed slot from the header
    /// chain when one exists, otherwise one past the end of the file.
    pub fn get_empty_page_index(&self, tx: &Transaction) -> Result<u32, DbError> {
        let root_ptr_pod = self.get_root_ptr_page(tx)?;

        let header_pid = root_ptr_pod.rl().get_header_pid();
        if let Some(header_pid) = header_pid {
            let header_pod = Database::buffer_pool().get_header_page(
                tx,
                Permission::ReadWrite,
                &header_pid,
            )?;

            let mut header = header_pod.wl();
            if let Some(i) = header.get_free_slot() {
                header.mark_slot_status(i as usize, false);
                header.mark_dirty(Some(tx));
                debug!("table {} reuses page {}", self.name, i);
                return Ok(i);
            }
        }

        Ok(self.page_index.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn get_empty_leaf_page(&self, tx: &Transaction) -> ResultPod<BTreeLeafPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Leaf, self.table_id, page_index);

        self.write_empty_page_to_disk(&pid)?;

        let page = BTreeLeafPage::new(
            &pid,
            &empty_page_data(BufferPool::get_page_size()),
            &self.schema,
            self.key_field,
        );
        let pod = std::sync::Arc::new(std::sync::RwLock::new(page));
        pod.wl().mark_dirty(Some(tx));

        Database::buffer_pool().install_leaf_page(&pid, pod.clone());
        Ok(pod)
    }

    fn get_empty_internal_page(&self, tx: &Transaction) -> ResultPod<BTreeInternalPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Internal, self.table_id, page_index);

        self.write_empty_page_to_disk(&pid)?;

        let page = BTreeInternalPage::new(
            &pid,
            &empty_page_data(BufferPool::get_page_size()),
            &self.schema,
            self.key_field,
        );
        let pod = std::sync::Arc::new(std::sync::RwLock::new(page));
        pod.wl().mark_dirty(Some(tx));

        Database::buffer_pool().install_internal_page(&pid, pod.clone());
        Ok(pod)
    }

    pub(crate) fn get_empty_header_page(&self, tx: &Transaction) -> ResultPod<BTreeHeaderPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageId::new(PageCategory::Header, self.table_id, page_index);

        self.write_empty_page_to_disk(&pid)?;

        let page = BTreeHeaderPage::new(
            &pid,
            &empty_page_data(BufferPool::get_page_size()),
            &self.schema,
            self.key_field,
        );
        let pod = std::sync::Arc::new(std::sync::RwLock::new(page));
        pod.wl().mark_dirty(Some(tx));

        Database::buffer_pool().install_header_page(&pid, pod.clone());
        Ok(pod)
    }
}

// helpers over whole subtrees
impl BTreeTable {
    /// The last tuple under a page, walking right-most children down
    /// to a leaf.
    pub fn get_last_tuple(
        &self,
        tx: &Transaction,
        pid: &PageId,
    ) -> Result<Option<StoredTuple>, DbError> {
        match pid.category {
            PageCategory::Internal => {
                let page_pod =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, pid)?;

                let child_pid;
                {
                    let page = page_pod.rl();
                    let mut it = BTreeInternalPageIterator::new(&page);
                    child_pid = match it.next_back() {
                        Some(e) => e.get_right_child(),
                        None => return Ok(None),
                    };
                }
                self.get_last_tuple(tx, &child_pid)
            }
            PageCategory::Leaf => {
                let page_pod =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadOnly, pid)?;
                let page = page_pod.rl();
                let mut it = BTreeLeafPageIterator::new(&page);
                Ok(it.next_back())
            }
            _ => Err(DbError::illegal(&format!(
                "page {} holds no tuples",
                pid
            ))),
        }
    }

    /// The tuple count of the whole table; takes a shared lock on
    /// every leaf.
    pub fn tuples_count(&self) -> usize {
        let tx = Transaction::new();
        tx.start().unwrap();
        let count = crate::btree::table::BTreeTableIterator::new(&tx, self).count();
        tx.commit().unwrap();
        count
    }
}

// structure validation, test support
impl BTreeTable {
    /// Walk the whole tree and assert parent pointers, sibling chains,
    /// key ranges and (optionally) occupancy. Panics on any breakage.
    pub fn check_integrity(&self, check_occupancy: bool) {
        let tx = Transaction::new();
        tx.start().unwrap();

        let root_ptr_pod = self.get_root_ptr_page(&tx).unwrap();
        let root_pid = {
            let root_ptr = root_ptr_pod.rl();
            let mut pid = root_ptr.get_root_pid();
            pid.table_id = self.table_id;
            pid
        };
        let root_ptr_pid = root_ptr_pod.rl().get_pid();

        let summary = self.check_sub_tree(
            &tx,
            &root_pid,
            &root_ptr_pid,
            &None,
            &None,
            check_occupancy,
            0,
        );
        assert!(
            summary.left_ptr.is_none(),
            "the left-most leaf has a left sibling: {:?}",
            summary.left_ptr
        );
        assert!(
            summary.right_ptr.is_none(),
            "the right-most leaf has a right sibling: {:?}",
            summary.right_ptr
        );

        tx.commit().unwrap();
    }

    fn check_sub_tree(
        &self,
        tx: &Transaction,
        pid: &PageId,
        parent_pid: &PageId,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) -> SubtreeSummary {
        match pid.category {
            PageCategory::Leaf => {
                let page_pod = Database::buffer_pool()
                    .get_leaf_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_pod.rl();
                page.check_integrity(parent_pid, lower_bound, upper_bound, check_occupancy, depth);

                SubtreeSummary {
                    depth,
                    left_ptr: page.get_left_pid(),
                    right_ptr: page.get_right_pid(),
                    left_most_pid: Some(page.get_pid()),
                    right_most_pid: Some(page.get_pid()),
                }
            }

            PageCategory::Internal => {
                let page_pod = Database::buffer_pool()
                    .get_internal_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_pod.rl();
                page.check_integrity(parent_pid, lower_bound, upper_bound, check_occupancy, depth);

                let mut child_lower_bound = lower_bound.clone();
                let mut summary: Option<SubtreeSummary> = None;
                let mut last_entry: Option<Entry> = None;

                for entry in BTreeInternalPageIterator::new(&page) {
                    let current = self.check_sub_tree(
                        tx,
                        &entry.get_left_child(),
                        pid,
                        &child_lower_bound,
                        &Some(entry.get_key()),
                        check_occupancy,
                        depth + 1,
                    );
                    match summary {
                        Some(ref mut s) => s.check_and_merge(&current),
                        None => summary = Some(current),
                    }

                    child_lower_bound = Some(entry.get_key());
                    last_entry = Some(entry);
                }

                let last_right = self.check_sub_tree(
                    tx,
                    &last_entry.unwrap().get_right_child(),
                    pid,
                    &child_lower_bound,
                    upper_bound,
                    check_occupancy,
                    depth + 1,
                );

                match summary {
                    Some(mut s) => {
                        s.check_and_merge(&last_right);
                        s
                    }
                    None => last_right,
                }
            }

            // no other page kinds are reachable from the root
            _ => panic!("page {} inside the tree", pid),
        }
    }

    /// Print the tree structure through the `log` facade. Debug aid.
    pub fn draw_tree(&self, tx: &Transaction) {
        let mut depiction = "\n".to_string();

        let root_pid = self.get_root_pid(tx).unwrap();
        depiction.push_str(&self.draw_subtree(tx, &root_pid, 0));

        debug!("tree structure: {}", depiction);
    }

    fn draw_subtree(&self, tx: &Transaction, pid: &PageId, level: usize) -> String {
        let prefix = "│   ".repeat(level);
        let mut depiction = String::new();

        match pid.category {
            PageCategory::Leaf => {
                let page_pod = Database::buffer_pool()
                    .get_leaf_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_pod.rl();
                depiction.push_str(&format!(
                    "{}├── leaf: {} ({}/{} tuples)\n",
                    prefix,
                    page.get_pid(),
                    page.tuples_count(),
                    page.get_slots_count(),
                ));
            }
            PageCategory::Internal => {
                let page_pod = Database::buffer_pool()
                    .get_internal_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_pod.rl();
                depiction.push_str(&format!(
                    "{}├── internal: {} ({}/{} children)\n",
                    prefix,
                    pid,
                    page.children_count(),
                    page.get_children_cap(),
                ));

                for (i, entry) in BTreeInternalPageIterator::new(&page).enumerate() {
                    if i == 0 {
                        depiction.push_str(&self.draw_subtree(
                            tx,
                            &entry.get_left_child(),
                            level + 1,
                        ));
                    }
                    depiction.push_str(&format!(
                        "{}├── key: {}\n",
                        "│   ".repeat(level + 1),
                        entry.get_key()
                    ));
                    depiction.push_str(&self.draw_subtree(
                        tx,
                        &entry.get_right_child(),
                        level + 1,
                    ));
                }
            }
            _ => panic!("page {} inside the tree", pid),
        }

        depiction
    }
}

#[derive(Debug, Clone)]
struct SubtreeSummary {
    /// Distance from the root.
    depth: usize,

    left_ptr: Option<PageId>,
    left_most_pid: Option<PageId>,
    right_ptr: Option<PageId>,
    right_most_pid: Option<PageId>,
}

impl SubtreeSummary {
    fn check_and_merge(&mut self, right: &SubtreeSummary) {
        assert_eq!(self.depth, right.depth);
        assert_eq!(
            self.right_ptr, right.left_most_pid,
            "broken sibling chain at depth {}: {:?} != {:?}",
            self.depth, self.right_ptr, right.left_most_pid
        );
        assert_eq!(self.right_most_pid, right.left_ptr);

        self.right_ptr = right.right_ptr;
        self.right_most_pid = right.right_most_pid;
    }
}
