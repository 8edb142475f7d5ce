use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    io::{Seek, SeekFrom, Write},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use log::debug;

use crate::{
    buffer::BufferPool,
    common::Database,
    error::DbError,
    heap::page::HeapPageIterator,
    storage::{
        page::{empty_page_data, PageCategory, PageId},
        schema::Schema,
        tuple::{StoredTuple, Tuple},
    },
    transaction::{Permission, Transaction},
    types::DbResult,
    utils::HandyRwLock,
};

use std::fs::{File, OpenOptions};

/// A heap file: an unordered bag of tuples over a contiguous sequence
/// of fixed-size pages. No file header; page i lives at byte offset
/// i * page_size.
pub struct HeapTable {
    name: String,

    schema: Schema,

    file: Mutex<File>,

    table_id: u32,
}

impl HeapTable {
    pub fn new(table_name: &str, schema: &Schema) -> Self {
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

        Self {
            name: table_name.to_string(),
            schema: schema.clone(),
            file: f,
            table_id,
        }
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

    /// The page count; the file never holds a partial page.
    pub fn num_pages(&self) -> usize {
        let len = self.get_file().metadata().unwrap().len() as usize;
        len / BufferPool::get_page_size()
    }

    pub fn read_page_data(&self, pid: &PageId) -> Result<Vec<u8>, DbError> {
        use std::io::Read;

        let page_size = BufferPool::get_page_size();
        if pid.page_index as usize >= self.num_pages() {
            return Err(DbError::illegal(&format!(
                "page {} does not exist in table {} ({} pages)",
                pid,
                self.name,
                self.num_pages()
            )));
        }

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

    /// Grow the file by one zeroed page; returns its id.
    fn append_empty_page(&self) -> Result<PageId, DbError> {
        let page_size = BufferPool::get_page_size();
        let mut file = self.get_file();

        let index = (file.metadata()?.len() as usize / page_size) as u32;
        file.seek(SeekFrom::End(0))?;
        file.write_all(&empty_page_data(page_size))?;
        file.flush()?;

        debug!("table {} grew to page {}", self.name, index);
        Ok(PageId::new(PageCategory::Heap, self.table_id, index))
    }

    /// Probe pages 0..num_pages for a free slot and insert there; the
    /// probe holds each page with read-write permission but releases
    /// it right away when the page turns out full, so the transaction
    /// does not retain locks on pages it never changed. When every
    /// page is full the file grows by one page, re-acquired through
    /// the buffer pool so the mutation is seen by the log.
    pub fn insert_tuple(
        &self,
        tx: &Transaction,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>, DbError> {
        for i in 0..self.num_pages() {
            let pid = PageId::new(PageCategory::Heap, self.table_id, i as u32);
            let page_pod =
                Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;

            if page_pod.rl().empty_slots_count() == 0 {
                Database::buffer_pool().unsafe_release_page(tx, &pid);
                continue;
            }

            page_pod.wl().insert_tuple(tuple)?;
            return Ok(vec![pid]);
        }

        let pid = self.append_empty_page()?;
        let page_pod =
            Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
        page_pod.wl().insert_tuple(tuple)?;
        Ok(vec![pid])
    }

    /// Clear the slot the record id points at.
    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &StoredTuple,
    ) -> Result<Vec<PageId>, DbError> {
        let pid = tuple.get_pid();
        let page_pod =
            Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;

        page_pod.wl().delete_tuple(tuple)?;
        Ok(vec![pid])
    }

    /// A lazy walk over every tuple in file order. Pages are acquired
    /// read-only, one at a time.
    pub fn iter(&self, tx: &Transaction) -> HeapTableIterator {
        HeapTableIterator::new(tx, self.table_id, self.num_pages())
    }
}

pub struct HeapTableIterator {
    tx: Transaction,
    table_id: u32,
    num_pages: usize,

    page_index: usize,
    page_iter: Option<HeapPageIterator>,
}

impl HeapTableIterator {
    pub fn new(tx: &Transaction, table_id: u32, num_pages: usize) -> Self {
        Self {
            tx: *tx,
            table_id,
            num_pages,
            page_index: 0,
            page_iter: None,
        }
    }

    fn open_page(&mut self, index: usize) -> Option<HeapPageIterator> {
        if index >= self.num_pages {
            return None;
        }

        let pid = PageId::new(PageCategory::Heap, self.table_id, index as u32);
        let page_pod = Database::buffer_pool()
            .get_heap_page(&self.tx, Permission::ReadOnly, &pid)
            .unwrap();
        Some(HeapPageIterator::new(page_pod))
    }
}

impl Iterator for HeapTableIterator {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_iter.is_none() {
                self.page_iter = self.open_page(self.page_index);
                self.page_iter.as_ref()?;
            }

            if let Some(t) = self.page_iter.as_mut().unwrap().next() {
                return Some(t);
            }

            // this page is exhausted, move to the next one
            self.page_index += 1;
            if self.page_index >= self.num_pages {
                return None;
            }
            self.page_iter = self.open_page(self.page_index);
        }
    }
}
