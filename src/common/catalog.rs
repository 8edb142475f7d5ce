use std::collections::HashMap;

use crate::{
    btree::BTreeTable,
    error::DbError,
    heap::HeapTable,
    storage::{
        page::PageId,
        schema::Schema,
        tuple::{StoredTuple, Tuple},
    },
    transaction::Transaction,
    types::{DbResult, Pod},
};

/// One registered table: a heap file or a B+ tree file. The engine
/// addresses both through the same surface (page IO, schema, tuple
/// mutation); format-specific operations go through `as_heap` /
/// `as_btree`.
pub enum TableFile {
    Heap(HeapTable),
    BTree(BTreeTable),
}

impl TableFile {
    pub fn get_id(&self) -> u32 {
        match self {
            TableFile::Heap(t) => t.get_id(),
            TableFile::BTree(t) => t.get_id(),
        }
    }

    pub fn get_name(&self) -> String {
        match self {
            TableFile::Heap(t) => t.get_name(),
            TableFile::BTree(t) => t.get_name(),
        }
    }

    pub fn get_schema(&self) -> Schema {
        match self {
            TableFile::Heap(t) => t.get_schema(),
            TableFile::BTree(t) => t.get_schema(),
        }
    }

    pub fn get_key_field(&self) -> usize {
        match self {
            TableFile::Heap(_) => 0,
            TableFile::BTree(t) => t.key_field,
        }
    }

    pub fn read_page_data(&self, pid: &PageId) -> Result<Vec<u8>, DbError> {
        match self {
            TableFile::Heap(t) => t.read_page_data(pid),
            TableFile::BTree(t) => t.read_page_data(pid),
        }
    }

    pub fn write_page_to_disk(&self, pid: &PageId, data: &[u8]) -> DbResult {
        match self {
            TableFile::Heap(t) => t.write_page_to_disk(pid, data),
            TableFile::BTree(t) => t.write_page_to_disk(pid, data),
        }
    }

    /// Returns the pages the operation modified. The B+ tree marks its
    /// own footprint dirty as it goes and reports nothing extra.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> Result<Vec<PageId>, DbError> {
        match self {
            TableFile::Heap(t) => t.insert_tuple(tx, tuple),
            TableFile::BTree(t) => {
                t.insert_tuple(tx, tuple)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &StoredTuple,
    ) -> Result<Vec<PageId>, DbError> {
        match self {
            TableFile::Heap(t) => t.delete_tuple(tx, tuple),
            TableFile::BTree(t) => {
                t.delete_tuple(tx, tuple)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn is_heap(&self) -> bool {
        matches!(self, TableFile::Heap(_))
    }

    pub fn as_heap(&self) -> &HeapTable {
        match self {
            TableFile::Heap(t) => t,
            TableFile::BTree(_) => panic!("table is a B+ tree file, not a heap file"),
        }
    }

    pub fn as_btree(&self) -> &BTreeTable {
        match self {
            TableFile::BTree(t) => t,
            TableFile::Heap(_) => panic!("table is a heap file, not a B+ tree file"),
        }
    }
}

/// Resolves table ids to files. The engine consumes this; schema
/// registration beyond `add_table` is someone else's business.
pub struct Catalog {
    map: HashMap<u32, Pod<TableFile>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get_table(&self, table_id: &u32) -> Option<Pod<TableFile>> {
        self.map.get(table_id).cloned()
    }

    pub fn add_table(&mut self, table: Pod<TableFile>) {
        let id = {
            use crate::utils::HandyRwLock;
            table.rl().get_id()
        };
        self.map.insert(id, table);
    }

    pub fn table_ids(&self) -> Vec<u32> {
        self.map.keys().cloned().collect()
    }

    pub fn get_table_name(&self, table_id: &u32) -> Option<String> {
        use crate::utils::HandyRwLock;
        self.map.get(table_id).map(|t| t.rl().get_name())
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
