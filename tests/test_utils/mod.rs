#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use pagedb::{
    buffer::{BufferPool, DEFAULT_PAGES},
    error::DbError,
    execution::{OpIterator, Op, Predicate},
    storage::{
        schema::Schema,
        tuple::{Cell, StoredTuple, Tuple},
    },
    transaction::{LockManager, Transaction},
    types::{DbResult, Pod},
    utils::{self, HandyRwLock},
    BTreeTable, Database, HeapTable, TableFile,
};

static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serialize the tests of one binary and rebuild the database world.
/// The returned guard must stay alive for the duration of the test.
pub fn setup() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    utils::init_log();
    BufferPool::set_capacity(DEFAULT_PAGES);
    LockManager::set_acquire_retries(3);
    Database::reset();

    guard
}

/// Table files persist across `Database::reset`; tests want to start
/// from scratch.
fn remove_table_file(name: &str) {
    let path = Database::global()
        .get_path()
        .join(name)
        .with_extension("table");
    let _ = std::fs::remove_file(path);
}

pub fn new_heap_table_with_schema(name: &str, schema: &Schema) -> Pod<TableFile> {
    remove_table_file(name);
    let table = HeapTable::new(name, schema);
    let pod = Arc::new(RwLock::new(TableFile::Heap(table)));
    Database::mut_catalog().add_table(pod.clone());
    pod
}

pub fn new_heap_table(name: &str, columns: usize) -> Pod<TableFile> {
    new_heap_table_with_schema(name, &Schema::small_int_schema(columns))
}

pub fn new_btree_table(name: &str, columns: usize, key_field: usize) -> Pod<TableFile> {
    remove_table_file(name);
    let table = BTreeTable::new(name, key_field, &Schema::small_int_schema(columns));
    let pod = Arc::new(RwLock::new(TableFile::BTree(table)));
    Database::mut_catalog().add_table(pod.clone());
    pod
}

/// Insert pre-built tuples through the buffer pool under one
/// committed transaction.
pub fn insert_tuples(table: &Pod<TableFile>, tuples: &[Tuple]) {
    let table_id = table.rl().get_id();

    let tx = Transaction::new();
    tx.start().unwrap();
    for tuple in tuples {
        Database::buffer_pool()
            .insert_tuple(&tx, table_id, tuple)
            .unwrap();
    }
    tx.commit().unwrap();
}

/// Insert all-int rows; the shape most suites use.
pub fn insert_heap_rows(table: &Pod<TableFile>, rows: &[Vec<i64>]) {
    let tuples: Vec<Tuple> = rows
        .iter()
        .map(|row| Tuple::new(row.iter().map(|v| Cell::Int64(*v)).collect()))
        .collect();
    insert_tuples(table, &tuples);
}

/// Every tuple of a heap table, as plain int rows.
pub fn heap_rows(table: &Pod<TableFile>) -> Vec<Vec<i64>> {
    let tx = Transaction::new();
    tx.start().unwrap();

    let rows = {
        let guard = table.rl();
        let heap = guard.as_heap();
        heap.iter(&tx)
            .map(|t| {
                (0..t.field_count())
                    .map(|i| t.get_cell(i).get_int64())
                    .collect()
            })
            .collect()
    };

    tx.commit().unwrap();
    rows
}

/// Insert `keys` into a B+ tree table of 2-column rows, committing
/// every `batch` keys so dirty pages drain out of the pool.
pub fn insert_btree_keys(table: &Pod<TableFile>, keys: &[i64], batch: usize) {
    let mut pending = 0;
    let mut tx = Transaction::new();
    tx.start().unwrap();

    for key in keys {
        let tuple = Tuple::new(vec![Cell::Int64(*key), Cell::Int64(key * 10)]);
        table.rl().as_btree().insert_tuple(&tx, &tuple).unwrap();

        pending += 1;
        if pending >= batch {
            tx.commit().unwrap();
            tx = Transaction::new();
            tx.start().unwrap();
            pending = 0;
        }
    }
    tx.commit().unwrap();
}

/// The number of tuples in the B+ tree matching the key.
pub fn look_for(table: &Pod<TableFile>, key: i64) -> usize {
    let tx = Transaction::new();
    tx.start().unwrap();

    let count = {
        let guard = table.rl();
        let btree = guard.as_btree();
        let predicate = Predicate::new(btree.key_field, Op::Equals, &Cell::Int64(key));
        btree.search(&tx, &predicate).count()
    };

    tx.commit().unwrap();
    count
}

/// Collect and delete every stored tuple matching the key.
pub fn delete_btree_key(table: &Pod<TableFile>, tx: &Transaction, key: i64) {
    let victims: Vec<StoredTuple> = {
        let guard = table.rl();
        let btree = guard.as_btree();
        let predicate = Predicate::new(btree.key_field, Op::Equals, &Cell::Int64(key));
        btree.search(tx, &predicate).collect()
    };

    for victim in victims {
        table.rl().as_btree().delete_tuple(tx, &victim).unwrap();
    }
}

/// A canned child operator over an in-memory tuple list; feeds the
/// insert operator in the query tests.
pub struct TupleList {
    schema: Schema,
    tuples: Vec<Tuple>,
    cursor: usize,
}

impl TupleList {
    pub fn new(schema: Schema, tuples: Vec<Tuple>) -> Self {
        Self {
            schema,
            tuples,
            cursor: 0,
        }
    }

    pub fn of_int_rows(columns: usize, rows: &[Vec<i64>]) -> Self {
        let tuples = rows
            .iter()
            .map(|row| Tuple::new(row.iter().map(|v| Cell::Int64(*v)).collect()))
            .collect();
        Self::new(Schema::small_int_schema(columns), tuples)
    }
}

impl OpIterator for TupleList {
    fn open(&mut self) -> DbResult {
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {}

    fn has_next(&mut self) -> Result<bool, DbError> {
        Ok(self.cursor < self.tuples.len())
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        let t = self.tuples[self.cursor].clone();
        self.cursor += 1;
        Ok(StoredTuple::unstored(t))
    }

    fn rewind(&mut self) -> DbResult {
        self.cursor = 0;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        self.schema.clone()
    }
}
