use crate::{
    common::Database,
    error::DbError,
    execution::op_iterator::OpIterator,
    heap::HeapTableIterator,
    storage::{schema::Schema, tuple::StoredTuple},
    transaction::Transaction,
    types::DbResult,
};

/// Sequential scan over a heap table: a thin wrapper around the heap
/// file iterator.
pub struct SeqScan {
    tx: Transaction,
    table_id: u32,
    schema: Schema,

    iter: Option<HeapTableIterator>,
    peeked: Option<StoredTuple>,
}

impl SeqScan {
    pub fn new(tx: &Transaction, table_id: u32) -> Result<Self, DbError> {
        let table_pod = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", table_id)))?;
        let schema = {
            use crate::utils::HandyRwLock;
            table_pod.rl().get_schema()
        };

        Ok(Self {
            tx: *tx,
            table_id,
            schema,
            iter: None,
            peeked: None,
        })
    }

    fn make_iter(&self) -> Result<HeapTableIterator, DbError> {
        let table_pod = Database::catalog()
            .get_table(&self.table_id)
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", self.table_id)))?;
        use crate::utils::HandyRwLock;
        let table = table_pod.rl();
        Ok(table.as_heap().iter(&self.tx))
    }
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> DbResult {
        self.iter = Some(self.make_iter()?);
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) {
        self.iter = None;
        self.peeked = None;
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        let iter = self
            .iter
            .as_mut()
            .ok_or_else(|| DbError::illegal("scan is not open"))?;
        self.peeked = iter.next();
        Ok(self.peeked.is_some())
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        if !self.has_next()? {
            return Err(DbError::new("scan is exhausted"));
        }
        Ok(self.peeked.take().unwrap())
    }

    fn rewind(&mut self) -> DbResult {
        self.open()
    }

    fn get_schema(&self) -> Schema {
        self.schema.clone()
    }
}
