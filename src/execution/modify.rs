use crate::{
    common::Database,
    error::DbError,
    execution::op_iterator::OpIterator,
    storage::{
        schema::{Field, Schema, Type},
        tuple::{Cell, StoredTuple, Tuple},
    },
    transaction::Transaction,
    types::DbResult,
};

fn count_schema() -> Schema {
    Schema::new(vec![Field::new("count", Type::Int64)])
}

/// Drains its child into the target table through the buffer pool and
/// emits one tuple holding the affected-row count. A second pull
/// yields nothing.
pub struct Insert {
    tx: Transaction,
    table_id: u32,
    child: Box<dyn OpIterator>,

    result: Option<i64>,
    delivered: bool,
}

impl Insert {
    pub fn new(tx: &Transaction, table_id: u32, child: Box<dyn OpIterator>) -> Self {
        Self {
            tx: *tx,
            table_id,
            child,
            result: None,
            delivered: false,
        }
    }
}

impl OpIterator for Insert {
    fn open(&mut self) -> DbResult {
        self.child.open()?;

        let mut count = 0;
        while self.child.has_next()? {
            let t = self.child.next()?;
            Database::buffer_pool().insert_tuple(&self.tx, self.table_id, t.get_tuple())?;
            count += 1;
        }

        self.result = Some(count);
        self.delivered = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.result = None;
        self.delivered = false;
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        Ok(self.result.is_some() && !self.delivered)
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        let count = self
            .result
            .ok_or_else(|| DbError::illegal("insert is not open"))?;
        if self.delivered {
            return Err(DbError::new("insert already reported its count"));
        }
        self.delivered = true;
        Ok(StoredTuple::unstored(Tuple::new(vec![Cell::Int64(count)])))
    }

    fn rewind(&mut self) -> DbResult {
        // the child was consumed exactly once; only the count replays
        self.delivered = false;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        count_schema()
    }
}

/// The deleting twin of `Insert`: every tuple the child produces is
/// removed by record id.
pub struct Delete {
    tx: Transaction,
    child: Box<dyn OpIterator>,

    result: Option<i64>,
    delivered: bool,
}

impl Delete {
    pub fn new(tx: &Transaction, child: Box<dyn OpIterator>) -> Self {
        Self {
            tx: *tx,
            child,
            result: None,
            delivered: false,
        }
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> DbResult {
        self.child.open()?;

        let mut count = 0;
        while self.child.has_next()? {
            let t = self.child.next()?;
            Database::buffer_pool().delete_tuple(&self.tx, &t)?;
            count += 1;
        }

        self.result = Some(count);
        self.delivered = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.result = None;
        self.delivered = false;
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        Ok(self.result.is_some() && !self.delivered)
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        let count = self
            .result
            .ok_or_else(|| DbError::illegal("delete is not open"))?;
        if self.delivered {
            return Err(DbError::new("delete already reported its count"));
        }
        self.delivered = true;
        Ok(StoredTuple::unstored(Tuple::new(vec![Cell::Int64(count)])))
    }

    fn rewind(&mut self) -> DbResult {
        self.delivered = false;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        count_schema()
    }
}
