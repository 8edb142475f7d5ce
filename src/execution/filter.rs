use crate::{
    error::DbError,
    execution::{op_iterator::OpIterator, predicate::Predicate},
    storage::{schema::Schema, tuple::StoredTuple},
    types::DbResult,
};

/// Passes through the child tuples satisfying the predicate.
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,

    peeked: Option<StoredTuple>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            peeked: None,
        }
    }

    fn fetch(&mut self) -> Result<Option<StoredTuple>, DbError> {
        while self.child.has_next()? {
            let t = self.child.next()?;
            if self.predicate.filter(&t) {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> DbResult {
        self.child.open()?;
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.peeked = None;
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if self.peeked.is_none() {
            self.peeked = self.fetch()?;
        }
        Ok(self.peeked.is_some())
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        if !self.has_next()? {
            return Err(DbError::new("filter is exhausted"));
        }
        Ok(self.peeked.take().unwrap())
    }

    fn rewind(&mut self) -> DbResult {
        self.child.rewind()?;
        self.peeked = None;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        self.child.get_schema()
    }
}
