use crate::{
    error::DbError,
    execution::{op_iterator::OpIterator, predicate::JoinPredicate},
    storage::{
        schema::Schema,
        tuple::{StoredTuple, Tuple},
    },
    types::DbResult,
};

/// Nested-loop join: for every outer tuple, the inner child is walked
/// (and rewound) in full. Output tuples concatenate the two sides,
/// outer columns first.
pub struct Join {
    predicate: JoinPredicate,
    outer: Box<dyn OpIterator>,
    inner: Box<dyn OpIterator>,

    current_outer: Option<Tuple>,
    peeked: Option<StoredTuple>,
}

impl Join {
    pub fn new(
        predicate: JoinPredicate,
        outer: Box<dyn OpIterator>,
        inner: Box<dyn OpIterator>,
    ) -> Self {
        Self {
            predicate,
            outer,
            inner,
            current_outer: None,
            peeked: None,
        }
    }

    fn fetch(&mut self) -> Result<Option<StoredTuple>, DbError> {
        loop {
            if self.current_outer.is_none() {
                if !self.outer.has_next()? {
                    return Ok(None);
                }
                self.current_outer = Some(self.outer.next()?.get_tuple().clone());
                self.inner.rewind()?;
            }

            let outer = self.current_outer.clone().unwrap();
            while self.inner.has_next()? {
                let inner = self.inner.next()?;
                if self.predicate.filter(&outer, &inner) {
                    let merged = Tuple::merge(&outer, &inner);
                    return Ok(Some(StoredTuple::unstored(merged)));
                }
            }

            // the inner side ran dry, advance the outer side
            self.current_outer = None;
        }
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> DbResult {
        self.outer.open()?;
        self.inner.open()?;
        self.current_outer = None;
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) {
        self.outer.close();
        self.inner.close();
        self.current_outer = None;
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
            return Err(DbError::new("join is exhausted"));
        }
        Ok(self.peeked.take().unwrap())
    }

    fn rewind(&mut self) -> DbResult {
        self.outer.rewind()?;
        self.inner.rewind()?;
        self.current_outer = None;
        self.peeked = None;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        Schema::merge(&self.outer.get_schema(), &self.inner.get_schema())
    }
}
