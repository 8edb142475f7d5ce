use crate::{error::DbError, storage::schema::Schema, storage::tuple::StoredTuple, types::DbResult};

/// The pipeline seam every operator implements. Drivers call `open`,
/// pull with `has_next`/`next`, and either `rewind` (inner side of a
/// nested-loop join) or `close`. Failures bubble up through the
/// `Result`s, a lock give-up deep in a scan included.
pub trait OpIterator {
    fn open(&mut self) -> DbResult;

    fn close(&mut self);

    fn has_next(&mut self) -> Result<bool, DbError>;

    fn next(&mut self) -> Result<StoredTuple, DbError>;

    /// Back to the first tuple, as if freshly opened.
    fn rewind(&mut self) -> DbResult;

    fn get_schema(&self) -> Schema;
}
