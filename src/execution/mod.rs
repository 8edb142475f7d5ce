mod aggregate;
mod filter;
mod join;
mod modify;
mod op_iterator;
mod predicate;
mod seq_scan;

pub use aggregate::{AggOp, Aggregate};
pub use filter::Filter;
pub use join::Join;
pub use modify::{Delete, Insert};
pub use op_iterator::OpIterator;
pub use predicate::{JoinPredicate, Op, Predicate};
pub use seq_scan::SeqScan;
