mod header;
mod internal;
mod leaf;
mod root_pointer;

pub use header::BTreeHeaderPage;
pub use internal::{BTreeInternalPage, BTreeInternalPageIterator, Entry};
pub use leaf::{BTreeLeafPage, BTreeLeafPageIterator, BTreeLeafPageIteratorRc};
pub use root_pointer::BTreeRootPointerPage;
