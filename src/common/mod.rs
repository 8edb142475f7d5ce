mod catalog;
mod database;

pub use catalog::{Catalog, TableFile};
pub use database::Database;
