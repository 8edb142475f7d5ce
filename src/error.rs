use std::{error::Error, fmt};

use backtrace::Backtrace;

/// Broad failure classes, so callers can tell a lock give-up (which
/// must roll the transaction back) apart from ordinary faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lock acquisition exhausted its retry bound; the caller must
    /// abort the transaction.
    TransactionAborted,

    /// Semantic faults: occupied slot on insert, empty slot on delete,
    /// all-dirty buffer pool, corrupted page.
    Database,

    /// Disk read/write failure.
    Io,

    /// Out-of-range page number, schema mismatch and similar misuse.
    IllegalArgument,
}

#[derive(Debug)]
pub struct DbError {
    kind: ErrorKind,
    details: String,
}

impl DbError {
    pub fn new(msg: &str) -> DbError {
        Self::with_kind(ErrorKind::Database, msg)
    }

    pub fn aborted(msg: &str) -> DbError {
        Self::with_kind(ErrorKind::TransactionAborted, msg)
    }

    pub fn io(msg: &str) -> DbError {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn illegal(msg: &str) -> DbError {
        Self::with_kind(ErrorKind::IllegalArgument, msg)
    }

    fn with_kind(kind: ErrorKind, msg: &str) -> DbError {
        let bt = Backtrace::new();
        let details = format!("msg: [{}]\nerror backtrace:\n{:?}", msg, bt);
        DbError { kind, details }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == ErrorKind::TransactionAborted
    }

    pub fn show_backtrace(&self) {
        println!("{}", self.details);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.details)
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::io(&e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = DbError::aborted("lock give-up");
        assert!(err.is_aborted());

        let err = DbError::new("occupied slot");
        assert_eq!(err.kind(), ErrorKind::Database);
    }
}
