use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{common::Database, types::DbResult};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A transaction handle. Born on `start`, lives until `commit` or
/// `abort`, at which point every lock it holds is released (strict
/// two-phase locking).
#[derive(Eq, Hash, PartialEq, Clone, Copy)]
pub struct Transaction {
    // increases monotonically by 1
    uuid: u64,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            uuid: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn start(&self) -> DbResult {
        Database::mut_log_manager().log_start(self)
    }

    pub fn commit(&self) -> DbResult {
        self.complete(true)
    }

    pub fn abort(&self) -> DbResult {
        self.complete(false)
    }

    fn complete(&self, commit: bool) -> DbResult {
        if !commit {
            // writes the abort record and rolls the on-disk state back
            Database::mut_log_manager().log_abort(self)?;
        }

        // flush on commit (FORCE), drop cached copies on abort
        Database::buffer_pool().tx_complete(self, commit)?;

        if commit {
            Database::mut_log_manager().log_commit(self)?;
        }

        Database::mut_lock_manager().release_all(self);
        Ok(())
    }

    pub fn get_id(&self) -> u64 {
        self.uuid
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.uuid)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
