use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    thread::sleep,
    time::Duration,
};

use log::debug;

use crate::{
    common::Database, error::DbError, storage::page::PageId, transaction::Transaction,
    types::DbResult,
};

/// How many grant attempts a request makes before the engine declares
/// the transaction dead. The retry bound is the sole deadlock
/// discipline; there is no waits-for graph.
static ACQUIRE_RETRIES: AtomicUsize = AtomicUsize::new(3);

const RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Lock {
    Shared,
    Exclusive,
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::Shared,
            Permission::ReadWrite => Lock::Exclusive,
        }
    }
}

/// Per-page reader/writer locks, per transaction. At most one lock
/// record exists per (page, transaction); an exclusive request from the
/// sole shared holder upgrades that record in place.
pub struct LockManager {
    s_lock_map: HashMap<PageId, HashSet<u64>>,
    x_lock_map: HashMap<PageId, u64>,

    hold_pages: HashMap<u64, HashSet<PageId>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            s_lock_map: HashMap::new(),
            x_lock_map: HashMap::new(),
            hold_pages: HashMap::new(),
        }
    }

    pub fn set_acquire_retries(retries: usize) {
        ACQUIRE_RETRIES.store(retries, Ordering::Relaxed);
    }

    /// Request a lock on the given page. Blocks between attempts; when
    /// the retry bound is exhausted the request fails with
    /// `TransactionAborted` and the caller must roll back.
    pub fn acquire_lock(tx: &Transaction, lock: &Lock, pid: &PageId) -> DbResult {
        let retries = ACQUIRE_RETRIES.load(Ordering::Relaxed);

        for attempt in 0..retries {
            // take the manager's guard only for the attempt itself
            {
                let mut manager = Database::mut_lock_manager();
                if manager.try_acquire(tx, lock, pid) {
                    return Ok(());
                }
            }

            debug!(
                "lock contended, attempt {}/{}, args: {:?}, {:?}, {:?}",
                attempt + 1,
                retries,
                tx,
                lock,
                pid,
            );
            sleep(RETRY_DELAY);
        }

        Err(DbError::aborted(&format!(
            "lock acquisition gave up after {} attempts, args: {:?}, {:?}, {:?}",
            retries, tx, lock, pid,
        )))
    }

    /// A single grant attempt. Returns false when the request must keep
    /// waiting.
    fn try_acquire(&mut self, tx: &Transaction, lock: &Lock, pid: &PageId) -> bool {
        let tid = tx.get_id();

        // a transaction already holding exclusive is satisfied by any
        // subsequent request on that page
        if let Some(holder) = self.x_lock_map.get(pid) {
            if *holder != tid {
                return false;
            }
            return true;
        }

        match lock {
            Lock::Shared => {
                self.s_lock_map.entry(*pid).or_default().insert(tid);
            }
            Lock::Exclusive => {
                if let Some(holders) = self.s_lock_map.get(pid) {
                    if holders.iter().any(|t| *t != tid) {
                        // other shared holders block the upgrade
                        return false;
                    }
                }

                // upgrade: the sole shared record becomes exclusive
                if let Some(holders) = self.s_lock_map.get_mut(pid) {
                    holders.remove(&tid);
                    if holders.is_empty() {
                        self.s_lock_map.remove(pid);
                    }
                }
                self.x_lock_map.insert(*pid, tid);
            }
        }

        self.hold_pages.entry(tid).or_default().insert(*pid);
        true
    }

    pub fn release_lock(&mut self, tx: &Transaction, pid: &PageId) {
        let tid = tx.get_id();

        if let Some(holders) = self.s_lock_map.get_mut(pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                self.s_lock_map.remove(pid);
            }
        }

        if self.x_lock_map.get(pid) == Some(&tid) {
            self.x_lock_map.remove(pid);
        }

        if let Some(pages) = self.hold_pages.get_mut(&tid) {
            pages.remove(pid);
            if pages.is_empty() {
                self.hold_pages.remove(&tid);
            }
        }
    }

    pub fn release_all(&mut self, tx: &Transaction) {
        let pages: Vec<PageId> = self
            .hold_pages
            .get(&tx.get_id())
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        for pid in pages {
            self.release_lock(tx, &pid);
        }
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &PageId) -> bool {
        let tid = tx.get_id();

        if self.x_lock_map.get(pid) == Some(&tid) {
            return true;
        }
        self.s_lock_map
            .get(pid)
            .map_or(false, |holders| holders.contains(&tid))
    }

    pub fn hold_pages(&self, tx: &Transaction) -> Vec<PageId> {
        self.hold_pages
            .get(&tx.get_id())
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.s_lock_map.clear();
        self.x_lock_map.clear();
        self.hold_pages.clear();
    }
}

impl fmt::Display for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "s_lock_map: {{")?;
        for (pid, holders) in &self.s_lock_map {
            writeln!(f, "\t{:?} -> {:?}", pid, holders)?;
        }
        writeln!(f, "}}")?;

        writeln!(f, "x_lock_map: {{")?;
        for (pid, holder) in &self.x_lock_map {
            writeln!(f, "\t{:?} -> {:?}", pid, holder)?;
        }
        write!(f, "}}")
    }
}
