use std::{
    mem,
    path::PathBuf,
    sync::{Once, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    buffer::{BufferPool, DEFAULT_PAGE_SIZE},
    common::Catalog,
    optimizer::TableStatsMap,
    transaction::LockManager,
    utils::HandyRwLock,
    wal::LogManager,
};

/// All global state lives here: the page cache, the catalog, the lock
/// manager, the log manager, and the table statistics. The components
/// cannot be plain statics because their constructors are not const,
/// and they must be reachable from any thread, hence the classic
/// Once-guarded heap singleton.
pub struct Database {
    path: PathBuf,

    buffer_pool: BufferPool,
    catalog: RwLock<Catalog>,
    lock_manager: RwLock<LockManager>,
    log_manager: RwLock<LogManager>,
    table_stats: RwLock<TableStatsMap>,
}

static mut SINGLETON: *mut Database = 0 as *mut Database;

impl Database {
    fn new() -> Self {
        let db_path = PathBuf::from("data").join("default_db");
        if !db_path.exists() {
            std::fs::create_dir_all(&db_path).unwrap();
        }

        let log_path = db_path.join("wal.log");

        Self {
            path: db_path,

            buffer_pool: BufferPool::new(),
            catalog: RwLock::new(Catalog::new()),
            lock_manager: RwLock::new(LockManager::new()),
            log_manager: RwLock::new(LogManager::new(log_path)),
            table_stats: RwLock::new(TableStatsMap::new()),
        }
    }

    /// Rebuild the in-memory world and truncate the log. Used by test
    /// setups; table files on disk are left alone.
    pub fn reset() {
        BufferPool::set_page_size(DEFAULT_PAGE_SIZE);

        Self::replace_singleton();
        Self::mut_log_manager().reset().unwrap();
    }

    /// Rebuild the in-memory world but keep the log file, simulating a
    /// process that died and came back. Recovery runs against the
    /// preserved log.
    pub fn restart() {
        Self::replace_singleton();
    }

    fn replace_singleton() {
        // ensure the singleton exists before swapping it out
        Self::global();

        let singleton = Self::new();
        unsafe {
            if !SINGLETON.is_null() {
                mem::drop(Box::from_raw(SINGLETON));
            }
            SINGLETON = mem::transmute(Box::new(singleton));
        }
    }

    pub fn global() -> &'static Self {
        static ONCE: Once = Once::new();

        ONCE.call_once(|| {
            let singleton = Self::new();

            unsafe {
                // put it on the heap so it outlives this call
                SINGLETON = mem::transmute(Box::new(singleton));
            }
        });

        unsafe { SINGLETON.as_ref().unwrap() }
    }

    pub fn buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    pub fn mut_lock_manager() -> RwLockWriteGuard<'static, LockManager> {
        Self::global().lock_manager.wl()
    }

    pub fn lock_manager() -> RwLockReadGuard<'static, LockManager> {
        Self::global().lock_manager.rl()
    }

    pub fn mut_log_manager() -> RwLockWriteGuard<'static, LogManager> {
        Self::global().log_manager.wl()
    }

    pub fn table_stats() -> RwLockReadGuard<'static, TableStatsMap> {
        Self::global().table_stats.rl()
    }

    pub fn mut_table_stats() -> RwLockWriteGuard<'static, TableStatsMap> {
        Self::global().table_stats.wl()
    }

    pub fn get_path(&self) -> PathBuf {
        self.path.clone()
    }
}
