use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreeRootPointerPage,
    },
    common::Database,
    error::DbError,
    heap::HeapPage,
    storage::{
        page::{Page, PageCategory, PageId},
        tuple::{StoredTuple, Tuple},
    },
    transaction::{LockManager, Permission, Transaction},
    types::{ConcurrentHashMap, DbResult, Pod, ResultPod},
    utils::HandyRwLock,
    wal::LogManager,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Default number of resident pages.
pub const DEFAULT_PAGES: usize = 50;
static CAPACITY: AtomicUsize = AtomicUsize::new(DEFAULT_PAGES);

/// The shared page cache. Serves every transaction, checks locks on
/// each access, and evicts clean pages in LRU order when full. Dirty
/// pages are pinned in memory until their transaction commits
/// (NO STEAL), and a committing transaction flushes everything it
/// dirtied before the commit record is written (FORCE).
pub struct BufferPool {
    root_pointer_buffer: ConcurrentHashMap<PageId, Pod<BTreeRootPointerPage>>,
    header_buffer: ConcurrentHashMap<PageId, Pod<BTreeHeaderPage>>,
    internal_buffer: ConcurrentHashMap<PageId, Pod<BTreeInternalPage>>,
    leaf_buffer: ConcurrentHashMap<PageId, Pod<BTreeLeafPage>>,
    heap_buffer: ConcurrentHashMap<PageId, Pod<HeapPage>>,

    /// Most-recently-used page ids live at the back.
    access_order: Mutex<VecDeque<PageId>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            root_pointer_buffer: ConcurrentHashMap::new(),
            header_buffer: ConcurrentHashMap::new(),
            internal_buffer: ConcurrentHashMap::new(),
            leaf_buffer: ConcurrentHashMap::new(),
            heap_buffer: ConcurrentHashMap::new(),
            access_order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
    }

    pub fn get_capacity() -> usize {
        CAPACITY.load(Ordering::Relaxed)
    }

    pub fn set_capacity(capacity: usize) {
        CAPACITY.store(capacity, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.root_pointer_buffer.clear();
        self.header_buffer.clear();
        self.internal_buffer.clear();
        self.leaf_buffer.clear();
        self.heap_buffer.clear();
        self.access_order.lock().unwrap().clear();
    }

    fn resident_count(&self) -> usize {
        self.root_pointer_buffer.len()
            + self.header_buffer.len()
            + self.internal_buffer.len()
            + self.leaf_buffer.len()
            + self.heap_buffer.len()
    }

    fn all_keys(&self) -> Vec<PageId> {
        let mut keys = Vec::new();
        keys.append(&mut self.root_pointer_buffer.keys());
        keys.append(&mut self.header_buffer.keys());
        keys.append(&mut self.internal_buffer.keys());
        keys.append(&mut self.leaf_buffer.keys());
        keys.append(&mut self.heap_buffer.keys());
        keys
    }

    /// Record an access: the page id moves to the MRU end.
    fn touch(&self, pid: &PageId) {
        let mut order = self.access_order.lock().unwrap();
        order.retain(|p| p != pid);
        order.push_back(*pid);
    }
}

// page retrieval
impl BufferPool {
    /// The central contract. Translates the permission into a page
    /// lock (blocking, maybe aborting), then serves the page from the
    /// cache or from disk, evicting a clean page if the pool is full.
    fn get_page<PAGE: Page>(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
        buffer: &ConcurrentHashMap<PageId, Pod<PAGE>>,
    ) -> ResultPod<PAGE> {
        LockManager::acquire_lock(tx, &perm.to_lock(), pid)?;

        if let Some(page) = buffer.get(pid) {
            self.touch(pid);
            return Ok(page);
        }

        while self.resident_count() >= Self::get_capacity() {
            self.evict_page()?;
        }

        let page = self.load_page(pid)?;
        buffer.insert(*pid, page.clone());
        self.touch(pid);
        Ok(page)
    }

    fn load_page<PAGE: Page>(&self, pid: &PageId) -> ResultPod<PAGE> {
        // hold the catalog guard only for the lookup
        let table_pod = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", pid.table_id)))?;
        let table = table_pod.rl();

        let buf = table.read_page_data(pid)?;
        let page = PAGE::new(pid, &buf, &table.get_schema(), table.get_key_field());

        debug!("loaded page {} from disk", pid);
        Ok(Arc::new(RwLock::new(page)))
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeRootPointerPage> {
        self.get_page(tx, perm, pid, &self.root_pointer_buffer)
    }

    pub fn get_header_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeHeaderPage> {
        self.get_page(tx, perm, pid, &self.header_buffer)
    }

    pub fn get_internal_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeInternalPage> {
        self.get_page(tx, perm, pid, &self.internal_buffer)
    }

    pub fn get_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<BTreeLeafPage> {
        self.get_page(tx, perm, pid, &self.leaf_buffer)
    }

    pub fn get_heap_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageId,
    ) -> ResultPod<HeapPage> {
        self.get_page(tx, perm, pid, &self.heap_buffer)
    }

    /// Put a freshly created page straight into the cache. Used when a
    /// file materializes a new page that is about to be written to.
    pub fn install_leaf_page(&self, pid: &PageId, page: Pod<BTreeLeafPage>) {
        self.leaf_buffer.insert(*pid, page);
        self.touch(pid);
    }

    pub fn install_internal_page(&self, pid: &PageId, page: Pod<BTreeInternalPage>) {
        self.internal_buffer.insert(*pid, page);
        self.touch(pid);
    }

    pub fn install_header_page(&self, pid: &PageId, page: Pod<BTreeHeaderPage>) {
        self.header_buffer.insert(*pid, page);
        self.touch(pid);
    }
}

// eviction
impl BufferPool {
    /// Make one full pass over the access list from the LRU end and
    /// drop the first clean page found. Dirty pages are skipped and
    /// re-queued at the MRU end: uncommitted data never reaches disk
    /// through eviction (NO STEAL). Fails when every resident page is
    /// dirty.
    fn evict_page(&self) -> DbResult {
        let mut order = self.access_order.lock().unwrap();

        for _ in 0..order.len() {
            let pid = match order.pop_front() {
                Some(pid) => pid,
                None => break,
            };

            match self.evictable(&pid) {
                // a stale entry, the page is gone already
                None => continue,
                Some(true) => {
                    // clean page: nothing to write, just drop it
                    debug!("evicting page {}", pid);
                    self.remove_page(&pid);
                    return Ok(());
                }
                Some(false) => {
                    order.push_back(pid);
                }
            }
        }

        Err(DbError::new(
            "cannot evict: every page in the buffer pool is dirty",
        ))
    }

    /// `None` when the page is not resident; `Some(true)` when the
    /// page is clean and idle. A page whose lock cannot be taken right
    /// now is in active use and is treated like a dirty one.
    fn evictable(&self, pid: &PageId) -> Option<bool> {
        fn check<PAGE: Page>(pod: &Pod<PAGE>) -> bool {
            match pod.try_read() {
                Ok(page) => page.get_dirtier().is_none(),
                Err(_) => false,
            }
        }

        match pid.category {
            PageCategory::RootPointer => self.root_pointer_buffer.get(pid).map(|p| check(&p)),
            PageCategory::Header => self.header_buffer.get(pid).map(|p| check(&p)),
            PageCategory::Internal => self.internal_buffer.get(pid).map(|p| check(&p)),
            PageCategory::Leaf => self.leaf_buffer.get(pid).map(|p| check(&p)),
            PageCategory::Heap => self.heap_buffer.get(pid).map(|p| check(&p)),
        }
    }

    /// `None` when the page is not resident; otherwise the page's
    /// dirtier, if any.
    fn dirtier_of(&self, pid: &PageId) -> Option<Option<u64>> {
        match pid.category {
            PageCategory::RootPointer => {
                self.root_pointer_buffer.get(pid).map(|p| p.rl().get_dirtier())
            }
            PageCategory::Header => self.header_buffer.get(pid).map(|p| p.rl().get_dirtier()),
            PageCategory::Internal => {
                self.internal_buffer.get(pid).map(|p| p.rl().get_dirtier())
            }
            PageCategory::Leaf => self.leaf_buffer.get(pid).map(|p| p.rl().get_dirtier()),
            PageCategory::Heap => self.heap_buffer.get(pid).map(|p| p.rl().get_dirtier()),
        }
    }

    fn remove_page(&self, pid: &PageId) {
        match pid.category {
            PageCategory::RootPointer => {
                self.root_pointer_buffer.remove(pid);
            }
            PageCategory::Header => {
                self.header_buffer.remove(pid);
            }
            PageCategory::Internal => {
                self.internal_buffer.remove(pid);
            }
            PageCategory::Leaf => {
                self.leaf_buffer.remove(pid);
            }
            PageCategory::Heap => {
                self.heap_buffer.remove(pid);
            }
        }
    }

    /// Whether the page currently lives in the cache. Test support.
    pub fn is_resident(&self, pid: &PageId) -> bool {
        self.dirtier_of(pid).is_some()
    }

    /// Remove the page without flushing. Needed by the recovery
    /// manager so the cache never keeps a rolled back page, and by the
    /// B+ tree so reclaimed pages can be reused safely.
    pub fn discard_page(&self, pid: &PageId) {
        self.remove_page(pid);
        let mut order = self.access_order.lock().unwrap();
        order.retain(|p| p != pid);
    }
}

// flushing and transaction completion
impl BufferPool {
    fn flush_page_of<PAGE: Page>(
        &self,
        pid: &PageId,
        buffer: &ConcurrentHashMap<PageId, Pod<PAGE>>,
        log_manager: &mut LogManager,
        refresh_before_image: bool,
    ) -> DbResult {
        let pod = match buffer.get(pid) {
            Some(pod) => pod,
            None => return Ok(()),
        };

        let (dirtier, before, after) = {
            let page = pod.rl();
            (
                page.get_dirtier(),
                page.get_before_image(),
                page.get_page_data(),
            )
        };

        let tid = match dirtier {
            Some(tid) => tid,
            // clean pages are already on disk
            None => return Ok(()),
        };

        // WAL discipline: the UPDATE record is durable before the page
        // bytes are
        log_manager.log_update(tid, pid, &before, &after)?;

        let table_pod = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", pid.table_id)))?;
        table_pod.rl().write_page_to_disk(pid, &after)?;

        let mut page = pod.wl();
        if refresh_before_image {
            // later aborts roll back to this commit point
            page.set_before_image();
        }
        page.mark_dirty(None);

        debug!("flushed page {}", pid);
        Ok(())
    }

    fn flush_page(&self, pid: &PageId, log_manager: &mut LogManager, refresh: bool) -> DbResult {
        match pid.category {
            PageCategory::RootPointer => {
                self.flush_page_of(pid, &self.root_pointer_buffer, log_manager, refresh)
            }
            PageCategory::Header => {
                self.flush_page_of(pid, &self.header_buffer, log_manager, refresh)
            }
            PageCategory::Internal => {
                self.flush_page_of(pid, &self.internal_buffer, log_manager, refresh)
            }
            PageCategory::Leaf => {
                self.flush_page_of(pid, &self.leaf_buffer, log_manager, refresh)
            }
            PageCategory::Heap => {
                self.flush_page_of(pid, &self.heap_buffer, log_manager, refresh)
            }
        }
    }

    /// Flush every dirty page. Checkpoints use this; it knowingly
    /// pushes uncommitted data to disk, which only the logged
    /// before-images make safe.
    pub fn flush_all_pages(&self, log_manager: &mut LogManager) -> DbResult {
        for pid in self.all_keys() {
            self.flush_page(&pid, log_manager, false)?;
        }
        Ok(())
    }

    fn pages_dirtied_by(&self, tx: &Transaction) -> Vec<PageId> {
        let tid = tx.get_id();
        self.all_keys()
            .into_iter()
            .filter(|pid| self.dirtier_of(pid) == Some(Some(tid)))
            .collect()
    }

    /// Commit or abort the transaction's footprint in the cache.
    ///
    /// On commit, every page the transaction dirtied is logged,
    /// persisted, gets a fresh before-image and is marked clean
    /// (FORCE). On abort the cached copies are replaced by fresh disk
    /// reads; NO STEAL guarantees the on-disk state is the consistent
    /// pre-image.
    pub fn tx_complete(&self, tx: &Transaction, commit: bool) -> DbResult {
        if commit {
            let mut log_manager = Database::mut_log_manager();
            for pid in self.pages_dirtied_by(tx) {
                self.flush_page(&pid, &mut log_manager, true)?;
            }
            return Ok(());
        }

        for pid in self.pages_dirtied_by(tx) {
            self.reload_page(&pid)?;
            self.touch(&pid);
        }
        Ok(())
    }

    fn reload_page(&self, pid: &PageId) -> DbResult {
        match pid.category {
            PageCategory::RootPointer => {
                let page = self.load_page(pid)?;
                self.root_pointer_buffer.insert(*pid, page);
            }
            PageCategory::Header => {
                let page = self.load_page(pid)?;
                self.header_buffer.insert(*pid, page);
            }
            PageCategory::Internal => {
                let page = self.load_page(pid)?;
                self.internal_buffer.insert(*pid, page);
            }
            PageCategory::Leaf => {
                let page = self.load_page(pid)?;
                self.leaf_buffer.insert(*pid, page);
            }
            PageCategory::Heap => {
                let page = self.load_page(pid)?;
                self.heap_buffer.insert(*pid, page);
            }
        }
        Ok(())
    }
}

// tuple mutation entry points
impl BufferPool {
    /// Add a tuple to the given table. The file reports the pages it
    /// touched; each is marked dirty on behalf of the transaction and
    /// promoted to MRU.
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &Tuple) -> DbResult {
        let table_pod = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", table_id)))?;
        let table = table_pod.rl();

        let dirtied = table.insert_tuple(tx, tuple)?;
        for pid in dirtied {
            self.mark_page_dirty(&pid, tx);
            self.touch(&pid);
        }
        Ok(())
    }

    /// Remove the tuple its record id points at.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &StoredTuple) -> DbResult {
        let (pid, _) = tuple
            .rid()
            .ok_or_else(|| DbError::illegal("tuple is not stored on any page"))?;
        let table_id = pid.get_table_id();
        let table_pod = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", table_id)))?;
        let table = table_pod.rl();

        let dirtied = table.delete_tuple(tx, tuple)?;
        for pid in dirtied {
            self.mark_page_dirty(&pid, tx);
            self.touch(&pid);
        }
        Ok(())
    }

    fn mark_page_dirty(&self, pid: &PageId, tx: &Transaction) {
        match pid.category {
            PageCategory::RootPointer => {
                if let Some(p) = self.root_pointer_buffer.get(pid) {
                    p.wl().mark_dirty(Some(tx));
                }
            }
            PageCategory::Header => {
                if let Some(p) = self.header_buffer.get(pid) {
                    p.wl().mark_dirty(Some(tx));
                }
            }
            PageCategory::Internal => {
                if let Some(p) = self.internal_buffer.get(pid) {
                    p.wl().mark_dirty(Some(tx));
                }
            }
            PageCategory::Leaf => {
                if let Some(p) = self.leaf_buffer.get(pid) {
                    p.wl().mark_dirty(Some(tx));
                }
            }
            PageCategory::Heap => {
                if let Some(p) = self.heap_buffer.get(pid) {
                    p.wl().mark_dirty(Some(tx));
                }
            }
        }
    }

    /// Release a single page lock before the transaction ends. The one
    /// sanctioned breach of strict two-phase locking: the heap insert
    /// probe releases pages it only inspected and never changed.
    /// Anything else calling this risks dirty reads.
    pub fn unsafe_release_page(&self, tx: &Transaction, pid: &PageId) {
        Database::mut_lock_manager().release_lock(tx, pid);
    }
}
