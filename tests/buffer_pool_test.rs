mod test_utils;

use pagedb::{
    buffer::BufferPool,
    heap::HeapPage,
    storage::{
        page::{Page, PageCategory, PageId},
        schema::Schema,
        tuple::Tuple,
    },
    transaction::{Permission, Transaction},
    utils::HandyRwLock,
    Database,
};

use test_utils::{heap_rows, insert_heap_rows, new_heap_table, setup};

/// A heap table with three pages on disk and nothing in the cache.
fn three_page_table(name: &str) -> (pagedb::types::Pod<pagedb::TableFile>, Vec<PageId>) {
    let table = new_heap_table(name, 2);

    let slots = HeapPage::calculate_slots_count(&Schema::small_int_schema(2)) as i64;
    let rows: Vec<Vec<i64>> = (0..slots * 2 + 1).map(|i| vec![i, i]).collect();
    insert_heap_rows(&table, &rows);

    let table_id = table.rl().get_id();
    assert_eq!(table.rl().as_heap().num_pages(), 3);

    Database::buffer_pool().clear();

    let pids = (0..3)
        .map(|i| PageId::new(PageCategory::Heap, table_id, i))
        .collect();
    (table, pids)
}

#[test]
fn test_lru_evicts_the_clean_page() {
    let _guard = setup();
    let (_table, pids) = three_page_table("bp_evict_clean");

    BufferPool::set_capacity(2);

    let tx = Transaction::new();
    tx.start().unwrap();

    // page 0 stays clean, page 1 is dirtied
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadOnly, &pids[0])
        .unwrap();
    let page1 = Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadWrite, &pids[1])
        .unwrap();
    page1.wl().mark_dirty(Some(&tx));

    // loading page 2 must push out page 0, the LRU clean page
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadOnly, &pids[2])
        .unwrap();

    let pool = Database::buffer_pool();
    assert!(!pool.is_resident(&pids[0]));
    assert!(pool.is_resident(&pids[1]));
    assert!(pool.is_resident(&pids[2]));

    tx.abort().unwrap();
}

#[test]
fn test_all_dirty_pool_refuses_eviction() {
    let _guard = setup();
    let (_table, pids) = three_page_table("bp_all_dirty");

    BufferPool::set_capacity(2);

    let tx = Transaction::new();
    tx.start().unwrap();

    for pid in &pids[0..2] {
        let page = Database::buffer_pool()
            .get_heap_page(&tx, Permission::ReadWrite, pid)
            .unwrap();
        page.wl().mark_dirty(Some(&tx));
    }

    let result = Database::buffer_pool().get_heap_page(&tx, Permission::ReadOnly, &pids[2]);
    let err = result.err().expect("eviction should have failed");
    assert!(!err.is_aborted());

    tx.abort().unwrap();
}

#[test]
fn test_uncommitted_data_never_hits_disk() {
    let _guard = setup();

    let table = new_heap_table("bp_no_steal", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);

    let table_id = table.rl().get_id();
    let tx = Transaction::new();
    tx.start().unwrap();
    Database::buffer_pool()
        .insert_tuple(&tx, table_id, &Tuple::new_int_tuple(42, 2))
        .unwrap();

    // the on-disk page still shows the old state
    let pid = PageId::new(PageCategory::Heap, table_id, 0);
    let on_disk = {
        let guard = table.rl();
        let data = guard.as_heap().read_page_data(&pid).unwrap();
        HeapPage::new(&pid, &data, &Schema::small_int_schema(2), 0)
    };
    assert_eq!(on_disk.tuples_count(), 1);

    // after commit the page is forced out
    tx.commit().unwrap();
    let on_disk = {
        let guard = table.rl();
        let data = guard.as_heap().read_page_data(&pid).unwrap();
        HeapPage::new(&pid, &data, &Schema::small_int_schema(2), 0)
    };
    assert_eq!(on_disk.tuples_count(), 2);
}

#[test]
fn test_abort_restores_cached_pages() {
    let _guard = setup();

    let table = new_heap_table("bp_abort", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let table_id = table.rl().get_id();

    let tx = Transaction::new();
    tx.start().unwrap();
    Database::buffer_pool()
        .insert_tuple(&tx, table_id, &Tuple::new_int_tuple(42, 2))
        .unwrap();
    tx.abort().unwrap();

    let rows = heap_rows(&table);
    assert_eq!(rows, vec![vec![1, 1]]);
}
