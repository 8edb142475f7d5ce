mod test_utils;

use pagedb::{
    buffer::BufferPool,
    heap::HeapPage,
    storage::{
        schema::Schema,
        tuple::{Cell, StoredTuple, Tuple},
    },
    transaction::Transaction,
    utils::HandyRwLock,
    Database,
};

use test_utils::{heap_rows, insert_heap_rows, new_heap_table, setup};

#[test]
fn test_insert_delete_round_trip() {
    let _guard = setup();

    let table = new_heap_table("heap_round_trip", 2);
    insert_heap_rows(&table, &[vec![1, 10], vec![2, 20], vec![3, 30]]);

    // find and delete (2, 20)
    let tx = Transaction::new();
    tx.start().unwrap();
    let victim: StoredTuple = {
        let guard = table.rl();
        guard
            .as_heap()
            .iter(&tx)
            .find(|t| t.get_cell(0) == Cell::Int64(2))
            .unwrap()
    };
    Database::buffer_pool().delete_tuple(&tx, &victim).unwrap();
    tx.commit().unwrap();

    let mut rows = heap_rows(&table);
    rows.sort();
    assert_eq!(rows, vec![vec![1, 10], vec![3, 30]]);
}

#[test]
fn test_record_ids_stable_across_deletes() {
    let _guard = setup();

    let table = new_heap_table("heap_rids", 2);
    insert_heap_rows(&table, &[vec![1, 10], vec![2, 20], vec![3, 30]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let before: Vec<StoredTuple> = table.rl().as_heap().iter(&tx).collect();
    let victim = before
        .iter()
        .find(|t| t.get_cell(0) == Cell::Int64(2))
        .unwrap()
        .clone();
    Database::buffer_pool().delete_tuple(&tx, &victim).unwrap();
    tx.commit().unwrap();

    let tx = Transaction::new();
    tx.start().unwrap();
    let after: Vec<StoredTuple> = table.rl().as_heap().iter(&tx).collect();
    tx.commit().unwrap();

    // the survivors kept their slots
    for t in &after {
        let original = before
            .iter()
            .find(|b| b.get_cell(0) == t.get_cell(0))
            .unwrap();
        assert_eq!(original.rid(), t.rid());
    }
}

#[test]
fn test_file_grows_by_whole_pages() {
    let _guard = setup();

    let table = new_heap_table("heap_growth", 2);

    let slots = HeapPage::calculate_slots_count(&Schema::small_int_schema(2));
    let rows: Vec<Vec<i64>> = (0..(slots as i64 + 10)).map(|i| vec![i, i]).collect();
    insert_heap_rows(&table, &rows);

    let guard = table.rl();
    let heap = guard.as_heap();
    assert_eq!(heap.num_pages(), 2);

    let file_len = heap.get_file().metadata().unwrap().len();
    assert_eq!(file_len % BufferPool::get_page_size() as u64, 0);

    drop(guard);
    let found = heap_rows(&table);
    assert_eq!(found.len(), slots + 10);
}

#[test]
fn test_full_probe_pages_are_released() {
    let _guard = setup();

    let table = new_heap_table("heap_probe", 2);

    // fill page 0 exactly
    let slots = HeapPage::calculate_slots_count(&Schema::small_int_schema(2));
    let rows: Vec<Vec<i64>> = (0..slots as i64).map(|i| vec![i, i]).collect();
    insert_heap_rows(&table, &rows);

    // the next insert probes page 0, gives it up, and appends page 1
    let table_id = table.rl().get_id();
    let tx = Transaction::new();
    tx.start().unwrap();
    Database::buffer_pool()
        .insert_tuple(&tx, table_id, &Tuple::new_int_tuple(999, 2))
        .unwrap();

    let page0 = pagedb::storage::page::PageId::new(
        pagedb::storage::page::PageCategory::Heap,
        table_id,
        0,
    );
    let page1 = pagedb::storage::page::PageId::new(
        pagedb::storage::page::PageCategory::Heap,
        table_id,
        1,
    );

    let lm = Database::lock_manager();
    assert!(!lm.holds_lock(&tx, &page0), "probe lock was retained");
    assert!(lm.holds_lock(&tx, &page1));
    drop(lm);

    tx.commit().unwrap();
}
