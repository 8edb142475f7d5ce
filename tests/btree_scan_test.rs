mod test_utils;

use pagedb::{
    buffer::BufferPool,
    execution::{Op, Predicate},
    storage::tuple::Cell,
    transaction::Transaction,
    utils::HandyRwLock,
};

use test_utils::{insert_btree_keys, new_btree_table, setup};

#[test]
fn test_scan_in_key_order() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("scan_order", 2, 0);

    // enough for several leaves, inserted out of order
    let mut keys: Vec<i64> = (0..300).rev().collect();
    keys.rotate_left(57);
    insert_btree_keys(&table, &keys, 16);

    let tx = Transaction::new();
    tx.start().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();

    let forward: Vec<i64> = btree.iter(&tx).map(|t| t.get_cell(0).get_int64()).collect();
    let expected: Vec<i64> = (0..300).collect();
    assert_eq!(forward, expected);

    let backward: Vec<i64> = btree
        .iter(&tx)
        .rev()
        .map(|t| t.get_cell(0).get_int64())
        .collect();
    let reversed: Vec<i64> = (0..300).rev().collect();
    assert_eq!(backward, reversed);

    let root_pid = btree.get_root_pid(&tx).unwrap();
    let last = btree.get_last_tuple(&tx, &root_pid).unwrap().unwrap();
    assert_eq!(last.get_cell(0).get_int64(), 299);

    drop(guard);
    tx.commit().unwrap();
}

#[test]
fn test_search_point_lookup() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("scan_point", 2, 0);
    let keys: Vec<i64> = (0..300).collect();
    insert_btree_keys(&table, &keys, 16);

    let tx = Transaction::new();
    tx.start().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();

    let predicate = Predicate::new(0, Op::Equals, &Cell::Int64(217));
    let hits: Vec<i64> = btree
        .search(&tx, &predicate)
        .map(|t| t.get_cell(1).get_int64())
        .collect();
    assert_eq!(hits, vec![2170]);

    drop(guard);
    tx.commit().unwrap();
}

#[test]
fn test_search_range() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("scan_range", 2, 0);
    let keys: Vec<i64> = (0..300).collect();
    insert_btree_keys(&table, &keys, 16);

    let tx = Transaction::new();
    tx.start().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();

    let predicate = Predicate::new(0, Op::GreaterThanOrEq, &Cell::Int64(290));
    let hits: Vec<i64> = btree
        .search(&tx, &predicate)
        .map(|t| t.get_cell(0).get_int64())
        .collect();
    assert_eq!(hits, (290..300).collect::<Vec<i64>>());

    let predicate = Predicate::new(0, Op::LessThan, &Cell::Int64(5));
    let hits: Vec<i64> = btree
        .search(&tx, &predicate)
        .map(|t| t.get_cell(0).get_int64())
        .collect();
    assert_eq!(hits, (0..5).collect::<Vec<i64>>());

    drop(guard);
    tx.commit().unwrap();
}

#[test]
fn test_search_on_non_key_field() {
    let _guard = setup();

    let table = new_btree_table("scan_non_key", 2, 0);
    insert_btree_keys(&table, &[1, 2, 3, 4, 5], 10);

    let tx = Transaction::new();
    tx.start().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();

    // values are key * 10; a non-key predicate walks the whole file
    let predicate = Predicate::new(1, Op::GreaterThan, &Cell::Int64(25));
    let hits: Vec<i64> = btree
        .search(&tx, &predicate)
        .map(|t| t.get_cell(0).get_int64())
        .collect();
    assert_eq!(hits, vec![3, 4, 5]);

    drop(guard);
    tx.commit().unwrap();
}
