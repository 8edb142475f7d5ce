mod test_utils;

use pagedb::{
    btree::page::BTreeLeafPage, buffer::BufferPool, storage::schema::Schema,
    transaction::Transaction, utils::HandyRwLock,
};

use test_utils::{delete_btree_key, insert_btree_keys, look_for, new_btree_table, setup};

fn leaf_cap() -> usize {
    BTreeLeafPage::calculate_slots_count(&Schema::small_int_schema(2))
}

#[test]
fn test_delete_from_single_leaf() {
    let _guard = setup();

    let table = new_btree_table("btree_delete_leaf", 2, 0);
    insert_btree_keys(&table, &[1, 2, 3, 4, 5], 10);

    let tx = Transaction::new();
    tx.start().unwrap();
    delete_btree_key(&table, &tx, 3);
    tx.commit().unwrap();

    assert_eq!(look_for(&table, 3), 0);
    assert_eq!(look_for(&table, 2), 1);
    table.rl().as_btree().check_integrity(true);
}

#[test]
fn test_redistribute_between_leaves() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("btree_redistribute", 2, 0);

    // two full leaves
    let count = leaf_cap() as i64 * 2;
    let keys: Vec<i64> = (0..count).collect();
    insert_btree_keys(&table, &keys, 16);

    // drain the left leaf until it borrows from its sibling
    let tx = Transaction::new();
    tx.start().unwrap();
    for key in 0..(leaf_cap() as i64 * 2 / 3) {
        delete_btree_key(&table, &tx, key);
    }
    tx.commit().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();
    btree.check_integrity(true);

    let survivors = (leaf_cap() as i64 * 2 / 3)..count;
    assert_eq!(btree.tuples_count(), survivors.count());
}

#[test]
fn test_merge_and_root_collapse() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("btree_merge", 2, 0);

    let count = leaf_cap() as i64 * 2;
    let keys: Vec<i64> = (0..count).collect();
    insert_btree_keys(&table, &keys, 16);

    // delete everything but a handful; the two leaves must merge and
    // the internal root must hand over to the surviving leaf
    let tx = Transaction::new();
    tx.start().unwrap();
    for key in 5..count {
        delete_btree_key(&table, &tx, key);
    }
    tx.commit().unwrap();

    let guard = table.rl();
    let btree = guard.as_btree();
    btree.check_integrity(true);
    assert_eq!(btree.tuples_count(), 5);

    for key in 0..5 {
        assert_eq!(look_for(&table, key), 1);
    }
}

#[test]
fn test_reclaimed_pages_are_reused() {
    let _guard = setup();

    BufferPool::set_page_size(1024);
    BufferPool::set_capacity(256);

    let table = new_btree_table("btree_reuse", 2, 0);

    let count = leaf_cap() as i64 * 2;
    let keys: Vec<i64> = (0..count).collect();
    insert_btree_keys(&table, &keys, 16);

    // merge the leaves, freeing a page
    let tx = Transaction::new();
    tx.start().unwrap();
    for key in 3..count {
        delete_btree_key(&table, &tx, key);
    }
    tx.commit().unwrap();

    let pages_after_shrink = table.rl().as_btree().pages_count();

    // growing again should pull indexes from the header bitmap before
    // the file grows
    insert_btree_keys(&table, &keys[3..(leaf_cap() + 3)], 16);

    let guard = table.rl();
    let btree = guard.as_btree();
    btree.check_integrity(true);

    assert!(
        btree.pages_count() <= pages_after_shrink + 1,
        "file grew past the reclaimed slots: {} -> {}",
        pages_after_shrink,
        btree.pages_count()
    );
}

#[test]
fn test_delete_then_lookup_misses() {
    let _guard = setup();

    let table = new_btree_table("btree_delete_lookup", 2, 0);
    insert_btree_keys(&table, &[10, 20, 30], 10);

    let tx = Transaction::new();
    tx.start().unwrap();
    delete_btree_key(&table, &tx, 20);
    tx.commit().unwrap();

    assert_eq!(look_for(&table, 20), 0);
    assert_eq!(look_for(&table, 10), 1);
    assert_eq!(look_for(&table, 30), 1);
}
