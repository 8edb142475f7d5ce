mod test_utils;

use std::thread;

use pagedb::{
    storage::page::{PageCategory, PageId},
    transaction::{Permission, Transaction},
    utils::HandyRwLock,
    Database,
};

use test_utils::{insert_heap_rows, new_heap_table, setup};

fn first_page(table: &pagedb::types::Pod<pagedb::TableFile>) -> PageId {
    PageId::new(PageCategory::Heap, table.rl().get_id(), 0)
}

#[test]
fn test_writer_excludes_reader() {
    let _guard = setup();

    let table = new_heap_table("lock_excl", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let pid = first_page(&table);

    let tx1 = Transaction::new();
    tx1.start().unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadWrite, &pid)
        .unwrap();

    // a reader in another thread burns through its retries and aborts
    let err = thread::scope(|s| {
        s.spawn(|| {
            let tx2 = Transaction::new();
            tx2.start().unwrap();
            let result = Database::buffer_pool().get_heap_page(&tx2, Permission::ReadOnly, &pid);
            tx2.abort().unwrap();
            result.err()
        })
        .join()
        .unwrap()
    });

    assert!(err.unwrap().is_aborted());
    tx1.commit().unwrap();
}

#[test]
fn test_readers_share() {
    let _guard = setup();

    let table = new_heap_table("lock_share", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let pid = first_page(&table);

    let tx1 = Transaction::new();
    let tx2 = Transaction::new();
    tx1.start().unwrap();
    tx2.start().unwrap();

    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadOnly, &pid)
        .unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx2, Permission::ReadOnly, &pid)
        .unwrap();

    {
        let lm = Database::lock_manager();
        assert!(lm.holds_lock(&tx1, &pid));
        assert!(lm.holds_lock(&tx2, &pid));
    }

    tx1.commit().unwrap();
    tx2.commit().unwrap();
}

#[test]
fn test_upgrade_sole_shared_holder() {
    let _guard = setup();

    let table = new_heap_table("lock_upgrade", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let pid = first_page(&table);

    let tx1 = Transaction::new();
    tx1.start().unwrap();

    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadOnly, &pid)
        .unwrap();
    // the sole shared holder may upgrade in place
    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadWrite, &pid)
        .unwrap();

    // now a second reader cannot slip in
    let err = thread::scope(|s| {
        s.spawn(|| {
            let tx2 = Transaction::new();
            tx2.start().unwrap();
            let result = Database::buffer_pool().get_heap_page(&tx2, Permission::ReadOnly, &pid);
            tx2.abort().unwrap();
            result.err()
        })
        .join()
        .unwrap()
    });
    assert!(err.unwrap().is_aborted());

    tx1.commit().unwrap();
}

#[test]
fn test_upgrade_blocked_by_second_reader() {
    let _guard = setup();

    let table = new_heap_table("lock_upgrade_blocked", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let pid = first_page(&table);

    let tx1 = Transaction::new();
    let tx2 = Transaction::new();
    tx1.start().unwrap();
    tx2.start().unwrap();

    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadOnly, &pid)
        .unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx2, Permission::ReadOnly, &pid)
        .unwrap();

    // tx1 cannot upgrade while tx2 reads
    let result = Database::buffer_pool().get_heap_page(&tx1, Permission::ReadWrite, &pid);
    assert!(result.err().unwrap().is_aborted());

    tx1.abort().unwrap();
    tx2.commit().unwrap();
}

#[test]
fn test_locks_released_at_commit() {
    let _guard = setup();

    let table = new_heap_table("lock_release", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);
    let pid = first_page(&table);

    let tx1 = Transaction::new();
    tx1.start().unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx1, Permission::ReadWrite, &pid)
        .unwrap();
    tx1.commit().unwrap();

    {
        let lm = Database::lock_manager();
        assert!(!lm.holds_lock(&tx1, &pid));
    }

    // the page is free again
    let tx2 = Transaction::new();
    tx2.start().unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx2, Permission::ReadWrite, &pid)
        .unwrap();
    tx2.commit().unwrap();
}
