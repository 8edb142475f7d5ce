mod test_utils;

use pagedb::{
    storage::tuple::{Cell, StoredTuple, Tuple},
    transaction::Transaction,
    utils::HandyRwLock,
    Database, TableFile,
};

use test_utils::{heap_rows, new_heap_table, setup};

fn insert_row(table: &pagedb::types::Pod<TableFile>, tx: &Transaction, key: i64) {
    let table_id = table.rl().get_id();
    Database::buffer_pool()
        .insert_tuple(tx, table_id, &Tuple::new_int_tuple(key, 2))
        .unwrap();
}

fn commit_insert(table: &pagedb::types::Pod<TableFile>, key_1: i64, key_2: i64) {
    let tx = Transaction::new();
    tx.start().unwrap();
    insert_row(table, &tx, key_1);
    insert_row(table, &tx, key_2);
    tx.commit().unwrap();
}

fn abort_insert(table: &pagedb::types::Pod<TableFile>, key_1: i64, key_2: i64) {
    let tx = Transaction::new();
    tx.start().unwrap();
    insert_row(table, &tx, key_1);
    insert_row(table, &tx, key_2);
    tx.abort().unwrap();
}

fn keys_of(table: &pagedb::types::Pod<TableFile>) -> Vec<i64> {
    let mut keys: Vec<i64> = heap_rows(table).iter().map(|r| r[0]).collect();
    keys.sort();
    keys
}

#[test]
fn test_aborted_data_is_gone() {
    let _guard = setup();

    let table = new_heap_table("log_abort", 2);

    commit_insert(&table, 1, 2);

    // one START, one UPDATE from the commit flush, one COMMIT
    assert_eq!(Database::mut_log_manager().records_count(), 3);

    abort_insert(&table, 3, 4);
    Database::mut_log_manager().show_log_contents();

    assert_eq!(keys_of(&table), vec![1, 2]);
}

#[test]
fn test_abort_after_checkpoint_flush() {
    let _guard = setup();

    let table = new_heap_table("log_abort_flushed", 2);

    commit_insert(&table, 1, 2);

    // the checkpoint pushes the uncommitted page to disk; the abort
    // must pull it back via the logged before-image
    let tx = Transaction::new();
    tx.start().unwrap();
    insert_row(&table, &tx, 3);
    Database::mut_log_manager().log_checkpoint().unwrap();
    insert_row(&table, &tx, 4);
    tx.abort().unwrap();

    assert_eq!(keys_of(&table), vec![1, 2]);
}

#[test]
fn test_committed_data_survives_restart() {
    let _guard = setup();

    let table = new_heap_table("log_restart_commit", 2);
    commit_insert(&table, 1, 2);
    commit_insert(&table, 3, 4);

    // the process dies and comes back; the catalog is re-populated by
    // whoever owns the schema, then recovery runs
    Database::restart();
    Database::mut_catalog().add_table(table.clone());
    Database::mut_log_manager().recover().unwrap();

    assert_eq!(keys_of(&table), vec![1, 2, 3, 4]);
}

#[test]
fn test_loser_transactions_are_undone() {
    let _guard = setup();

    let table = new_heap_table("log_restart_loser", 2);
    commit_insert(&table, 1, 2);

    // a transaction gets its dirty page flushed by a checkpoint and
    // then never commits
    let tx = Transaction::new();
    tx.start().unwrap();
    insert_row(&table, &tx, 3);
    Database::mut_log_manager().log_checkpoint().unwrap();

    Database::restart();
    Database::mut_catalog().add_table(table.clone());
    Database::mut_log_manager().recover().unwrap();

    assert_eq!(keys_of(&table), vec![1, 2]);
}

#[test]
fn test_delete_rolls_back() {
    let _guard = setup();

    let table = new_heap_table("log_delete_rollback", 2);
    commit_insert(&table, 1, 2);

    let tx = Transaction::new();
    tx.start().unwrap();
    let victim: StoredTuple = {
        let guard = table.rl();
        guard
            .as_heap()
            .iter(&tx)
            .find(|t| t.get_cell(0) == Cell::Int64(1))
            .unwrap()
    };
    Database::buffer_pool().delete_tuple(&tx, &victim).unwrap();
    tx.abort().unwrap();

    assert_eq!(keys_of(&table), vec![1, 2]);
}
