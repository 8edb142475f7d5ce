mod test_utils;

use pagedb::{
    execution::{
        AggOp, Aggregate, Delete, Filter, Insert, Join, JoinPredicate, Op, OpIterator,
        Predicate, SeqScan,
    },
    storage::{
        schema::{Field, Schema, Type},
        tuple::{Cell, Tuple},
    },
    transaction::Transaction,
    utils::HandyRwLock,
};

use test_utils::{
    heap_rows, insert_heap_rows, insert_tuples, new_heap_table, new_heap_table_with_schema,
    setup, TupleList,
};

fn drain(op: &mut dyn OpIterator) -> Vec<Vec<i64>> {
    let mut out = Vec::new();
    while op.has_next().unwrap() {
        let t = op.next().unwrap();
        out.push(
            (0..t.field_count())
                .map(|i| t.get_cell(i).get_int64())
                .collect(),
        );
    }
    out
}

// like `drain`, but keeps the cells as-is for mixed-type schemas
fn drain_cells(op: &mut dyn OpIterator) -> Vec<Vec<Cell>> {
    let mut out = Vec::new();
    while op.has_next().unwrap() {
        let t = op.next().unwrap();
        out.push(t.get_cells());
    }
    out
}

#[test]
fn test_filter() {
    let _guard = setup();

    let table = new_heap_table("query_filter", 2);
    insert_heap_rows(
        &table,
        &[vec![1, 10], vec![2, 20], vec![3, 30], vec![4, 40]],
    );

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let predicate = Predicate::new(0, Op::GreaterThan, &Cell::Int64(2));
    let mut filter = Filter::new(predicate, Box::new(scan));

    filter.open().unwrap();
    let mut rows = drain(&mut filter);
    filter.close();
    tx.commit().unwrap();

    rows.sort();
    assert_eq!(rows, vec![vec![3, 30], vec![4, 40]]);
}

#[test]
fn test_nested_loop_join() {
    let _guard = setup();

    let left = new_heap_table("query_join_left", 2);
    let right = new_heap_table("query_join_right", 2);
    insert_heap_rows(&left, &[vec![1, 100], vec![2, 200], vec![3, 300]]);
    insert_heap_rows(&right, &[vec![2, -2], vec![3, -3], vec![5, -5]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let outer = SeqScan::new(&tx, left.rl().get_id()).unwrap();
    let inner = SeqScan::new(&tx, right.rl().get_id()).unwrap();
    let mut join = Join::new(
        JoinPredicate::new(0, Op::Equals, 0),
        Box::new(outer),
        Box::new(inner),
    );

    join.open().unwrap();
    assert_eq!(join.get_schema().field_count(), 4);
    let mut rows = drain(&mut join);
    join.close();
    tx.commit().unwrap();

    rows.sort();
    assert_eq!(rows, vec![vec![2, 200, 2, -2], vec![3, 300, 3, -3]]);
}

#[test]
fn test_aggregate_sum_and_avg() {
    let _guard = setup();

    let table = new_heap_table("query_agg", 2);
    insert_heap_rows(&table, &[vec![1, 1], vec![1, 2], vec![2, 5]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut sum = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Sum).unwrap();
    sum.open().unwrap();
    let mut rows = drain(&mut sum);
    sum.close();
    rows.sort();
    assert_eq!(rows, vec![vec![1, 3], vec![2, 5]]);

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut avg = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Avg).unwrap();
    avg.open().unwrap();
    let mut rows = drain(&mut avg);
    avg.close();
    rows.sort();
    // integer truncation: 3 / 2 = 1
    assert_eq!(rows, vec![vec![1, 1], vec![2, 5]]);

    tx.commit().unwrap();
}

#[test]
fn test_aggregate_min_and_max() {
    let _guard = setup();

    let table = new_heap_table("query_agg_minmax", 2);
    insert_heap_rows(&table, &[vec![1, 7], vec![1, 3], vec![2, 5]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut min = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Min).unwrap();
    min.open().unwrap();
    let mut rows = drain(&mut min);
    min.close();
    rows.sort();
    assert_eq!(rows, vec![vec![1, 3], vec![2, 5]]);

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut max = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Max).unwrap();
    max.open().unwrap();
    let mut rows = drain(&mut max);
    max.close();
    rows.sort();
    assert_eq!(rows, vec![vec![1, 7], vec![2, 5]]);

    tx.commit().unwrap();
}

#[test]
fn test_aggregate_over_bytes_column() {
    let _guard = setup();

    let schema = Schema::new(vec![
        Field::new("bucket", Type::Int64),
        Field::new("word", Type::Bytes(8)),
    ]);
    let table = new_heap_table_with_schema("query_agg_bytes", &schema);
    insert_tuples(
        &table,
        &[
            Tuple::new(vec![Cell::Int64(1), Cell::Bytes("pear".to_string())]),
            Tuple::new(vec![Cell::Int64(1), Cell::Bytes("apple".to_string())]),
            Tuple::new(vec![Cell::Int64(2), Cell::Bytes("fig".to_string())]),
        ],
    );

    // counting ignores the aggregated column's type
    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut count = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Count).unwrap();
    assert_eq!(count.get_schema().get_type(1), Type::Int64);
    count.open().unwrap();
    let mut rows = drain_cells(&mut count);
    count.close();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec![Cell::Int64(1), Cell::Int64(2)],
            vec![Cell::Int64(2), Cell::Int64(1)],
        ]
    );

    // min and max keep the byte-string type
    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut min = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Min).unwrap();
    assert_eq!(min.get_schema().get_type(1), Type::Bytes(8));
    min.open().unwrap();
    let mut rows = drain_cells(&mut min);
    min.close();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec![Cell::Int64(1), Cell::Bytes("apple".to_string())],
            vec![Cell::Int64(2), Cell::Bytes("fig".to_string())],
        ]
    );

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut max = Aggregate::new(Box::new(scan), Some(0), 1, AggOp::Max).unwrap();
    max.open().unwrap();
    let mut rows = drain_cells(&mut max);
    max.close();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            vec![Cell::Int64(1), Cell::Bytes("pear".to_string())],
            vec![Cell::Int64(2), Cell::Bytes("fig".to_string())],
        ]
    );

    // ungrouped count over the same column
    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut total = Aggregate::new(Box::new(scan), None, 1, AggOp::Count).unwrap();
    total.open().unwrap();
    let rows = drain_cells(&mut total);
    total.close();
    assert_eq!(rows, vec![vec![Cell::Int64(3)]]);

    tx.commit().unwrap();
}

#[test]
fn test_aggregate_ungrouped_count() {
    let _guard = setup();

    let table = new_heap_table("query_agg_count", 2);
    insert_heap_rows(&table, &[vec![1, 1], vec![1, 2], vec![2, 5]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let mut count = Aggregate::new(Box::new(scan), None, 1, AggOp::Count).unwrap();
    count.open().unwrap();
    let rows = drain(&mut count);
    count.close();
    tx.commit().unwrap();

    assert_eq!(rows, vec![vec![3]]);
}

#[test]
fn test_unimplemented_aggregates_are_rejected() {
    let _guard = setup();

    let table = new_heap_table("query_agg_rejected", 2);
    insert_heap_rows(&table, &[vec![1, 1]]);

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let result = Aggregate::new(Box::new(scan), None, 1, AggOp::SumCount);
    assert!(result.is_err());

    tx.commit().unwrap();
}

#[test]
fn test_insert_operator() {
    let _guard = setup();

    let table = new_heap_table("query_insert", 2);

    let tx = Transaction::new();
    tx.start().unwrap();

    let child = TupleList::of_int_rows(2, &[vec![1, 10], vec![2, 20]]);
    let mut insert = Insert::new(&tx, table.rl().get_id(), Box::new(child));
    insert.open().unwrap();

    assert!(insert.has_next().unwrap());
    let report = insert.next().unwrap();
    assert_eq!(report.get_cell(0), Cell::Int64(2));

    // the child was consumed exactly once
    assert!(!insert.has_next().unwrap());
    insert.close();
    tx.commit().unwrap();

    let mut rows = heap_rows(&table);
    rows.sort();
    assert_eq!(rows, vec![vec![1, 10], vec![2, 20]]);
}

#[test]
fn test_delete_operator() {
    let _guard = setup();

    let table = new_heap_table("query_delete", 2);
    insert_heap_rows(
        &table,
        &[vec![1, 10], vec![2, 20], vec![3, 30], vec![4, 40]],
    );

    let tx = Transaction::new();
    tx.start().unwrap();

    let scan = SeqScan::new(&tx, table.rl().get_id()).unwrap();
    let filter = Filter::new(
        Predicate::new(0, Op::LessThanOrEq, &Cell::Int64(2)),
        Box::new(scan),
    );
    let mut delete = Delete::new(&tx, Box::new(filter));
    delete.open().unwrap();

    let report = delete.next().unwrap();
    assert_eq!(report.get_cell(0), Cell::Int64(2));
    assert!(!delete.has_next().unwrap());
    delete.close();
    tx.commit().unwrap();

    let mut rows = heap_rows(&table);
    rows.sort();
    assert_eq!(rows, vec![vec![3, 30], vec![4, 40]]);
}
