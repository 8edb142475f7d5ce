mod test_utils;

use pagedb::{
    execution::Op,
    optimizer::{compute_statistics, JoinOptimizer, LogicalJoinNode, IO_COST_PER_PAGE},
    storage::tuple::Cell,
    Database,
};

use test_utils::{insert_heap_rows, new_heap_table, setup};

#[test]
fn test_table_stats_estimates() {
    let _guard = setup();

    let table = new_heap_table("stats_basic", 2);
    let rows: Vec<Vec<i64>> = (1..=10).map(|i| vec![i, i * 100]).collect();
    insert_heap_rows(&table, &rows);

    compute_statistics();

    let stats_map = Database::table_stats();
    let stats = stats_map.get("stats_basic").unwrap();

    assert_eq!(stats.total_tuples(), 10);
    assert_eq!(stats.estimate_scan_cost(), IO_COST_PER_PAGE as f64);
    assert_eq!(stats.estimate_table_cardinality(0.5), 5);

    // the histogram sees a uniform 1..=10 column
    let sel = stats.estimate_selectivity(0, Op::Equals, &Cell::Int64(5));
    assert!((sel - 0.1).abs() < 0.05, "selectivity was {}", sel);

    let sel = stats.estimate_selectivity(0, Op::GreaterThan, &Cell::Int64(5));
    assert!((sel - 0.5).abs() < 0.05, "selectivity was {}", sel);

    let sel = stats.estimate_selectivity(0, Op::NotEquals, &Cell::Int64(5));
    assert!((sel - 0.9).abs() < 0.05, "selectivity was {}", sel);

    // mean bucket selectivity of a uniform column over 100 bins
    let avg = stats.avg_selectivity(0);
    assert!(avg > 0.0 && avg < 0.05, "avg selectivity was {}", avg);
}

#[test]
fn test_join_order_prefers_small_outer() {
    let _guard = setup();

    let small = new_heap_table("opt_small", 2);
    insert_heap_rows(&small, &[vec![1, 1], vec![2, 2]]);

    let large = new_heap_table("opt_large", 2);
    let rows: Vec<Vec<i64>> = (0..600).map(|i| vec![i, i]).collect();
    insert_heap_rows(&large, &rows);

    compute_statistics();

    let joins = vec![LogicalJoinNode::new("opt_large", "opt_small", 0, 0, Op::Equals)];
    let ordered = JoinOptimizer::order_joins(joins).unwrap();

    assert_eq!(ordered.len(), 1);
    // the cheap side drives the nested loop
    assert_eq!(ordered[0].left_table, "opt_small");
    assert_eq!(ordered[0].right_table, "opt_large");
}

#[test]
fn test_join_order_left_deep_chain() {
    let _guard = setup();

    for (name, rows) in [("opt_a", 4i64), ("opt_b", 40), ("opt_c", 400)] {
        let table = new_heap_table(name, 2);
        let data: Vec<Vec<i64>> = (0..rows).map(|i| vec![i, i]).collect();
        insert_heap_rows(&table, &data);
    }

    compute_statistics();

    let joins = vec![
        LogicalJoinNode::new("opt_a", "opt_b", 0, 0, Op::Equals),
        LogicalJoinNode::new("opt_b", "opt_c", 0, 0, Op::Equals),
    ];
    let ordered = JoinOptimizer::order_joins(joins).unwrap();

    assert_eq!(ordered.len(), 2);

    // the plan is left-deep: each later join touches a table already
    // in the plan
    let mut seen = vec![
        ordered[0].left_table.clone(),
        ordered[0].right_table.clone(),
    ];
    for join in &ordered[1..] {
        assert!(
            seen.contains(&join.left_table),
            "join {:?} does not extend the plan {:?}",
            join,
            seen
        );
        seen.push(join.right_table.clone());
    }
}

#[test]
fn test_disconnected_joins_are_rejected() {
    let _guard = setup();

    for name in ["opt_x1", "opt_x2", "opt_y1", "opt_y2"] {
        let table = new_heap_table(name, 2);
        insert_heap_rows(&table, &[vec![1, 1]]);
    }

    compute_statistics();

    let joins = vec![
        LogicalJoinNode::new("opt_x1", "opt_x2", 0, 0, Op::Equals),
        LogicalJoinNode::new("opt_y1", "opt_y2", 0, 0, Op::Equals),
    ];
    assert!(JoinOptimizer::order_joins(joins).is_err());
}
