use std::collections::HashMap;

use log::debug;

use crate::{common::Database, error::DbError, execution::Op};

/// One join in the logical plan: `left_table.left_field op
/// right_table.right_field`.
#[derive(Clone, PartialEq, Debug)]
pub struct LogicalJoinNode {
    pub left_table: String,
    pub right_table: String,
    pub left_field: usize,
    pub right_field: usize,
    pub op: Op,
}

impl LogicalJoinNode {
    pub fn new(
        left_table: &str,
        right_table: &str,
        left_field: usize,
        right_field: usize,
        op: Op,
    ) -> Self {
        Self {
            left_table: left_table.to_string(),
            right_table: right_table.to_string(),
            left_field,
            right_field,
            op,
        }
    }

    /// The same join with its sides flipped.
    fn swap(&self) -> Self {
        let op = match self.op {
            Op::GreaterThan => Op::LessThan,
            Op::GreaterThanOrEq => Op::LessThanOrEq,
            Op::LessThan => Op::GreaterThan,
            Op::LessThanOrEq => Op::GreaterThanOrEq,
            other => other,
        };
        Self {
            left_table: self.right_table.clone(),
            right_table: self.left_table.clone(),
            left_field: self.right_field,
            right_field: self.left_field,
            op,
        }
    }
}

/// The best plan found so far for one subset of joins.
#[derive(Clone)]
struct CostCard {
    cost: f64,
    cardinality: usize,
    plan: Vec<LogicalJoinNode>,
}

/// Memo of subset -> best plan, keyed by sorted node indexes.
struct PlanCache {
    map: HashMap<Vec<usize>, CostCard>,
}

impl PlanCache {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    fn get(&self, subset: &[usize]) -> Option<&CostCard> {
        self.map.get(subset)
    }

    fn put(&mut self, subset: Vec<usize>, cost_card: CostCard) {
        self.map.insert(subset, cost_card);
    }
}

/// Left-deep Selinger-style join ordering over the registered table
/// statistics.
pub struct JoinOptimizer;

impl JoinOptimizer {
    /// Cost of joining an outer plan with cost `cost1` and
    /// cardinality `card1` against an inner table with scan cost
    /// `cost2`: the outer is read once, the inner once per outer row.
    pub fn estimate_join_cost(cost1: f64, card1: usize, cost2: f64) -> f64 {
        cost1 + card1 as f64 * cost2
    }

    /// Output cardinality of a join. Equality keeps the smaller side
    /// (key-column reasoning); everything else degrades to the cross
    /// product.
    pub fn estimate_join_cardinality(op: Op, card1: usize, card2: usize) -> usize {
        match op {
            Op::Equals => card1.min(card2),
            _ => card1.saturating_mul(card2),
        }
    }

    fn scan_cost(table: &str) -> Result<f64, DbError> {
        let stats = Database::table_stats();
        let s = stats
            .get(table)
            .ok_or_else(|| DbError::illegal(&format!("no statistics for table {}", table)))?;
        Ok(s.estimate_scan_cost())
    }

    fn cardinality(table: &str) -> Result<usize, DbError> {
        let stats = Database::table_stats();
        let s = stats
            .get(table)
            .ok_or_else(|| DbError::illegal(&format!("no statistics for table {}", table)))?;
        Ok(s.total_tuples())
    }

    /// Pick a good execution order for the given joins: dynamic
    /// programming over subsets, keeping for each subset the cheapest
    /// left-deep plan and its output cardinality.
    pub fn order_joins(
        joins: Vec<LogicalJoinNode>,
    ) -> Result<Vec<LogicalJoinNode>, DbError> {
        if joins.is_empty() {
            return Ok(joins);
        }

        let n = joins.len();
        let mut cache = PlanCache::new();

        for size in 1..=n {
            for subset in Self::subsets(n, size) {
                let mut best: Option<CostCard> = None;

                for (pos, &removed) in subset.iter().enumerate() {
                    let mut rest = subset.clone();
                    rest.remove(pos);

                    let candidate =
                        Self::cost_with_last_join(&joins, &cache, &rest, removed)?;

                    if let Some(candidate) = candidate {
                        match &best {
                            Some(b) if b.cost <= candidate.cost => {}
                            _ => best = Some(candidate),
                        }
                    }
                }

                match best {
                    Some(best) => cache.put(subset, best),
                    None => {
                        return Err(DbError::new(
                            "join set is not connected, no left-deep plan exists",
                        ))
                    }
                }
            }
        }

        let full: Vec<usize> = (0..n).collect();
        let best = cache.get(&full).unwrap();
        debug!(
            "join order chosen, cost {} cardinality {}",
            best.cost, best.cardinality
        );
        Ok(best.plan.clone())
    }

    /// Cost of executing `rest` first and `joins[removed]` last.
    fn cost_with_last_join(
        joins: &[LogicalJoinNode],
        cache: &PlanCache,
        rest: &[usize],
        removed: usize,
    ) -> Result<Option<CostCard>, DbError> {
        let mut join = joins[removed].clone();

        if rest.is_empty() {
            // base case: a bare pair of tables
            let cost1 = Self::scan_cost(&join.left_table)?;
            let cost2 = Self::scan_cost(&join.right_table)?;
            let card1 = Self::cardinality(&join.left_table)?;
            let card2 = Self::cardinality(&join.right_table)?;

            // the cheaper orientation drives the loop
            let forward = Self::estimate_join_cost(cost1, card1, cost2);
            let backward = Self::estimate_join_cost(cost2, card2, cost1);
            let cost = if backward < forward {
                join = join.swap();
                backward
            } else {
                forward
            };

            return Ok(Some(CostCard {
                cost,
                cardinality: Self::estimate_join_cardinality(join.op, card1, card2),
                plan: vec![join],
            }));
        }

        let prev = match cache.get(rest) {
            Some(prev) => prev,
            // the subset never produced a plan (disconnected)
            None => return Ok(None),
        };

        // the new join must attach to a table already in the plan
        let plan_tables: Vec<&str> = prev
            .plan
            .iter()
            .flat_map(|j| [j.left_table.as_str(), j.right_table.as_str()])
            .collect();

        let left_known = plan_tables.contains(&join.left_table.as_str());
        let right_known = plan_tables.contains(&join.right_table.as_str());

        let inner_table = if left_known && !right_known {
            join.right_table.clone()
        } else if right_known && !left_known {
            join = join.swap();
            join.right_table.clone()
        } else {
            // both sides inside the plan, or neither: not a left-deep
            // extension
            return Ok(None);
        };

        let inner_cost = Self::scan_cost(&inner_table)?;
        let inner_card = Self::cardinality(&inner_table)?;

        let cost = Self::estimate_join_cost(prev.cost, prev.cardinality, inner_cost);
        let cardinality =
            Self::estimate_join_cardinality(join.op, prev.cardinality, inner_card);

        let mut plan = prev.plan.clone();
        plan.push(join);

        Ok(Some(CostCard {
            cost,
            cardinality,
            plan,
        }))
    }

    /// All size-k subsets of 0..n, each sorted ascending.
    fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        let mut current = Vec::new();
        Self::subsets_from(0, n, k, &mut current, &mut out);
        out
    }

    fn subsets_from(
        start: usize,
        n: usize,
        k: usize,
        current: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
    ) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            Self::subsets_from(i + 1, n, k, current, out);
            current.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsets() {
        let s = JoinOptimizer::subsets(4, 2);
        assert_eq!(s.len(), 6);
        assert!(s.contains(&vec![0, 3]));
    }

    #[test]
    fn test_join_cardinality() {
        assert_eq!(
            JoinOptimizer::estimate_join_cardinality(Op::Equals, 100, 7),
            7
        );
        assert_eq!(
            JoinOptimizer::estimate_join_cardinality(Op::GreaterThan, 10, 10),
            100
        );
    }
}
