use std::collections::HashMap;

use crate::{
    error::DbError,
    execution::op_iterator::OpIterator,
    storage::{
        schema::{Field, Schema, Type},
        tuple::{Cell, StoredTuple, Tuple},
    },
    types::DbResult,
};

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum AggOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,

    // extension points, no semantics defined
    SumCount,
    ScAvg,
}

/// Per-group running state. Every operator variant feeds the same
/// record; the finalizer picks what it needs.
struct AggState {
    sum: i64,
    count: i64,
    min: Option<Cell>,
    max: Option<Cell>,
}

impl AggState {
    fn new() -> Self {
        Self {
            sum: 0,
            count: 0,
            min: None,
            max: None,
        }
    }

    fn merge(&mut self, cell: &Cell) {
        if let Cell::Int64(v) = cell {
            self.sum += v;
        }
        self.count += 1;

        match &self.min {
            Some(min) if min <= cell => {}
            _ => self.min = Some(cell.clone()),
        }
        match &self.max {
            Some(max) if max >= cell => {}
            _ => self.max = Some(cell.clone()),
        }
    }

    fn finalize(&self, op: AggOp) -> Cell {
        match op {
            AggOp::Min => self.min.clone().unwrap(),
            AggOp::Max => self.max.clone().unwrap(),
            AggOp::Sum => Cell::Int64(self.sum),
            // integer division, the quotient truncates
            AggOp::Avg => Cell::Int64(self.sum / self.count),
            AggOp::Count => Cell::Int64(self.count),
            AggOp::SumCount | AggOp::ScAvg => unreachable!(),
        }
    }
}

/// Groups the child by an optional grouping column and folds one
/// aggregate over another column. SUM and AVG require an int column;
/// MIN/MAX/COUNT take either kind. Ungrouped aggregation funnels every
/// tuple through one synthetic group.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    group_field: Option<usize>,
    agg_field: usize,
    op: AggOp,
    schema: Schema,

    results: Vec<Tuple>,
    cursor: usize,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        group_field: Option<usize>,
        agg_field: usize,
        op: AggOp,
    ) -> Result<Self, DbError> {
        if op == AggOp::SumCount || op == AggOp::ScAvg {
            return Err(DbError::illegal(&format!(
                "aggregate operator {:?} is not implemented",
                op
            )));
        }

        let child_schema = child.get_schema();
        let agg_type = match op {
            AggOp::Min | AggOp::Max => child_schema.get_type(agg_field),
            // counting ignores the aggregated column's type
            AggOp::Count => Type::Int64,
            AggOp::Sum | AggOp::Avg => {
                if child_schema.get_type(agg_field) != Type::Int64 {
                    return Err(DbError::illegal(&format!(
                        "aggregate {:?} needs an int column",
                        op
                    )));
                }
                Type::Int64
            }
            AggOp::SumCount | AggOp::ScAvg => unreachable!(),
        };

        let schema = match group_field {
            Some(g) => Schema::new(vec![
                Field::new("groupValue", child_schema.get_type(g)),
                Field::new("aggregateValue", agg_type),
            ]),
            None => Schema::new(vec![Field::new("aggregateValue", agg_type)]),
        };

        Ok(Self {
            child,
            group_field,
            agg_field,
            op,
            schema,
            results: Vec::new(),
            cursor: 0,
        })
    }

    fn compute(&mut self) -> DbResult {
        let mut groups: HashMap<Option<Cell>, AggState> = HashMap::new();

        while self.child.has_next()? {
            let t = self.child.next()?;
            let key = self.group_field.map(|g| t.get_cell(g));
            groups
                .entry(key)
                .or_insert_with(AggState::new)
                .merge(&t.get_cell(self.agg_field));
        }

        self.results = groups
            .into_iter()
            .map(|(key, state)| {
                let value = state.finalize(self.op);
                match key {
                    Some(group) => Tuple::new(vec![group, value]),
                    None => Tuple::new(vec![value]),
                }
            })
            .collect();
        self.cursor = 0;
        Ok(())
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> DbResult {
        self.child.open()?;
        self.compute()
    }

    fn close(&mut self) {
        self.child.close();
        self.results.clear();
        self.cursor = 0;
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        Ok(self.cursor < self.results.len())
    }

    fn next(&mut self) -> Result<StoredTuple, DbError> {
        if self.cursor >= self.results.len() {
            return Err(DbError::new("aggregate is exhausted"));
        }
        let t = self.results[self.cursor].clone();
        self.cursor += 1;
        Ok(StoredTuple::unstored(t))
    }

    fn rewind(&mut self) -> DbResult {
        self.cursor = 0;
        Ok(())
    }

    fn get_schema(&self) -> Schema {
        self.schema.clone()
    }
}
