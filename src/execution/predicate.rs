use std::fmt;

use crate::storage::tuple::{Cell, Tuple};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Op {
    Equals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    NotEquals,
    Like,
}

impl Op {
    pub fn apply(&self, left: &Cell, right: &Cell) -> bool {
        match self {
            Op::Equals => left == right,
            Op::GreaterThan => left > right,
            Op::GreaterThanOrEq => left >= right,
            Op::LessThan => left < right,
            Op::LessThanOrEq => left <= right,
            Op::NotEquals => left != right,
            Op::Like => match (left, right) {
                (Cell::Bytes(v), Cell::Bytes(pattern)) => v.contains(pattern.as_str()),
                _ => false,
            },
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            Op::Equals => "=",
            Op::GreaterThan => ">",
            Op::GreaterThanOrEq => ">=",
            Op::LessThan => "<",
            Op::LessThanOrEq => "<=",
            Op::NotEquals => "<>",
            Op::Like => "like",
        };
        write!(f, "{}", symbol)
    }
}

/// Compares one field of a tuple against a constant.
#[derive(Clone)]
pub struct Predicate {
    pub field_index: usize,
    pub op: Op,
    pub cell: Cell,
}

impl Predicate {
    pub fn new(field_index: usize, op: Op, cell: &Cell) -> Self {
        Self {
            field_index,
            op,
            cell: cell.clone(),
        }
    }

    pub fn matches(&self, cell: &Cell) -> bool {
        self.op.apply(cell, &self.cell)
    }

    pub fn filter(&self, tuple: &Tuple) -> bool {
        self.matches(&tuple.get_cell(self.field_index))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "f{} {} {}", self.field_index, self.op, self.cell)
    }
}

/// Compares one field of each of two tuples.
#[derive(Clone)]
pub struct JoinPredicate {
    pub field1: usize,
    pub op: Op,
    pub field2: usize,
}

impl JoinPredicate {
    pub fn new(field1: usize, op: Op, field2: usize) -> Self {
        Self { field1, op, field2 }
    }

    pub fn filter(&self, left: &Tuple, right: &Tuple) -> bool {
        self.op
            .apply(&left.get_cell(self.field1), &right.get_cell(self.field2))
    }
}
