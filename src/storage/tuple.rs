use std::fmt;

use crate::{
    io::{read_exact, ByteWriter},
    storage::{
        page::PageId,
        schema::{Schema, Type},
    },
};

/// A single field value. Comparisons are only defined between cells of
/// the same variant; the page codecs guarantee that shape.
#[derive(Clone)]
pub enum Cell {
    Int64(i64),
    Bytes(String),
}

impl Cell {
    pub fn get_int64(&self) -> i64 {
        match self {
            Cell::Int64(v) => *v,
            _ => panic!("cell is not an int"),
        }
    }

    /// Fixed-width body for the slot of a page.
    pub fn to_slot_bytes(&self, t: &Type) -> Vec<u8> {
        match (self, t) {
            (Cell::Int64(v), Type::Int64) => v.to_le_bytes().to_vec(),
            (Cell::Bytes(v), Type::Bytes(size)) => {
                let mut buf = v.as_bytes().to_vec();
                if buf.len() > *size as usize {
                    buf.truncate(*size as usize);
                }
                buf.resize(*size as usize, 0);
                buf
            }
            _ => panic!("cell does not match field type"),
        }
    }

    pub fn from_slot_bytes<R: std::io::Read>(reader: &mut R, t: &Type) -> Self {
        match t {
            Type::Int64 => {
                let bytes = read_exact(reader, 8);
                Cell::Int64(i64::from_le_bytes(bytes.try_into().unwrap()))
            }
            Type::Bytes(size) => {
                let mut bytes = read_exact(reader, *size as usize);
                while bytes.last() == Some(&0) {
                    bytes.pop();
                }
                Cell::Bytes(String::from_utf8_lossy(&bytes).to_string())
            }
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Int64(a), Cell::Int64(b)) => a == b,
            (Cell::Bytes(a), Cell::Bytes(b)) => a == b,
            _ => panic!("comparing cells of different types"),
        }
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Cell::Int64(a), Cell::Int64(b)) => a.partial_cmp(b),
            (Cell::Bytes(a), Cell::Bytes(b)) => a.partial_cmp(b),
            _ => panic!("comparing cells of different types"),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Cell::Int64(v) => v.hash(state),
            Cell::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Int64(v) => write!(f, "{}", v),
            Cell::Bytes(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// An ordered list of cells matching some `Schema`.
#[derive(Clone, PartialEq)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// A tuple of `width` int columns, every cell set to `value`.
    pub fn new_int_tuple(value: i64, width: usize) -> Self {
        Self {
            cells: vec![Cell::Int64(value); width],
        }
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    pub fn set_cell(&mut self, i: usize, cell: Cell) {
        self.cells[i] = cell;
    }

    pub fn get_cells(&self) -> Vec<Cell> {
        self.cells.clone()
    }

    pub fn field_count(&self) -> usize {
        self.cells.len()
    }

    /// Concatenation of two tuples, used by the join operator.
    pub fn merge(left: &Tuple, right: &Tuple) -> Tuple {
        let mut cells = left.cells.clone();
        cells.extend(right.cells.clone());
        Tuple { cells }
    }

    pub fn encode_to(&self, writer: &mut ByteWriter, schema: &Schema) {
        for (i, cell) in self.cells.iter().enumerate() {
            writer.write_bytes(&cell.to_slot_bytes(&schema.get_type(i)));
        }
    }

    pub fn decode_from<R: std::io::Read>(reader: &mut R, schema: &Schema) -> Self {
        let mut cells = Vec::new();
        for field in &schema.fields {
            cells.push(Cell::from_slot_bytes(reader, &field.t));
        }
        Self { cells }
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let body: Vec<String> = self.cells.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", body.join(", "))
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// A tuple together with its record id (page, slot). Record ids stay
/// stable until the tuple is deleted. Tuples produced by operators
/// rather than read off a page carry no record id.
#[derive(Clone, PartialEq)]
pub struct StoredTuple {
    internal: Tuple,
    rid: Option<(PageId, usize)>,
}

impl std::ops::Deref for StoredTuple {
    type Target = Tuple;
    fn deref(&self) -> &Self::Target {
        &self.internal
    }
}

impl StoredTuple {
    pub fn new(internal: &Tuple, slot_index: usize, pid: PageId) -> Self {
        Self {
            internal: internal.clone(),
            rid: Some((pid, slot_index)),
        }
    }

    /// A derived tuple, e.g. the output of a join or an aggregate.
    pub fn unstored(internal: Tuple) -> Self {
        Self {
            internal,
            rid: None,
        }
    }

    pub fn rid(&self) -> Option<(PageId, usize)> {
        self.rid
    }

    pub fn get_slot_index(&self) -> usize {
        self.rid.expect("tuple is not stored on any page").1
    }

    pub fn get_pid(&self) -> PageId {
        self.rid.expect("tuple is not stored on any page").0
    }

    pub fn get_tuple(&self) -> &Tuple {
        &self.internal
    }
}

impl fmt::Display for StoredTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.rid {
            Some((pid, slot)) => write!(f, "{}@{}/{}", self.internal, pid, slot),
            None => write!(f, "{}", self.internal),
        }
    }
}

impl fmt::Debug for StoredTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::storage::schema::Field;

    #[test]
    fn test_tuple_round_trip() {
        let schema = Schema::new(vec![
            Field::new("id", Type::Int64),
            Field::new("name", Type::Bytes(8)),
        ]);

        let tuple = Tuple::new(vec![Cell::Int64(7), Cell::Bytes("abc".to_string())]);

        let mut writer = ByteWriter::new();
        tuple.encode_to(&mut writer, &schema);
        assert_eq!(writer.size(), schema.get_size());

        let decoded = Tuple::decode_from(&mut Cursor::new(writer.to_bytes()), &schema);
        assert_eq!(decoded, tuple);
    }
}
