use crate::io::{read_exact, Decode, Encode};

/// Field types are fixed width so tuple bodies can live in fixed-size
/// page slots.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Type {
    Int64,

    /// A byte string padded with zeros up to its declared width.
    Bytes(u8),
}

impl Type {
    pub fn get_size(&self) -> usize {
        match self {
            Type::Int64 => 8,
            Type::Bytes(size) => *size as usize,
        }
    }
}

impl Encode for Type {
    fn encode(&self) -> Vec<u8> {
        match self {
            Type::Int64 => vec![1, 8],
            Type::Bytes(size) => vec![2, *size],
        }
    }
}

impl Decode for Type {
    fn decode<R: std::io::Read>(reader: &mut R) -> Self {
        let bytes = read_exact(reader, 2);
        match bytes[..] {
            [1, 8] => Type::Int64,
            [2, size] => Type::Bytes(size),
            _ => panic!("invalid field type: {:?}", bytes),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Field {
    pub name: String,
    pub t: Type,
}

impl Field {
    pub fn new(name: &str, t: Type) -> Self {
        Self {
            name: name.to_string(),
            t,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// A schema of `width` int columns, used all over the tests.
    pub fn small_int_schema(width: usize) -> Self {
        let mut fields = Vec::new();
        for i in 0..width {
            fields.push(Field::new(&format!("int-column-{}", i), Type::Int64));
        }
        Self { fields }
    }

    /// Tuple body size in bytes.
    pub fn get_size(&self) -> usize {
        self.fields.iter().map(|f| f.t.get_size()).sum()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_type(&self, i: usize) -> Type {
        self.fields[i].t
    }

    /// Schema of the two children of a join, left columns first.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.clone());
        Schema { fields }
    }
}
