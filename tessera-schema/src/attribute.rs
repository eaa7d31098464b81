//! Attributes: the named values stored per cell.

use tessera_dtype::Datatype;

/// A named, typed payload stored for every cell of the array.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    datatype: Datatype,
    var_sized: bool,
    nullable: bool,
}

impl Attribute {
    /// Create a fixed-length, non-nullable attribute.
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            var_sized: false,
            nullable: false,
        }
    }

    /// Mark the attribute as variable-length: each cell stores a
    /// variable number of elements addressed through an offsets buffer.
    pub fn var_sized(mut self) -> Self {
        self.var_sized = true;
        self
    }

    /// Mark the attribute as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The attribute datatype.
    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    /// `true` iff each cell stores a variable-length payload.
    pub fn is_var_sized(&self) -> bool {
        self.var_sized
    }

    /// `true` iff cells may be null.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The fixed size in bytes of one cell, or `None` when the attribute
    /// is variable-length.
    pub fn cell_size(&self) -> Option<u64> {
        if self.var_sized {
            return None;
        }
        self.datatype.cell_size()
    }
}
