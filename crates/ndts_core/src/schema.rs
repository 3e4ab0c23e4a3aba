use serde::{Deserialize, Serialize};

use crate::value::ColumnType;

/// Sentinel for a missing `i64` cell in contexts that predate the tagged
/// `Value::Null` (as-of join results, sidecar fills). Columnar Table storage
/// itself never uses this: missing cells there default to the type's zero.
pub const NULL_I64: i64 = i64::MIN;
/// Sentinel for a missing `f64` cell; see [`NULL_I64`].
pub const NULL_F64: f64 = f64::NAN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        ColumnDef { name: name.into(), col_type }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Schema { columns }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Direction of an as-of / seek lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}
