use serde::{Deserialize, Serialize};

/// The scalar type of one column. Fixed at table/segment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    I16,
    I32,
    I64,
    F64,
    String,
}

impl ColumnType {
    /// Byte width of one element for fixed-width numeric types. `None` for
    /// `String`, which is never fixed-width.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::I16 => Some(2),
            ColumnType::I32 => Some(4),
            ColumnType::I64 => Some(8),
            ColumnType::F64 => Some(8),
            ColumnType::String => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::I16 => "i16",
            ColumnType::I32 => "i32",
            ColumnType::I64 => "i64",
            ColumnType::F64 => "f64",
            ColumnType::String => "string",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single decoded cell. Row results own their values; they are always
/// decoded off a borrowed column, never aliasing it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Null,
}

impl Value {
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::I16(_) => Some(ColumnType::I16),
            Value::I32(_) => Some(ColumnType::I32),
            Value::I64(_) => Some(ColumnType::I64),
            Value::F64(_) => Some(ColumnType::F64),
            Value::Str(_) => Some(ColumnType::String),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion used by expression evaluation (`+ - * /`, aggregates).
    /// `Null` coerces to `NaN` so arithmetic on it propagates rather than panics.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::I16(v) => *v as f64,
            Value::I32(v) => *v as f64,
            Value::I64(v) => *v as f64,
            Value::F64(v) => *v,
            Value::Str(s) => s.parse::<f64>().unwrap_or(f64::NAN),
            Value::Null => f64::NAN,
        }
    }

    /// `truncate-to-integer` conversion used by `append_row`/`append_batch`
    /// for `i64` columns receiving a numeric or decimal-integer string.
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::I16(v) => *v as i64,
            Value::I32(v) => *v as i64,
            Value::I64(v) => *v,
            Value::F64(v) => *v as i64,
            Value::Str(s) => s.parse::<f64>().map(|f| f as i64).unwrap_or(0),
            Value::Null => 0,
        }
    }

    /// The `ORDER BY` collation key for this value. The source collates
    /// `null` via its string form; we follow that verbatim rather than
    /// silently re-specifying null ordering (spec.md §9 Open Question).
    pub fn order_key(&self) -> String {
        match self {
            Value::Null => "undefined".to_string(),
            Value::Str(s) => s.clone(),
            Value::I16(v) => format!("{v:020}"),
            Value::I32(v) => format!("{v:020}"),
            Value::I64(v) => format!("{v:020}"),
            Value::F64(v) => format!("{v:020}", v = OrderedF64(*v)),
        }
    }
}

/// Formats an `f64` so its lexicographic string order matches numeric order;
/// used only by [`Value::order_key`].
struct OrderedF64(f64);

impl std::fmt::Display for OrderedF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Shift into an unsigned, order-preserving bit pattern (standard
        // float-to-sortable-bits trick), then print as a fixed-width decimal.
        let bits = self.0.to_bits();
        let key = if self.0.is_sign_negative() {
            !bits
        } else {
            bits | (1u64 << 63)
        };
        write!(f, "{key}")
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "undefined"),
        }
    }
}
