//! Typed, densely packed column storage with explicit capacity growth.

use ndts_core::{ColumnType, NdtsError, Result, Value};

/// `capacity` grows by `max(requested, ceil(capacity * 1.5))`, but at least
/// doubles when the requested threshold exceeds that growth-factor result.
fn grow_capacity(capacity: usize, requested: usize) -> usize {
    let grown = capacity.saturating_mul(3).div_ceil(2);
    if requested <= grown {
        grown.max(requested)
    } else {
        requested.max(capacity.saturating_mul(2))
    }
}

/// A `Vec<T>`-backed buffer whose capacity is grown explicitly per
/// [`grow_capacity`] rather than left to the allocator's own policy, so
/// reallocation behavior matches the documented growth contract exactly.
#[derive(Debug, Clone, Default)]
struct Buffer<T> {
    data: Vec<T>,
}

impl<T: Clone + Default> Buffer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Buffer { data: Vec::with_capacity(capacity) }
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if needed > self.data.capacity() {
            let new_cap = grow_capacity(self.data.capacity(), needed);
            let mut grown = Vec::with_capacity(new_cap);
            grown.extend_from_slice(&self.data);
            self.data = grown;
        }
    }

    fn push(&mut self, value: T) {
        self.ensure_capacity(self.data.len() + 1);
        self.data.push(value);
    }

    fn reserve_additional(&mut self, additional: usize) {
        self.ensure_capacity(self.data.len() + additional);
    }
}

/// One column's full storage: a scalar type tag plus its densely packed
/// backing array. Element positions are stable; only table-wide operations
/// may reorder rows.
#[derive(Debug, Clone)]
pub enum Column {
    I16(Buffer<i16>),
    I32(Buffer<i32>),
    I64(Buffer<i64>),
    F64(Buffer<f64>),
    Str(Buffer<String>),
}

impl Column {
    pub fn with_capacity(col_type: ColumnType, capacity: usize) -> Self {
        match col_type {
            ColumnType::I16 => Column::I16(Buffer::with_capacity(capacity)),
            ColumnType::I32 => Column::I32(Buffer::with_capacity(capacity)),
            ColumnType::I64 => Column::I64(Buffer::with_capacity(capacity)),
            ColumnType::F64 => Column::F64(Buffer::with_capacity(capacity)),
            ColumnType::String => Column::Str(Buffer::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::I16(_) => ColumnType::I16,
            Column::I32(_) => ColumnType::I32,
            Column::I64(_) => ColumnType::I64,
            Column::F64(_) => ColumnType::F64,
            Column::Str(_) => ColumnType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::I16(b) => b.data.len(),
            Column::I32(b) => b.data.len(),
            Column::I64(b) => b.data.len(),
            Column::F64(b) => b.data.len(),
            Column::Str(b) => b.data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            Column::I16(b) => b.data.capacity(),
            Column::I32(b) => b.data.capacity(),
            Column::I64(b) => b.data.capacity(),
            Column::F64(b) => b.data.capacity(),
            Column::Str(b) => b.data.capacity(),
        }
    }

    pub fn reserve_additional(&mut self, additional: usize) {
        match self {
            Column::I16(b) => b.reserve_additional(additional),
            Column::I32(b) => b.reserve_additional(additional),
            Column::I64(b) => b.reserve_additional(additional),
            Column::F64(b) => b.reserve_additional(additional),
            Column::Str(b) => b.reserve_additional(additional),
        }
    }

    /// Appends `value`, coercing it to this column's type. Missing/null
    /// values default to the type's zero (empty string for `String`).
    /// Narrowing to `i16`/`i32` wraps modulo `2^width`; `i64` truncates any
    /// numeric or decimal-integer source toward zero.
    pub fn push_value(&mut self, value: &Value) {
        match self {
            Column::I16(b) => b.push(match value {
                Value::Null => 0,
                v => v.as_i64() as i16,
            }),
            Column::I32(b) => b.push(match value {
                Value::Null => 0,
                v => v.as_i64() as i32,
            }),
            Column::I64(b) => b.push(match value {
                Value::Null => 0,
                v => v.as_i64(),
            }),
            Column::F64(b) => b.push(match value {
                Value::Null => 0.0,
                v => v.as_f64(),
            }),
            Column::Str(b) => b.push(match value {
                Value::Null => String::new(),
                Value::Str(s) => s.clone(),
                v => v.to_string(),
            }),
        }
    }

    pub fn get(&self, index: usize) -> Result<Value> {
        if index >= self.len() {
            return Err(NdtsError::OutOfBounds { index, len: self.len() });
        }
        Ok(match self {
            Column::I16(b) => Value::I16(b.data[index]),
            Column::I32(b) => Value::I32(b.data[index]),
            Column::I64(b) => Value::I64(b.data[index]),
            Column::F64(b) => Value::F64(b.data[index]),
            Column::Str(b) => Value::Str(b.data[index].clone()),
        })
    }

    /// Overwrites the cell at `index` in place. Caller is responsible for
    /// bounds-checking; used by `update_row` after its own bounds check so
    /// the error carries the row-level context.
    pub fn set(&mut self, index: usize, value: &Value) {
        match self {
            Column::I16(b) => b.data[index] = value.as_i64() as i16,
            Column::I32(b) => b.data[index] = value.as_i64() as i32,
            Column::I64(b) => b.data[index] = value.as_i64(),
            Column::F64(b) => b.data[index] = value.as_f64(),
            Column::Str(b) => {
                b.data[index] = match value {
                    Value::Str(s) => s.clone(),
                    v => v.to_string(),
                }
            }
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Column::I16(b) => Some(&b.data),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            Column::I32(b) => Some(&b.data),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Column::I64(b) => Some(&b.data),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(b) => Some(&b.data),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&[String]> {
        match self {
            Column::Str(b) => Some(&b.data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_policy_matches_spec_formula() {
        assert_eq!(grow_capacity(0, 4), 4);
        assert_eq!(grow_capacity(4, 5), 6);
        assert_eq!(grow_capacity(4, 20), 20);
        assert_eq!(grow_capacity(10, 100), 100);
    }

    #[test]
    fn push_grows_capacity_without_losing_prefix() {
        let mut col = Column::with_capacity(ColumnType::I64, 2);
        for i in 0..10i64 {
            col.push_value(&Value::I64(i));
        }
        assert_eq!(col.len(), 10);
        assert!(col.capacity() >= 10);
        for i in 0..10i64 {
            assert_eq!(col.get(i as usize).unwrap(), Value::I64(i));
        }
    }

    #[test]
    fn narrowing_wraps_modulo_width() {
        let mut col = Column::with_capacity(ColumnType::I16, 1);
        col.push_value(&Value::I64(70_000));
        assert_eq!(col.get(0).unwrap(), Value::I16(70_000i64 as i16));
    }

    #[test]
    fn null_defaults_to_type_zero() {
        let mut i = Column::with_capacity(ColumnType::I64, 1);
        i.push_value(&Value::Null);
        assert_eq!(i.get(0).unwrap(), Value::I64(0));

        let mut f = Column::with_capacity(ColumnType::F64, 1);
        f.push_value(&Value::Null);
        assert_eq!(f.get(0).unwrap(), Value::F64(0.0));

        let mut s = Column::with_capacity(ColumnType::String, 1);
        s.push_value(&Value::Null);
        assert_eq!(s.get(0).unwrap(), Value::Str(String::new()));
    }

    #[test]
    fn out_of_bounds_get_fails() {
        let col = Column::with_capacity(ColumnType::I64, 1);
        assert!(matches!(col.get(0), Err(NdtsError::OutOfBounds { .. })));
    }
}
