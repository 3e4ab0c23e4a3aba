//! The Columnar Table: an ordered list of same-length columns with append,
//! update, slice, filter, aggregate, bucketed sampling, and registered
//! secondary indexes.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::ops::Bound;
use std::path::Path;

use ndts_core::{ColumnDef, ColumnType, NdtsError, Result, Schema, Value};

use crate::column::Column;
use crate::format::{self, SegmentHeader};

/// A secondary index over one or more columns, keyed by each column's
/// [`Value::order_key`] so a plain `BTreeMap` can order composite keys
/// that mix types `f64` alone can't provide `Ord` for. Lexicographic
/// `Vec<String>` ordering groups every key sharing a prefix into one
/// contiguous range, which is what makes both equality probes and
/// composite-prefix-plus-trailing-range probes a single `BTreeMap::range`
/// call rather than a full scan.
#[derive(Debug, Clone)]
pub struct TableIndex {
    columns: Vec<String>,
    col_indices: Vec<usize>,
    entries: BTreeMap<Vec<String>, Vec<usize>>,
}

impl TableIndex {
    fn new(columns: Vec<String>, col_indices: Vec<usize>) -> Self {
        TableIndex { columns, col_indices, entries: BTreeMap::new() }
    }

    fn key_of(&self, row: &[Value]) -> Vec<String> {
        self.col_indices.iter().map(|&i| row[i].order_key()).collect()
    }

    /// The indexed columns, in declaration order — the order a WHERE-clause
    /// probe must match leading equalities against before trying a range on
    /// the next one.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn insert_row(&mut self, row_idx: usize, row: &[Value]) {
        let key = self.key_of(row);
        self.entries.entry(key).or_default().push(row_idx);
    }

    fn remove_row(&mut self, row_idx: usize, key: &[String]) {
        if let Some(rows) = self.entries.get_mut(key) {
            rows.retain(|&i| i != row_idx);
            if rows.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    pub(crate) fn update_row(&mut self, row_idx: usize, old_row: &[Value], new_row: &[Value]) {
        let old_key = self.key_of(old_row);
        let new_key = self.key_of(new_row);
        if old_key != new_key {
            self.remove_row(row_idx, &old_key);
            self.entries.entry(new_key).or_default().push(row_idx);
        }
    }

    /// Row ids whose leading `prefix.len()` indexed columns exactly equal
    /// `prefix` (single-column equality when `prefix.len() == 1`, a full or
    /// partial composite-key match otherwise).
    pub fn equal(&self, prefix: &[String]) -> Vec<usize> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect()
    }

    /// Row ids matching `prefix` on the leading columns and satisfying
    /// `(lo, hi)` on the column immediately after the prefix — the
    /// "composite-index prefix match with range on the last column" shape.
    pub fn prefix_range(&self, prefix: &[String], lo: Bound<String>, hi: Bound<String>) -> Vec<usize> {
        let mut out = Vec::new();
        for (key, rows) in self.entries.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let Some(next) = key.get(prefix.len()) else { continue };
            if !in_bound(next, &lo, &hi) {
                continue;
            }
            out.extend(rows.iter().copied());
        }
        out
    }
}

fn in_bound(v: &str, lo: &Bound<String>, hi: &Bound<String>) -> bool {
    let lo_ok = match lo {
        Bound::Included(b) => v >= b.as_str(),
        Bound::Excluded(b) => v > b.as_str(),
        Bound::Unbounded => true,
    };
    let hi_ok = match hi {
        Bound::Included(b) => v <= b.as_str(),
        Bound::Excluded(b) => v < b.as_str(),
        Bound::Unbounded => true,
    };
    lo_ok && hi_ok
}

/// Builds a row's full value vector directly from `columns`, not `&self`,
/// so callers can hold a mutable borrow of a sibling field (e.g.
/// `Table::indexes`) at the same time.
fn row_values(columns: &[Column], index: usize) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        values.push(col.get(index)?);
    }
    Ok(values)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn get(&self, schema: &Schema, name: &str) -> Option<&Value> {
        schema.index_of(name).and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Min,
    Max,
    Avg,
    Count,
}

impl AggOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Some(AggOp::Sum),
            "min" => Some(AggOp::Min),
            "max" => Some(AggOp::Max),
            "avg" => Some(AggOp::Avg),
            "count" => Some(AggOp::Count),
            _ => None,
        }
    }
}

/// A `sample_by` reduction: `first`, `last`, `min`, `max`, `sum`, `avg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOp {
    First,
    Last,
    Min,
    Max,
    Sum,
    Avg,
}

impl SampleOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Some(SampleOp::First),
            "last" => Some(SampleOp::Last),
            "min" => Some(SampleOp::Min),
            "max" => Some(SampleOp::Max),
            "sum" => Some(SampleOp::Sum),
            "avg" => Some(SampleOp::Avg),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleOp::First => "first",
            SampleOp::Last => "last",
            SampleOp::Min => "min",
            SampleOp::Max => "max",
            SampleOp::Sum => "sum",
            SampleOp::Avg => "avg",
        }
    }
}

pub struct SampleSpec {
    pub column: String,
    pub op: SampleOp,
}

#[derive(Debug, Clone)]
pub struct Table {
    schema: Schema,
    columns: Vec<Column>,
    row_count: usize,
    indexes: HashMap<String, TableIndex>,
}

impl Table {
    pub fn create(schema: Schema, initial_capacity: usize) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|c| Column::with_capacity(c.col_type, initial_capacity))
            .collect();
        Table { schema, columns, row_count: 0, indexes: HashMap::new() }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        let idx = self
            .schema
            .index_of(name)
            .ok_or_else(|| NdtsError::not_found(format!("column {name}")))?;
        Ok(&self.columns[idx])
    }

    /// Registers a secondary index named `name` over `columns`, scanning
    /// the table's current contents to build it. Errors `NotFound` on an
    /// unknown column and `Invariant` if `name` is already registered.
    pub fn create_index(&mut self, name: &str, columns: &[String]) -> Result<()> {
        if self.indexes.contains_key(name) {
            return Err(NdtsError::Invariant(format!("index {name} already exists")));
        }
        let col_indices: Vec<usize> = columns
            .iter()
            .map(|c| self.schema.index_of(c).ok_or_else(|| NdtsError::not_found(format!("column {c}"))))
            .collect::<Result<_>>()?;

        let mut index = TableIndex::new(columns.to_vec(), col_indices);
        for i in 0..self.row_count {
            let row = row_values(&self.columns, i)?;
            index.insert_row(i, &row);
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    /// Removes the index named `name`. Errors `NotFound` if it isn't
    /// registered.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.indexes.remove(name).map(|_| ()).ok_or_else(|| NdtsError::not_found(format!("index {name}")))
    }

    pub fn index(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.get(name)
    }

    /// All registered indexes, for a WHERE-clause probe to search over.
    pub fn indexes(&self) -> impl Iterator<Item = (&str, &TableIndex)> {
        self.indexes.iter().map(|(name, idx)| (name.as_str(), idx))
    }

    /// Appends one row. `values` is positional against the schema; a
    /// shorter slice leaves the remaining columns at their type's zero.
    pub fn append_row(&mut self, values: &[Value]) {
        let row_idx = self.row_count;
        for (i, col) in self.columns.iter_mut().enumerate() {
            match values.get(i) {
                Some(v) => col.push_value(v),
                None => col.push_value(&Value::Null),
            }
        }
        self.row_count += 1;
        if !self.indexes.is_empty() {
            if let Ok(row) = row_values(&self.columns, row_idx) {
                for index in self.indexes.values_mut() {
                    index.insert_row(row_idx, &row);
                }
            }
        }
    }

    /// Vectorized append: reserves once for the whole batch, then behaves
    /// identically to N sequential `append_row` calls.
    pub fn append_batch(&mut self, rows: &[Vec<Value>]) {
        for col in &mut self.columns {
            col.reserve_additional(rows.len());
        }
        for row in rows {
            self.append_row(row);
        }
    }

    /// Updates named columns at `index`; unknown column names are ignored.
    pub fn update_row(&mut self, index: usize, updates: &[(&str, Value)]) -> Result<()> {
        if index >= self.row_count {
            return Err(NdtsError::OutOfBounds { index, len: self.row_count });
        }
        let old_row = if self.indexes.is_empty() { None } else { Some(row_values(&self.columns, index)?) };
        for (name, value) in updates {
            if let Some(col_idx) = self.schema.index_of(name) {
                self.columns[col_idx].set(index, value);
            }
        }
        if let Some(old_row) = old_row {
            let new_row = row_values(&self.columns, index)?;
            for idx in self.indexes.values_mut() {
                idx.update_row(index, &old_row, &new_row);
            }
        }
        Ok(())
    }

    pub fn slice(&self, start: usize, end: usize) -> Result<Vec<Row>> {
        let end = end.min(self.row_count);
        if start > end {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(end - start);
        for i in start..end {
            out.push(self.row_at(i)?);
        }
        Ok(out)
    }

    pub fn row_at(&self, index: usize) -> Result<Row> {
        let mut values = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            values.push(col.get(index)?);
        }
        Ok(Row { values })
    }

    pub fn filter(&self, predicate: impl Fn(&Row, usize) -> bool) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for i in 0..self.row_count {
            let row = self.row_at(i)?;
            if predicate(&row, i) {
                out.push(row);
            }
        }
        Ok(out)
    }

    pub fn aggregate(&self, column: &str, op: AggOp) -> Result<f64> {
        if op == AggOp::Count {
            return Ok(self.row_count as f64);
        }
        let col = self.column(column)?;
        let values = numeric_values(col);
        Ok(match op {
            AggOp::Sum => values.iter().sum(),
            AggOp::Avg => {
                if self.row_count == 0 {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / self.row_count as f64
                }
            }
            AggOp::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            AggOp::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            AggOp::Count => unreachable!(),
        })
    }

    /// Buckets rows by `floor(ts/interval)*interval` over `time_column` and
    /// reduces the requested columns within each bucket. Result is sorted
    /// ascending by bucket time. When a column has more than one reduction
    /// the output key is `${column}_${op}`, else plain `${column}`.
    pub fn sample_by(&self, time_column: &str, interval: i64, specs: &[SampleSpec]) -> Result<Table> {
        let ts_col = self.column(time_column)?;
        let timestamps = ts_col
            .as_i64()
            .ok_or_else(|| NdtsError::type_mismatch(format!("{time_column} is not an i64 column")))?;

        let mut per_column_ops: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for s in specs {
            *per_column_ops.entry(s.column.as_str()).or_insert(0) += 1;
        }

        let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, &ts) in timestamps.iter().enumerate() {
            let bucket = ts.div_euclid(interval) * interval;
            buckets.entry(bucket).or_default().push(i);
        }

        let mut out_columns = vec![ColumnDef::new(time_column, ColumnType::I64)];
        for s in specs {
            let name = if per_column_ops[s.column.as_str()] > 1 {
                format!("{}_{}", s.column, s.op.as_str())
            } else {
                s.column.clone()
            };
            out_columns.push(ColumnDef::new(name, ColumnType::F64));
        }
        let mut result = Table::create(Schema::new(out_columns), buckets.len());

        for (bucket_ts, row_ids) in &buckets {
            let mut row = vec![Value::I64(*bucket_ts)];
            for s in specs {
                let col = self.column(&s.column)?;
                let values: Vec<f64> = row_ids.iter().map(|&i| col_value_as_f64(col, i)).collect();
                row.push(Value::F64(reduce(&values, s.op)));
            }
            result.append_row(&row);
        }
        Ok(result)
    }

    /// Writes the §6 segment layout: a length-prefixed JSON header, zero
    /// padding to an 8-byte boundary, then each column's raw bytes in
    /// declaration order. Fails with `Unsupported` on string columns.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        for def in &self.schema.columns {
            if def.col_type == ColumnType::String {
                return Err(NdtsError::unsupported("string columns cannot be binary-persisted"));
            }
        }

        let header = SegmentHeader::from_schema(&self.schema, self.row_count as u64, None);
        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| NdtsError::Invariant(format!("header serialization failed: {e}")))?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        let padded = format::align8(buf.len());
        buf.resize(padded, 0);

        for col in &self.columns {
            match col {
                Column::I16(_) => {
                    for v in col.as_i16().unwrap() {
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                Column::I32(_) => {
                    for v in col.as_i32().unwrap() {
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                Column::I64(_) => {
                    for v in col.as_i64().unwrap() {
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                Column::F64(_) => {
                    for v in col.as_f64().unwrap() {
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                Column::Str(_) => unreachable!("checked above"),
            }
        }

        let mut file = fs::File::create(path).map_err(|e| NdtsError::io(path, e))?;
        file.write_all(&buf).map_err(|e| NdtsError::io(path, e))?;
        file.sync_all().map_err(|e| NdtsError::io(path, e))?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Table> {
        let bytes = fs::read(path).map_err(|e| NdtsError::io(path, e))?;
        if bytes.len() < 4 {
            return Err(NdtsError::corrupt("segment file too short for header length"));
        }
        let header_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        if bytes.len() < 4 + header_len {
            return Err(NdtsError::corrupt("segment file too short for declared header"));
        }
        let header: SegmentHeader = serde_json::from_slice(&bytes[4..4 + header_len])
            .map_err(|e| NdtsError::corrupt(format!("invalid header JSON: {e}")))?;
        let schema = header.to_schema()?;

        let mut offset = format::align8(4 + header_len);
        let row_count = header.row_count as usize;
        let mut table = Table::create(schema.clone(), row_count);
        let mut raw_columns: Vec<Column> = Vec::with_capacity(schema.columns.len());
        for def in &schema.columns {
            let width = def
                .col_type
                .fixed_width()
                .ok_or_else(|| NdtsError::unsupported("string columns cannot be binary-persisted"))?;
            let needed = width * row_count;
            let slice = bytes
                .get(offset..offset + needed)
                .ok_or_else(|| NdtsError::corrupt(format!("segment truncated in column {}", def.name)))?;
            let mut col = Column::with_capacity(def.col_type, row_count);
            for i in 0..row_count {
                let cell = &slice[i * width..(i + 1) * width];
                let value = match def.col_type {
                    ColumnType::I16 => Value::I16(i16::from_le_bytes(cell.try_into().unwrap())),
                    ColumnType::I32 => Value::I32(i32::from_le_bytes(cell.try_into().unwrap())),
                    ColumnType::I64 => Value::I64(i64::from_le_bytes(cell.try_into().unwrap())),
                    ColumnType::F64 => Value::F64(f64::from_le_bytes(cell.try_into().unwrap())),
                    ColumnType::String => unreachable!(),
                };
                col.push_value(&value);
            }
            raw_columns.push(col);
            offset += needed;
        }
        table.columns = raw_columns;
        table.row_count = row_count;
        Ok(table)
    }
}

fn col_value_as_f64(col: &Column, index: usize) -> f64 {
    match col {
        Column::I16(_) => col.as_i16().unwrap()[index] as f64,
        Column::I32(_) => col.as_i32().unwrap()[index] as f64,
        Column::I64(_) => col.as_i64().unwrap()[index] as f64,
        Column::F64(_) => col.as_f64().unwrap()[index],
        Column::Str(_) => f64::NAN,
    }
}

fn numeric_values(col: &Column) -> Vec<f64> {
    (0..col.len()).map(|i| col_value_as_f64(col, i)).collect()
}

fn reduce(values: &[f64], op: SampleOp) -> f64 {
    match op {
        SampleOp::First => values.first().copied().unwrap_or(f64::NAN),
        SampleOp::Last => values.last().copied().unwrap_or(f64::NAN),
        SampleOp::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        SampleOp::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        SampleOp::Sum => values.iter().sum(),
        SampleOp::Avg => values.iter().sum::<f64>() / values.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndts_core::ColumnType;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("ts", ColumnType::I64),
            ColumnDef::new("price", ColumnType::F64),
        ])
    }

    #[test]
    fn append_row_defaults_missing_trailing_values() {
        let mut t = Table::create(schema(), 4);
        t.append_row(&[Value::I64(1)]);
        assert_eq!(t.row_at(0).unwrap().values[1], Value::F64(0.0));
    }

    #[test]
    fn append_batch_matches_sequential_append_row() {
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::I64(i), Value::F64(i as f64)]).collect();

        let mut batched = Table::create(schema(), 0);
        batched.append_batch(&rows);

        let mut sequential = Table::create(schema(), 0);
        for r in &rows {
            sequential.append_row(r);
        }

        assert_eq!(batched.row_count(), sequential.row_count());
        for i in 0..5 {
            assert_eq!(batched.row_at(i).unwrap(), sequential.row_at(i).unwrap());
        }
    }

    #[test]
    fn update_row_ignores_unknown_columns() {
        let mut t = Table::create(schema(), 1);
        t.append_row(&[Value::I64(1), Value::F64(2.0)]);
        t.update_row(0, &[("price", Value::F64(9.0)), ("bogus", Value::I64(1))]).unwrap();
        assert_eq!(t.row_at(0).unwrap().values[1], Value::F64(9.0));
    }

    #[test]
    fn update_row_out_of_bounds_fails() {
        let mut t = Table::create(schema(), 1);
        assert!(matches!(t.update_row(0, &[]), Err(NdtsError::OutOfBounds { .. })));
    }

    #[test]
    fn empty_table_aggregates_match_boundary_spec() {
        let t = Table::create(schema(), 0);
        assert_eq!(t.aggregate("price", AggOp::Sum).unwrap(), 0.0);
        assert!(t.aggregate("price", AggOp::Avg).unwrap().is_nan());
        assert_eq!(t.aggregate("price", AggOp::Min).unwrap(), f64::INFINITY);
        assert_eq!(t.aggregate("price", AggOp::Max).unwrap(), f64::NEG_INFINITY);
        assert_eq!(t.aggregate("price", AggOp::Count).unwrap(), 0.0);
    }

    #[test]
    fn sample_by_buckets_and_sorts_ascending() {
        let mut t = Table::create(schema(), 0);
        for (ts, price) in [(0, 1.0), (500, 2.0), (1000, 3.0), (1500, 4.0)] {
            t.append_row(&[Value::I64(ts), Value::F64(price)]);
        }
        let out = t
            .sample_by("ts", 1000, &[SampleSpec { column: "price".into(), op: SampleOp::Last }])
            .unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.row_at(0).unwrap().values, vec![Value::I64(0), Value::F64(2.0)]);
        assert_eq!(out.row_at(1).unwrap().values, vec![Value::I64(1000), Value::F64(4.0)]);
    }

    #[test]
    fn sample_by_multi_op_uses_suffixed_key() {
        let mut t = Table::create(schema(), 0);
        for (ts, price) in [(0, 1.0), (500, 3.0)] {
            t.append_row(&[Value::I64(ts), Value::F64(price)]);
        }
        let out = t
            .sample_by(
                "ts",
                1000,
                &[
                    SampleSpec { column: "price".into(), op: SampleOp::Min },
                    SampleSpec { column: "price".into(), op: SampleOp::Max },
                ],
            )
            .unwrap();
        let cols = &out.schema().columns;
        assert_eq!(cols[1].name, "price_min");
        assert_eq!(cols[2].name, "price_max");
    }

    #[test]
    fn save_and_load_round_trips_numeric_schema() {
        let mut t = Table::create(schema(), 0);
        for i in 0..10 {
            t.append_row(&[Value::I64(1_700_000_000_000 + i), Value::F64(i as f64 * 1.5)]);
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ndts");
        t.save_to_file(&path).unwrap();
        let loaded = Table::load_from_file(&path).unwrap();
        assert_eq!(loaded.row_count(), t.row_count());
        for i in 0..t.row_count() {
            assert_eq!(loaded.row_at(i).unwrap(), t.row_at(i).unwrap());
        }
    }

    #[test]
    fn save_string_column_is_unsupported() {
        let schema = Schema::new(vec![ColumnDef::new("s", ColumnType::String)]);
        let mut t = Table::create(schema, 0);
        t.append_row(&[Value::Str("x".into())]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ndts");
        assert!(matches!(t.save_to_file(&path), Err(NdtsError::Unsupported(_))));
    }

    #[test]
    fn create_index_scans_existing_rows() {
        let mut t = Table::create(schema(), 0);
        for i in 0..5 {
            t.append_row(&[Value::I64(i), Value::F64(i as f64)]);
        }
        t.create_index("by_ts", &["ts".to_string()]).unwrap();
        let idx = t.index("by_ts").unwrap();
        assert_eq!(idx.equal(&[Value::I64(3).order_key()]), vec![3]);
    }

    #[test]
    fn create_index_on_unknown_column_is_not_found() {
        let mut t = Table::create(schema(), 0);
        assert!(matches!(t.create_index("bad", &["nope".to_string()]), Err(NdtsError::NotFound(_))));
    }

    #[test]
    fn create_index_duplicate_name_is_invariant_error() {
        let mut t = Table::create(schema(), 0);
        t.create_index("by_ts", &["ts".to_string()]).unwrap();
        assert!(matches!(t.create_index("by_ts", &["ts".to_string()]), Err(NdtsError::Invariant(_))));
    }

    #[test]
    fn index_tracks_appended_rows_incrementally() {
        let mut t = Table::create(schema(), 0);
        t.create_index("by_ts", &["ts".to_string()]).unwrap();
        for i in 0..3 {
            t.append_row(&[Value::I64(i), Value::F64(i as f64)]);
        }
        let idx = t.index("by_ts").unwrap();
        assert_eq!(idx.equal(&[Value::I64(2).order_key()]), vec![2]);
    }

    #[test]
    fn index_tracks_updated_rows() {
        let mut t = Table::create(schema(), 0);
        t.append_row(&[Value::I64(1), Value::F64(1.0)]);
        t.append_row(&[Value::I64(2), Value::F64(2.0)]);
        t.create_index("by_ts", &["ts".to_string()]).unwrap();

        t.update_row(0, &[("ts", Value::I64(99))]).unwrap();
        let idx = t.index("by_ts").unwrap();
        assert!(idx.equal(&[Value::I64(1).order_key()]).is_empty());
        assert_eq!(idx.equal(&[Value::I64(99).order_key()]), vec![0]);
    }

    #[test]
    fn prefix_range_probes_composite_index() {
        let schema = Schema::new(vec![
            ColumnDef::new("symbol", ColumnType::I32),
            ColumnDef::new("ts", ColumnType::I64),
        ]);
        let mut t = Table::create(schema, 0);
        for sym in [1, 2] {
            for ts in 0..5 {
                t.append_row(&[Value::I32(sym), Value::I64(ts)]);
            }
        }
        t.create_index("by_symbol_ts", &["symbol".to_string(), "ts".to_string()]).unwrap();
        let idx = t.index("by_symbol_ts").unwrap();

        let prefix = vec![Value::I32(2).order_key()];
        let lo = std::ops::Bound::Included(Value::I64(2).order_key());
        let hi = std::ops::Bound::Excluded(Value::I64(4).order_key());
        let mut rows = idx.prefix_range(&prefix, lo, hi);
        rows.sort_unstable();
        assert_eq!(rows, vec![7, 8]);
    }

    #[test]
    fn drop_index_removes_it() {
        let mut t = Table::create(schema(), 0);
        t.create_index("by_ts", &["ts".to_string()]).unwrap();
        t.drop_index("by_ts").unwrap();
        assert!(t.index("by_ts").is_none());
    }

    #[test]
    fn drop_unregistered_index_is_not_found() {
        let mut t = Table::create(schema(), 0);
        assert!(matches!(t.drop_index("nope"), Err(NdtsError::NotFound(_))));
    }
}
