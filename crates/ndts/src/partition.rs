//! The Partitioned Table: routes rows to segments by a partition strategy,
//! prunes candidate partitions for queries, and maintains per-partition
//! summary indexes (`get_max` fast paths).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndts_core::{hash::hash_bucket, NdtsError, Result, Schema, Value};
use tracing::{debug, warn};

use crate::segment::{CodecMap, SegmentWriter};
use crate::table::{AggOp, Row, Table};
use crate::tombstone::Tombstone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGranularity {
    Day,
    Month,
    Year,
}

#[derive(Debug, Clone)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
    pub label: String,
}

/// A partition strategy. Time-column values are milliseconds since the
/// Unix epoch (the teacher's own `partition.rs` bucketing convention,
/// generalized here from fixed `day` granularity to all three).
#[derive(Debug, Clone)]
pub enum PartitionStrategy {
    Time { column: String, granularity: TimeGranularity },
    Range { column: String, ranges: Vec<RangeSpec> },
    Hash { column: String, buckets: u32 },
}

#[derive(Debug, Clone)]
pub struct PartitionMeta {
    pub label: String,
    pub path: PathBuf,
    pub row_count: u64,
    pub min_max: Option<(i64, i64)>,
}

pub struct PartitionedTable {
    base_dir: PathBuf,
    schema: Schema,
    strategy: PartitionStrategy,
    codecs: CodecMap,
    writers: HashMap<String, SegmentWriter>,
    max_cache: RefCell<HashMap<(String, String), f64>>,
}

impl PartitionedTable {
    pub fn open(base_dir: impl Into<PathBuf>, schema: Schema, strategy: PartitionStrategy, codecs: CodecMap) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| NdtsError::io(&base_dir, e))?;
        crate::io::recover(&base_dir)?;
        Ok(PartitionedTable {
            base_dir,
            schema,
            strategy,
            codecs,
            writers: HashMap::new(),
            max_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn segment_path(&self, label: &str) -> PathBuf {
        self.base_dir.join(format!("{label}.ndts"))
    }

    fn tombstone_path(&self, label: &str) -> PathBuf {
        self.base_dir.join(format!("{label}.ndts.tomb"))
    }

    fn label_for(&self, values: &[Value]) -> Result<String> {
        match &self.strategy {
            PartitionStrategy::Time { column, granularity } => {
                let idx = self
                    .schema
                    .index_of(column)
                    .ok_or_else(|| NdtsError::not_found(format!("column {column}")))?;
                let ts_ms = values[idx].as_i64();
                time_label(ts_ms, *granularity)
            }
            PartitionStrategy::Range { column, ranges } => {
                let idx = self
                    .schema
                    .index_of(column)
                    .ok_or_else(|| NdtsError::not_found(format!("column {column}")))?;
                let v = values[idx].as_f64();
                ranges
                    .iter()
                    .find(|r| v >= r.min && v < r.max)
                    .map(|r| r.label.clone())
                    .ok_or_else(|| NdtsError::not_found(format!("no range covers value {v}")))
            }
            PartitionStrategy::Hash { column, buckets } => {
                let idx = self
                    .schema
                    .index_of(column)
                    .ok_or_else(|| NdtsError::not_found(format!("column {column}")))?;
                let key = values[idx].to_string();
                Ok(hash_bucket(&key, *buckets).to_string())
            }
        }
    }

    /// Groups `rows` by label, then appends each group via its (lazily
    /// opened) Writer. A failed write to one partition does not abort
    /// sibling partitions in the same batch.
    pub fn append(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        let mut grouped: HashMap<String, Vec<Vec<Value>>> = HashMap::new();
        for row in rows {
            let label = self.label_for(row)?;
            grouped.entry(label).or_default().push(row.clone());
        }

        let mut first_err = None;
        for (label, group) in grouped {
            if let Err(e) = self.append_group(&label, &group) {
                warn!(label = %label, error = %e, "partition write failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        self.max_cache.borrow_mut().clear();
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn append_group(&mut self, label: &str, rows: &[Vec<Value>]) -> Result<()> {
        if !self.writers.contains_key(label) {
            let writer = SegmentWriter::open(self.segment_path(label), self.schema.clone(), self.codecs.clone())?;
            self.writers.insert(label.to_string(), writer);
        }
        self.writers.get_mut(label).unwrap().append(rows)
    }

    /// Scans candidate partitions (pruned by `time_range` when the strategy
    /// is time-based), skipping tombstoned rows, returning rows in
    /// partition-then-insertion order.
    pub fn query(&self, predicate: Option<&dyn Fn(&Row, usize) -> bool>, time_range: Option<(i64, i64)>) -> Result<Vec<Row>> {
        let partitions = self.list_partitions()?;
        let mut out = Vec::new();
        for meta in &partitions {
            if let (Some((start, end)), PartitionStrategy::Time { .. }) = (time_range, &self.strategy) {
                if let Some((bucket_start, bucket_end)) = meta.min_max {
                    if !(bucket_start < end && bucket_end > start) {
                        continue;
                    }
                }
            }

            let table = match SegmentWriter::read_all(&meta.path) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %meta.path.display(), error = %e, "skipping corrupt partition during enumeration");
                    continue;
                }
            };
            let tomb_path = self.tombstone_path(&meta.label);
            let tombstone = Tombstone::load(&tomb_path, table.row_count())?;

            for i in 0..table.row_count() {
                if tombstone.contains(i as u32) {
                    continue;
                }
                let row = table.row_at(i)?;
                if predicate.is_none_or(|p| p(&row, i)) {
                    out.push(row);
                }
            }
        }
        Ok(out)
    }

    /// Returns the max of `column` across matching partitions. Time
    /// partitioning scans only the most recent partition (label
    /// descending); hash partitioning with a hint that fixes the hash
    /// column probes a memoized per-key cache, falling back to a scan on
    /// miss. The cache is cleared on append and on explicit
    /// [`PartitionedTable::clear_max_cache`], but may otherwise go stale
    /// across out-of-band deletes — the source behaves the same way.
    pub fn get_max(&self, column: &str, predicate: Option<&dyn Fn(&Row, usize) -> bool>, partition_hint: Option<&Value>) -> Result<f64> {
        match &self.strategy {
            PartitionStrategy::Time { .. } => {
                let partitions = self.list_partitions()?;
                let Some(meta) = partitions.iter().max_by(|a, b| a.label.cmp(&b.label)) else {
                    return Ok(f64::NEG_INFINITY);
                };
                self.scan_partition_max(meta, column, predicate)
            }
            PartitionStrategy::Hash { buckets, .. } => {
                if let Some(hint) = partition_hint {
                    let key = hint.to_string();
                    let cache_key = (key.clone(), column.to_string());
                    if let Some(&cached) = self.max_cache.borrow().get(&cache_key) {
                        debug!(key = %key, column, "get_max cache hit");
                        return Ok(cached);
                    }
                    let label = hash_bucket(&key, *buckets).to_string();
                    let meta = self.partition_meta(&label)?;
                    let result = match meta {
                        Some(meta) => self.scan_partition_max(&meta, column, predicate)?,
                        None => f64::NEG_INFINITY,
                    };
                    self.max_cache.borrow_mut().insert(cache_key, result);
                    Ok(result)
                } else {
                    self.scan_all_max(column, predicate)
                }
            }
            PartitionStrategy::Range { .. } => self.scan_all_max(column, predicate),
        }
    }

    pub fn clear_max_cache(&self) {
        self.max_cache.borrow_mut().clear();
    }

    /// Rebuilds this table's durable storage wholesale from `rows`,
    /// discarding every existing segment and tombstone first. The segment
    /// format has no in-place update, so a caller that mutated a full
    /// in-memory snapshot (SQL `UPDATE`-by-key semantics from `UPSERT`)
    /// persists the result by rewriting rather than patching.
    pub fn overwrite_all(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        self.writers.clear();
        self.max_cache.borrow_mut().clear();
        if self.base_dir.exists() {
            for entry in fs::read_dir(&self.base_dir).map_err(|e| NdtsError::io(&self.base_dir, e))? {
                let entry = entry.map_err(|e| NdtsError::io(&self.base_dir, e))?;
                let path = entry.path();
                let is_segment = path.extension().is_some_and(|e| e == "ndts");
                let is_tombstone = path.to_string_lossy().ends_with(".ndts.tomb");
                if is_segment || is_tombstone {
                    fs::remove_file(&path).map_err(|e| NdtsError::io(&path, e))?;
                }
            }
        }
        if rows.is_empty() {
            return Ok(());
        }
        self.append(rows)
    }

    fn scan_all_max(&self, column: &str, predicate: Option<&dyn Fn(&Row, usize) -> bool>) -> Result<f64> {
        let mut max = f64::NEG_INFINITY;
        for meta in self.list_partitions()? {
            let v = self.scan_partition_max(&meta, column, predicate)?;
            if v > max {
                max = v;
            }
        }
        Ok(max)
    }

    fn scan_partition_max(&self, meta: &PartitionMeta, column: &str, predicate: Option<&dyn Fn(&Row, usize) -> bool>) -> Result<f64> {
        let table = match SegmentWriter::read_all(&meta.path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %meta.path.display(), error = %e, "skipping corrupt partition");
                return Ok(f64::NEG_INFINITY);
            }
        };
        if predicate.is_none() {
            return table.aggregate(column, AggOp::Max);
        }
        let mut max = f64::NEG_INFINITY;
        for i in 0..table.row_count() {
            let row = table.row_at(i)?;
            if predicate.unwrap()(&row, i) {
                if let Some(v) = row.get(table.schema(), column) {
                    max = max.max(v.as_f64());
                }
            }
        }
        Ok(max)
    }

    fn partition_meta(&self, label: &str) -> Result<Option<PartitionMeta>> {
        let path = self.segment_path(label);
        if !path.exists() {
            return Ok(None);
        }
        let header = SegmentWriter::read_header(&path)?;
        Ok(Some(PartitionMeta {
            label: label.to_string(),
            path,
            row_count: header.row_count,
            min_max: self.label_bounds(label),
        }))
    }

    /// Recovers partition metadata by scanning the base directory for
    /// segment files and reading each header for its row count.
    pub fn list_partitions(&self) -> Result<Vec<PartitionMeta>> {
        let mut out = Vec::new();
        if !self.base_dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.base_dir).map_err(|e| NdtsError::io(&self.base_dir, e))? {
            let entry = entry.map_err(|e| NdtsError::io(&self.base_dir, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "ndts") {
                let label = path.file_stem().unwrap().to_string_lossy().to_string();
                let header = match SegmentWriter::read_header(&path) {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt segment during enumeration");
                        continue;
                    }
                };
                out.push(PartitionMeta { label: label.clone(), path, row_count: header.row_count, min_max: self.label_bounds(&label) });
            }
        }
        out.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(out)
    }

    fn label_bounds(&self, label: &str) -> Option<(i64, i64)> {
        match &self.strategy {
            PartitionStrategy::Time { granularity, .. } => time_bucket_bounds(label, *granularity).ok(),
            _ => None,
        }
    }
}

fn time_label(ts_ms: i64, granularity: TimeGranularity) -> Result<String> {
    let ts = jiff::Timestamp::from_millisecond(ts_ms)
        .map_err(|e| NdtsError::type_mismatch(format!("invalid timestamp {ts_ms}: {e}")))?;
    let date = ts.to_zoned(jiff::tz::TimeZone::UTC).date();
    Ok(match granularity {
        TimeGranularity::Day => format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()),
        TimeGranularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
        TimeGranularity::Year => format!("{:04}", date.year()),
    })
}

/// Parses a time-strategy label back into its `[start_ms, end_ms)` bucket
/// bounds, used for partition pruning.
fn time_bucket_bounds(label: &str, granularity: TimeGranularity) -> Result<(i64, i64)> {
    let parts: Vec<&str> = label.split('-').collect();
    let bad = || NdtsError::corrupt(format!("malformed time partition label {label}"));
    let year: i16 = parts.first().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let (start_date, next) = match granularity {
        TimeGranularity::Day => {
            let month: i8 = parts.get(1).ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let day: i8 = parts.get(2).ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let d = jiff::civil::Date::new(year, month, day).map_err(|_| bad())?;
            (d, d.tomorrow().map_err(|_| bad())?)
        }
        TimeGranularity::Month => {
            let month: i8 = parts.get(1).ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let d = jiff::civil::Date::new(year, month, 1).map_err(|_| bad())?;
            let next = if month == 12 {
                jiff::civil::Date::new(year + 1, 1, 1).map_err(|_| bad())?
            } else {
                jiff::civil::Date::new(year, month + 1, 1).map_err(|_| bad())?
            };
            (d, next)
        }
        TimeGranularity::Year => {
            let d = jiff::civil::Date::new(year, 1, 1).map_err(|_| bad())?;
            let next = jiff::civil::Date::new(year + 1, 1, 1).map_err(|_| bad())?;
            (d, next)
        }
    };
    let start_ts = start_date
        .to_zoned(jiff::tz::TimeZone::UTC)
        .map_err(|_| bad())?
        .timestamp()
        .as_millisecond();
    let end_ts = next.to_zoned(jiff::tz::TimeZone::UTC).map_err(|_| bad())?.timestamp().as_millisecond();
    Ok((start_ts, end_ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndts_core::{ColumnDef, ColumnType};

    fn schema() -> Schema {
        Schema::new(vec![ColumnDef::new("ts", ColumnType::I64), ColumnDef::new("price", ColumnType::F64)])
    }

    const DAY_MS: i64 = 86_400_000;
    const BASE_MS: i64 = 1_700_000_000_000;

    #[test]
    fn time_partition_append_and_query_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let mut pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();

        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::I64(BASE_MS + i * DAY_MS), Value::F64(i as f64)]).collect();
        pt.append(&rows).unwrap();

        let result = pt.query(None, None).unwrap();
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn partition_pruning_touches_only_overlapping_files() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let mut pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();

        let mut rows = Vec::new();
        for day in 0..30 {
            for _ in 0..1000 {
                rows.push(vec![Value::I64(BASE_MS + day * DAY_MS), Value::F64(day as f64)]);
            }
        }
        pt.append(&rows).unwrap();

        let start = BASE_MS + 10 * DAY_MS;
        let end = BASE_MS + 13 * DAY_MS;
        let result = pt.query(None, Some((start, end))).unwrap();
        assert_eq!(result.len(), 3000);
    }

    #[test]
    fn tombstoned_rows_are_excluded_from_query() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let mut pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();

        let rows: Vec<Vec<Value>> = (0..1000).map(|i| vec![Value::I64(BASE_MS + i), Value::F64(i as f64)]).collect();
        pt.append(&rows).unwrap();

        let label = time_label(BASE_MS, TimeGranularity::Day).unwrap();
        let tomb_path = pt.tombstone_path(&label);
        let mut tomb = Tombstone::new(&tomb_path, 1000);
        tomb.mark_batch(&[1, 5, 10]);
        tomb.save().unwrap();

        let result = pt.query(None, None).unwrap();
        assert_eq!(result.len(), 997);
    }

    #[test]
    fn hash_partitioning_routes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let schema = Schema::new(vec![ColumnDef::new("symbol", ColumnType::String), ColumnDef::new("price", ColumnType::F64)]);
        let strategy = PartitionStrategy::Hash { column: "symbol".into(), buckets: 4 };
        let mut pt = PartitionedTable::open(dir.path(), schema, strategy, CodecMap::new()).unwrap();

        let rows = vec![
            vec![Value::Str("BTCUSDT".into()), Value::F64(1.0)],
            vec![Value::Str("ETHUSDT".into()), Value::F64(2.0)],
        ];
        pt.append(&rows).unwrap();
        let result = pt.query(None, None).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn overwrite_all_replaces_prior_contents() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let mut pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();

        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::I64(BASE_MS + i * DAY_MS), Value::F64(i as f64)]).collect();
        pt.append(&rows).unwrap();
        assert_eq!(pt.query(None, None).unwrap().len(), 5);

        let replacement: Vec<Vec<Value>> = (0..2).map(|i| vec![Value::I64(BASE_MS + i * DAY_MS), Value::F64(100.0 + i as f64)]).collect();
        pt.overwrite_all(&replacement).unwrap();

        let result = pt.query(None, None).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].values[1].as_f64(), 100.0);
    }

    #[test]
    fn overwrite_all_with_empty_rows_clears_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let mut pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();

        let rows: Vec<Vec<Value>> = (0..3).map(|i| vec![Value::I64(BASE_MS + i * DAY_MS), Value::F64(i as f64)]).collect();
        pt.append(&rows).unwrap();
        pt.overwrite_all(&[]).unwrap();
        assert!(pt.query(None, None).unwrap().is_empty());
    }

    #[test]
    fn missing_partition_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
        let pt = PartitionedTable::open(dir.path(), schema(), strategy, CodecMap::new()).unwrap();
        assert!(pt.query(None, None).unwrap().is_empty());
    }
}
