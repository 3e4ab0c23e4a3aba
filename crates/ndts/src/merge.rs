//! The Merge Engine: a k-way merge over per-symbol time columns held open
//! by the [`Pool`], producing deterministic tick/snapshot/as-of views
//! without materializing the whole dataset.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use ndts_core::{NdtsError, Result, Value};

use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: i64,
    pub symbol: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickSnapshot {
    pub timestamp: i64,
    pub prices: HashMap<String, f64>,
}

/// One per-symbol read cursor: the symbol's timestamp column plus every
/// other column named in `columns`, borrowed for the engine's lifetime.
struct Cursor<'a> {
    symbol: String,
    insertion_order: usize,
    timestamps: &'a [i64],
    columns: Vec<(&'a str, ColumnData<'a>)>,
    next: usize,
}

enum ColumnData<'a> {
    I64(&'a [i64]),
    F64(&'a [f64]),
}

impl Cursor<'_> {
    fn row_at(&self, idx: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|(_, data)| match data {
                ColumnData::I64(s) => Value::I64(s[idx]),
                ColumnData::F64(s) => Value::F64(s[idx]),
            })
            .collect()
    }
}

/// Heap entry ordered by `(timestamp, insertion_order)` ascending; `BinaryHeap`
/// is a max-heap so the ordering is reversed to make it behave as a min-heap.
struct HeapEntry {
    timestamp: i64,
    insertion_order: usize,
    cursor_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.insertion_order == other.insertion_order
    }
}
impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.timestamp.cmp(&self.timestamp).then_with(|| other.insertion_order.cmp(&self.insertion_order))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct MergeEngine<'a> {
    cursors: Vec<Cursor<'a>>,
    time_range: Option<(i64, i64)>,
}

impl<'a> MergeEngine<'a> {
    /// `columns` names the non-timestamp columns each tick carries, in
    /// order; `time_column` is the per-symbol designated timestamp column.
    pub fn new(pool: &'a Pool, time_column: &str, columns: &[String], time_range: Option<(i64, i64)>) -> Result<Self> {
        let mut cursors = Vec::new();
        for (insertion_order, symbol) in pool.symbols().enumerate() {
            let ts_view = pool.column(symbol, time_column)?;
            let timestamps = ts_view
                .as_i64()
                .ok_or_else(|| NdtsError::type_mismatch(format!("{time_column} is not an i64 column")))?;

            let mut col_data = Vec::with_capacity(columns.len());
            for name in columns {
                let view = pool.column(symbol, name)?;
                let data = match (view.as_i64(), view.as_f64()) {
                    (Some(s), _) => ColumnData::I64(s),
                    (_, Some(s)) => ColumnData::F64(s),
                    _ => return Err(NdtsError::type_mismatch(format!("{name} is not a numeric column"))),
                };
                col_data.push((name.as_str(), data));
            }

            cursors.push(Cursor { symbol: symbol.to_string(), insertion_order, timestamps, columns: col_data, next: 0 });
        }
        Ok(MergeEngine { cursors, time_range })
    }

    fn in_range(&self, ts: i64) -> bool {
        match self.time_range {
            Some((start, end)) => ts >= start && ts <= end,
            None => true,
        }
    }

    fn seed_heap(&self) -> BinaryHeap<HeapEntry> {
        let mut heap = BinaryHeap::with_capacity(self.cursors.len());
        for (idx, cursor) in self.cursors.iter().enumerate() {
            if let Some(&ts) = cursor.timestamps.get(cursor.next) {
                heap.push(HeapEntry { timestamp: ts, insertion_order: cursor.insertion_order, cursor_idx: idx });
            }
        }
        heap
    }

    /// Lazily yields every tick across all symbols in globally
    /// non-decreasing timestamp order, breaking ties by stable symbol
    /// insertion order. Non-restartable: consumes `self`.
    pub fn replay_ticks(mut self) -> impl Iterator<Item = Tick> + 'a {
        std::iter::from_fn(move || {
            loop {
                let mut heap = self.seed_heap();
                let entry = heap.pop()?;
                let cursor = &mut self.cursors[entry.cursor_idx];
                let idx = cursor.next;
                cursor.next += 1;
                let ts = entry.timestamp;
                if !self.in_range(ts) {
                    continue;
                }
                let values = cursor.row_at(idx);
                return Some(Tick { timestamp: ts, symbol: cursor.symbol.clone(), values });
            }
        })
    }

    /// Groups consecutive ticks sharing a timestamp into one snapshot,
    /// reading the column named `price` from each tick's values.
    pub fn replay_snapshots(self) -> impl Iterator<Item = TickSnapshot> + 'a {
        let mut ticks = self.replay_ticks().peekable();
        std::iter::from_fn(move || {
            let first = ticks.next()?;
            let mut prices = HashMap::new();
            let price = first.values.first().map(|v| v.as_f64()).unwrap_or(f64::NAN);
            prices.insert(first.symbol.clone(), price);
            let timestamp = first.timestamp;
            while let Some(next) = ticks.peek() {
                if next.timestamp != timestamp {
                    break;
                }
                let next = ticks.next().unwrap();
                let price = next.values.first().map(|v| v.as_f64()).unwrap_or(f64::NAN);
                prices.insert(next.symbol, price);
            }
            Some(TickSnapshot { timestamp, prices })
        })
    }

    /// Returns, per symbol, the last row with timestamp `<= ts` via binary
    /// search on that symbol's timestamp column.
    pub fn as_of_snapshot(&self, ts: i64) -> HashMap<String, Vec<Value>> {
        let mut out = HashMap::with_capacity(self.cursors.len());
        for cursor in &self.cursors {
            let idx = match cursor.timestamps.partition_point(|&t| t <= ts) {
                0 => continue,
                n => n - 1,
            };
            out.insert(cursor.symbol.clone(), cursor.row_at(idx));
        }
        out
    }

    /// Advances every per-symbol cursor to the first row with timestamp
    /// `>= ts`.
    pub fn seek(&mut self, ts: i64) {
        for cursor in &mut self.cursors {
            cursor.next = cursor.timestamps.partition_point(|&t| t < ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{CodecMap, SegmentWriter};
    use ndts_core::{ColumnDef, ColumnType, Schema};
    use std::path::Path;

    fn write_segment(dir: &Path, symbol: &str, rows: &[(i64, f64)]) {
        let schema = Schema::new(vec![ColumnDef::new("ts", ColumnType::I64), ColumnDef::new("price", ColumnType::F64)]);
        let mut w = SegmentWriter::open(dir.join(format!("{symbol}.ndts")), schema, CodecMap::new()).unwrap();
        let rows: Vec<Vec<Value>> = rows.iter().map(|&(t, p)| vec![Value::I64(t), Value::F64(p)]).collect();
        w.append(&rows).unwrap();
        w.close().unwrap();
    }

    #[test]
    fn replay_ticks_is_monotonically_non_decreasing() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 10.0), (3, 12.0), (5, 13.0)]);
        write_segment(dir.path(), "ETHUSDT", &[(2, 1.0), (4, 1.1)]);

        let pool = Pool::init(&["BTCUSDT".to_string(), "ETHUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        let ticks: Vec<Tick> = engine.replay_ticks().collect();

        assert_eq!(ticks.len(), 5);
        for pair in ticks.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert_eq!(ticks[0].symbol, "BTCUSDT");
    }

    #[test]
    fn replay_ticks_breaks_ties_by_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 10.0)]);
        write_segment(dir.path(), "ETHUSDT", &[(1, 1.0)]);

        let pool = Pool::init(&["BTCUSDT".to_string(), "ETHUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        let ticks: Vec<Tick> = engine.replay_ticks().collect();

        assert_eq!(ticks[0].symbol, "BTCUSDT");
        assert_eq!(ticks[1].symbol, "ETHUSDT");
    }

    #[test]
    fn replay_ticks_skips_outside_time_range() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 1.0), (2, 2.0), (3, 3.0)]);

        let pool = Pool::init(&["BTCUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], Some((2, 2))).unwrap();
        let ticks: Vec<Tick> = engine.replay_ticks().collect();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].timestamp, 2);
    }

    #[test]
    fn replay_snapshots_groups_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 10.0), (2, 11.0)]);
        write_segment(dir.path(), "ETHUSDT", &[(1, 1.0), (2, 1.1)]);

        let pool = Pool::init(&["BTCUSDT".to_string(), "ETHUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        let snapshots: Vec<TickSnapshot> = engine.replay_snapshots().collect();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].prices["BTCUSDT"], 10.0);
        assert_eq!(snapshots[0].prices["ETHUSDT"], 1.0);
    }

    #[test]
    fn as_of_snapshot_returns_last_row_leq_ts() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 10.0), (5, 11.0), (9, 12.0)]);

        let pool = Pool::init(&["BTCUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        let snapshot = engine.as_of_snapshot(6);
        assert_eq!(snapshot["BTCUSDT"][1], Value::F64(11.0));
    }

    #[test]
    fn as_of_snapshot_before_first_row_omits_symbol() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(5, 10.0)]);

        let pool = Pool::init(&["BTCUSDT".to_string()], dir.path()).unwrap();
        let engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        assert!(engine.as_of_snapshot(1).is_empty());
    }

    #[test]
    fn seek_advances_cursor_to_first_row_geq_ts() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT", &[(1, 1.0), (3, 2.0), (5, 3.0)]);

        let pool = Pool::init(&["BTCUSDT".to_string()], dir.path()).unwrap();
        let mut engine = MergeEngine::new(&pool, "ts", &["price".to_string()], None).unwrap();
        engine.seek(4);
        let ticks: Vec<Tick> = engine.replay_ticks().collect();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].timestamp, 5);
    }
}
