//! The mmap Pool: keeps one `SegmentReader` per symbol's active segment
//! mapped for the life of the process, so replay/as-of queries never pay
//! a fresh `open`+`mmap` per tick.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndts_core::Result;
use tracing::warn;

use crate::segment::{ColumnView, SegmentReader};

pub struct Pool {
    base_dir: PathBuf,
    readers: HashMap<String, SegmentReader>,
    /// Symbols in the order passed to `init`, minus any skipped as
    /// unavailable. `readers` alone can't recover this order since
    /// `HashMap` iteration is randomized per process.
    order: Vec<String>,
}

impl Pool {
    /// Maps `${base_dir}/${symbol}.ndts` for each symbol. A symbol whose
    /// segment is missing or corrupt is logged and skipped rather than
    /// failing the whole pool.
    pub fn init(symbols: &[String], base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let mut readers = HashMap::with_capacity(symbols.len());
        let mut order = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let path = base_dir.join(format!("{symbol}.ndts"));
            match SegmentReader::open(&path) {
                Ok(reader) => {
                    readers.insert(symbol.clone(), reader);
                    order.push(symbol.clone());
                }
                Err(e) => warn!(symbol = %symbol, path = %path.display(), error = %e, "skipping symbol, segment unavailable"),
            }
        }
        Ok(Pool { base_dir, readers, order })
    }

    /// Yields symbols in the order they were passed to `init` (skipped
    /// symbols omitted), not `HashMap` iteration order, so callers that
    /// tie-break on insertion order (e.g. the merge engine) see a stable
    /// sequence across runs.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.readers.contains_key(symbol)
    }

    pub fn row_count(&self, symbol: &str) -> Option<usize> {
        self.readers.get(symbol).map(|r| r.row_count())
    }

    pub fn column(&self, symbol: &str, name: &str) -> Result<ColumnView<'_>> {
        let reader = self
            .readers
            .get(symbol)
            .ok_or_else(|| ndts_core::NdtsError::not_found(format!("symbol {symbol}")))?;
        reader.column(name)
    }

    /// Touches every page of the requested columns so later access doesn't
    /// pay first-fault latency; a no-op safety net since `column` already
    /// decodes/derefs the full span.
    pub fn prefetch(&self, symbol: &str, columns: &[String]) -> Result<()> {
        for name in columns {
            let view = self.column(symbol, name)?;
            std::hint::black_box(view.len());
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.readers.clear();
        self.order.clear();
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{CodecMap, SegmentWriter};
    use ndts_core::{ColumnDef, ColumnType, Schema, Value};

    fn write_segment(dir: &Path, symbol: &str) {
        let schema = Schema::new(vec![ColumnDef::new("ts", ColumnType::I64), ColumnDef::new("price", ColumnType::F64)]);
        let mut w = SegmentWriter::open(dir.join(format!("{symbol}.ndts")), schema, CodecMap::new()).unwrap();
        w.append(&[vec![Value::I64(1), Value::F64(1.0)], vec![Value::I64(2), Value::F64(2.0)]]).unwrap();
        w.close().unwrap();
    }

    #[test]
    fn init_maps_existing_symbols_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT");

        let symbols = vec!["BTCUSDT".to_string(), "MISSING".to_string()];
        let pool = Pool::init(&symbols, dir.path()).unwrap();

        assert!(pool.contains("BTCUSDT"));
        assert!(!pool.contains("MISSING"));
        assert_eq!(pool.row_count("BTCUSDT"), Some(2));
    }

    #[test]
    fn column_reads_through_to_segment() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "ETHUSDT");
        let pool = Pool::init(&["ETHUSDT".to_string()], dir.path()).unwrap();
        let view = pool.column("ETHUSDT", "price").unwrap();
        assert_eq!(view.as_f64().unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn symbols_preserves_init_order_not_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "ZETA");
        write_segment(dir.path(), "ALPHA");
        write_segment(dir.path(), "MID");

        let symbols = vec!["ZETA".to_string(), "ALPHA".to_string(), "MID".to_string()];
        let pool = Pool::init(&symbols, dir.path()).unwrap();
        let order: Vec<&str> = pool.symbols().collect();
        assert_eq!(order, vec!["ZETA", "ALPHA", "MID"]);
    }

    #[test]
    fn symbols_omits_skipped_entries_but_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT");
        write_segment(dir.path(), "SOLUSDT");

        let symbols = vec!["BTCUSDT".to_string(), "MISSING".to_string(), "SOLUSDT".to_string()];
        let pool = Pool::init(&symbols, dir.path()).unwrap();
        let order: Vec<&str> = pool.symbols().collect();
        assert_eq!(order, vec!["BTCUSDT", "SOLUSDT"]);
    }

    #[test]
    fn close_drops_all_mappings() {
        let dir = tempfile::tempdir().unwrap();
        write_segment(dir.path(), "BTCUSDT");
        let mut pool = Pool::init(&["BTCUSDT".to_string()], dir.path()).unwrap();
        pool.close();
        assert!(!pool.contains("BTCUSDT"));
    }
}
