//! Synthetic market-data walkthrough: generates trades for a handful of
//! symbols, ingests them into an [`ndts::Store`], then runs a few SQL
//! queries over the result. Replaces the teacher's network-dependent
//! Binance downloader with data generated in-process, since live exchange
//! fetch is out of scope here.

use std::path::PathBuf;
use std::time::Instant;

use ndts::{ColumnDef, ColumnType, PartitionStrategy, Schema, Store, TimeGranularity, Value};

const SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT"];
const TICKS_PER_SYMBOL: usize = 5_000;
const START_MS: i64 = 1_700_000_000_000;

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new("info")).init();

    let total = Instant::now();

    println!("Phase 1: Generating synthetic trades...");
    let t = Instant::now();
    let rows = generate_trades();
    println!("  generated {} rows ({:.2}s)", rows.len(), t.elapsed().as_secs_f64());

    let data_dir: PathBuf = std::env::var("NDTS_DEMO_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        dir.into_path()
    });

    println!("Phase 2: Ingesting into the store at {}...", data_dir.display());
    let t = Instant::now();
    let mut store = Store::open(&data_dir).expect("failed to open store");
    store
        .create_table(
            "trades",
            trades_schema(),
            PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Hour },
            ndts::CodecMap::new(),
        )
        .expect("failed to create table");
    for chunk in rows.chunks(1_000) {
        store.write("trades", chunk).expect("write failed");
    }
    println!("  ingested {} rows ({:.2}s)", rows.len(), t.elapsed().as_secs_f64());

    println!("Phase 3: Running SQL queries...");
    let t = Instant::now();
    run_queries(&mut store);
    println!("  queries complete ({:.2}s)", t.elapsed().as_secs_f64());

    println!("\nAll done! Total time: {:.2}s", total.elapsed().as_secs_f64());
}

fn trades_schema() -> Schema {
    Schema::new(vec![
        ColumnDef::new("ts", ColumnType::I64),
        ColumnDef::new("symbol", ColumnType::I32),
        ColumnDef::new("price", ColumnType::F64),
        ColumnDef::new("size", ColumnType::F64),
    ])
}

fn generate_trades() -> Vec<Vec<Value>> {
    let mut rows = Vec::with_capacity(SYMBOLS.len() * TICKS_PER_SYMBOL);
    for (sym_idx, _symbol) in SYMBOLS.iter().enumerate() {
        let mut price = 100.0 + sym_idx as f64 * 50.0;
        for i in 0..TICKS_PER_SYMBOL {
            // Deterministic pseudo-walk: no `rand` dependency needed for a demo.
            let step = (((sym_idx * 7919 + i * 104_729) % 2001) as f64 - 1000.0) / 1000.0;
            price = (price + step).max(1.0);
            let ts = START_MS + (i as i64) * 200;
            rows.push(vec![Value::I64(ts), Value::I32(sym_idx as i32), Value::F64(price), Value::F64(1.0 + (i % 10) as f64)]);
        }
    }
    rows
}

fn run_queries(store: &mut Store) {
    let queries = [
        "SELECT symbol, COUNT(*) AS n, AVG(price) AS avg_price FROM trades GROUP BY symbol ORDER BY symbol",
        "SELECT price FROM trades ORDER BY ts DESC LIMIT 1",
        "SELECT symbol, MAX(price) AS peak FROM trades GROUP BY symbol HAVING MAX(price) > 100 ORDER BY peak DESC",
    ];

    for sql in queries {
        println!("  > {sql}");
        match store.query(sql) {
            Ok(ndts::sql::QueryOutcome::Rows { columns, rows }) => {
                println!("    columns: {columns:?}");
                for row in rows.iter().take(10) {
                    println!("    {row:?}");
                }
                if rows.len() > 10 {
                    println!("    ... ({} more rows)", rows.len() - 10);
                }
            }
            Ok(ndts::sql::QueryOutcome::Affected(n)) => println!("    {n} rows affected"),
            Err(e) => println!("    query error: {e}"),
        }
    }
}
