//! SQL subset: lexer, recursive-descent parser, window-frame math, and an
//! in-memory executor over the columnar [`crate::table::Table`] type.

mod ast;
mod exec;
mod lexer;
mod parser;
mod window;

pub use ast::*;
pub use exec::{execute, Catalog, QueryOutcome};
pub use parser::parse;

use ndts_core::Result;

/// Parses and executes one SQL statement against `catalog` in a single call.
pub fn run(sql: &str, catalog: &mut Catalog) -> Result<QueryOutcome> {
    let stmt = parse(sql)?;
    execute(&stmt, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndts_core::{ColumnDef, ColumnType, Value};

    fn setup() -> Catalog {
        let mut catalog = Catalog::new();
        run(
            "CREATE TABLE ticks (ts I64, symbol I32, price F64, volume F64)",
            &mut catalog,
        )
        .unwrap();
        catalog
    }

    fn rows_out(outcome: QueryOutcome) -> (Vec<String>, Vec<Vec<Value>>) {
        match outcome {
            QueryOutcome::Rows { columns, rows } => (columns, rows),
            QueryOutcome::Affected(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn insert_filter_order_limit() {
        let mut catalog = setup();
        for i in 0..5 {
            run(&format!("INSERT INTO ticks VALUES ({}, 1, {}.0, 10.0)", i, i * 2), &mut catalog).unwrap();
        }
        let out = run("SELECT ts, price FROM ticks WHERE price > 2.0 ORDER BY ts DESC LIMIT 2", &mut catalog).unwrap();
        let (cols, rows) = rows_out(out);
        assert_eq!(cols, vec!["ts", "price"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_i64(), 4);
        assert_eq!(rows[1][0].as_i64(), 3);
    }

    #[test]
    fn group_by_having_aggregate() {
        let mut catalog = setup();
        for (sym, price) in [(1, 1.0), (1, 3.0), (2, 10.0), (2, 20.0)] {
            run(&format!("INSERT INTO ticks VALUES (0, {sym}, {price}, 1.0)"), &mut catalog).unwrap();
        }
        let out = run("SELECT symbol, AVG(price) AS avg_price FROM ticks GROUP BY symbol HAVING AVG(price) > 5.0", &mut catalog).unwrap();
        let (cols, rows) = rows_out(out);
        assert_eq!(cols, vec!["symbol", "avg_price"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_i64(), 2);
        assert_eq!(rows[0][1].as_f64(), 15.0);
    }

    #[test]
    fn inner_and_left_join() {
        let mut catalog = setup();
        catalog.insert(
            "symbols".to_string(),
            crate::table::Table::create(ndts_core::Schema::new(vec![ColumnDef::new("id", ColumnType::I32), ColumnDef::new("name", ColumnType::String)]), 0),
        );
        run("INSERT INTO symbols VALUES (1, 'BTC')", &mut catalog).unwrap();
        run("INSERT INTO ticks VALUES (0, 1, 100.0, 1.0)", &mut catalog).unwrap();
        run("INSERT INTO ticks VALUES (0, 2, 200.0, 1.0)", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT t.price, s.name FROM ticks t JOIN symbols s ON t.symbol = s.id", &mut catalog).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1].to_string(), "BTC");

        let (_, rows) = rows_out(run("SELECT t.price, s.name FROM ticks t LEFT JOIN symbols s ON t.symbol = s.id ORDER BY t.price", &mut catalog).unwrap());
        assert_eq!(rows.len(), 2);
        assert!(rows[1][1].is_null());
    }

    #[test]
    fn window_stddev_over_unbounded() {
        let mut catalog = setup();
        for i in 0..5 {
            run(&format!("INSERT INTO ticks VALUES ({i}, 1, {}.0, 1.0)", i), &mut catalog).unwrap();
        }
        let (_, rows) = rows_out(
            run(
                "SELECT ts, STDDEV(price) OVER (ORDER BY ts ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS sd FROM ticks ORDER BY ts",
                &mut catalog,
            )
            .unwrap(),
        );
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0][1].as_f64(), 0.0);
        assert!(rows[4][1].as_f64() > 0.0);
    }

    #[test]
    fn upsert_inserts_then_updates() {
        let mut catalog = setup();
        let out = run(
            "INSERT INTO ticks (ts, symbol, price, volume) VALUES (1, 1, 100.0, 5.0) ON CONFLICT (ts, symbol) DO UPDATE SET price = EXCLUDED.price",
            &mut catalog,
        )
        .unwrap();
        assert!(matches!(out, QueryOutcome::Affected(1)));

        let out = run(
            "INSERT INTO ticks (ts, symbol, price, volume) VALUES (1, 1, 150.0, 5.0) ON CONFLICT (ts, symbol) DO UPDATE SET price = EXCLUDED.price",
            &mut catalog,
        )
        .unwrap();
        assert!(matches!(out, QueryOutcome::Affected(1)));

        let (_, rows) = rows_out(run("SELECT price FROM ticks", &mut catalog).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_f64(), 150.0);
    }

    #[test]
    fn in_subquery_single_column() {
        let mut catalog = setup();
        catalog.insert(
            "watchlist".to_string(),
            crate::table::Table::create(ndts_core::Schema::new(vec![ColumnDef::new("symbol", ColumnType::I32)]), 0),
        );
        run("INSERT INTO watchlist VALUES (1)", &mut catalog).unwrap();
        run("INSERT INTO ticks VALUES (0, 1, 1.0, 1.0)", &mut catalog).unwrap();
        run("INSERT INTO ticks VALUES (0, 2, 2.0, 1.0)", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT price FROM ticks WHERE symbol IN (SELECT symbol FROM watchlist)", &mut catalog).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_f64(), 1.0);
    }

    #[test]
    fn tuple_in_is_unsupported() {
        let mut catalog = setup();
        let err = run("SELECT * FROM ticks WHERE (ts, symbol) IN ((1, 1), (2, 2))", &mut catalog).unwrap_err();
        assert!(matches!(err, ndts_core::NdtsError::Unsupported(_)));
    }

    #[test]
    fn tail_window_fast_path_matches_general_result() {
        let mut catalog = setup();
        for i in 0..96 {
            run(&format!("INSERT INTO ticks VALUES ({i}, 1, {}.0, 1.0)", (i % 7) as f64), &mut catalog).unwrap();
        }
        let (_, fast) = rows_out(
            run(
                "SELECT ts, STDDEV(price) OVER (ORDER BY ts ROWS BETWEEN 95 PRECEDING AND CURRENT ROW) AS sd FROM ticks ORDER BY ts DESC LIMIT 1",
                &mut catalog,
            )
            .unwrap(),
        );
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0][0].as_i64(), 95);
        assert!(fast[0][1].as_f64() > 0.0);
    }

    #[test]
    fn create_index_then_equality_where_uses_probe() {
        let mut catalog = setup();
        for (sym, price) in [(1, 1.0), (2, 2.0), (3, 3.0)] {
            run(&format!("INSERT INTO ticks VALUES (0, {sym}, {price}, 1.0)"), &mut catalog).unwrap();
        }
        run("CREATE INDEX by_symbol ON ticks (symbol)", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT price FROM ticks WHERE symbol = 2", &mut catalog).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_f64(), 2.0);
    }

    #[test]
    fn range_where_narrows_through_index() {
        let mut catalog = setup();
        for i in 0..10 {
            run(&format!("INSERT INTO ticks VALUES ({i}, 1, {}.0, 1.0)", i), &mut catalog).unwrap();
        }
        run("CREATE INDEX by_ts ON ticks (ts)", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT ts FROM ticks WHERE ts > 3 AND ts <= 7 ORDER BY ts", &mut catalog).unwrap());
        let tss: Vec<i64> = rows.iter().map(|r| r[0].as_i64()).collect();
        assert_eq!(tss, vec![4, 5, 6, 7]);
    }

    #[test]
    fn composite_index_prefix_match_narrows_to_symbol_then_ts_range() {
        let mut catalog = setup();
        for sym in [1, 2] {
            for i in 0..5 {
                run(&format!("INSERT INTO ticks VALUES ({i}, {sym}, {}.0, 1.0)", i), &mut catalog).unwrap();
            }
        }
        run("CREATE INDEX by_symbol_ts ON ticks (symbol, ts)", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT ts FROM ticks WHERE symbol = 2 AND ts >= 2 ORDER BY ts", &mut catalog).unwrap());
        let tss: Vec<i64> = rows.iter().map(|r| r[0].as_i64()).collect();
        assert_eq!(tss, vec![2, 3, 4]);
    }

    #[test]
    fn where_without_matching_index_still_correct() {
        let mut catalog = setup();
        for (sym, price) in [(1, 1.0), (2, 2.0)] {
            run(&format!("INSERT INTO ticks VALUES (0, {sym}, {price}, 1.0)"), &mut catalog).unwrap();
        }
        run("CREATE INDEX by_symbol ON ticks (symbol)", &mut catalog).unwrap();

        // volume has no index, so this falls back to a full residual scan.
        let (_, rows) = rows_out(run("SELECT price FROM ticks WHERE volume = 1.0", &mut catalog).unwrap());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn drop_unregistered_index_is_not_found() {
        let mut catalog = setup();
        let err = run("DROP INDEX nope ON ticks", &mut catalog).unwrap_err();
        assert!(matches!(err, ndts_core::NdtsError::NotFound(_)));
    }

    #[test]
    fn drop_index_then_select_still_correct() {
        let mut catalog = setup();
        run("INSERT INTO ticks VALUES (0, 1, 1.0, 1.0)", &mut catalog).unwrap();
        run("CREATE INDEX by_symbol ON ticks (symbol)", &mut catalog).unwrap();
        run("DROP INDEX by_symbol ON ticks", &mut catalog).unwrap();

        let (_, rows) = rows_out(run("SELECT price FROM ticks WHERE symbol = 1", &mut catalog).unwrap());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn partition_tail_fast_path() {
        let mut catalog = setup();
        for sym in [1, 2] {
            for i in 0..100 {
                run(&format!("INSERT INTO ticks VALUES ({i}, {sym}, {}.0, 1.0)", i), &mut catalog).unwrap();
            }
        }
        let sql = "WITH ranked AS (SELECT symbol, price, ROW_NUMBER() OVER (PARTITION BY symbol ORDER BY ts DESC) AS rn FROM ticks) SELECT symbol, price FROM ranked WHERE rn = 1";
        let (_, rows) = rows_out(run(sql, &mut catalog).unwrap());
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row[1].as_f64(), 99.0);
        }
    }
}
