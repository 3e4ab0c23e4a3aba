pub mod config;
pub mod server;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;
    use ndts::{ColumnDef, ColumnType, PartitionStrategy, Schema, Store, TimeGranularity, Value};
    use ndts_client::Client;
    use std::net::TcpListener;
    use std::sync::{Arc, RwLock};
    use tempfile::TempDir;

    fn start_server(dir: &std::path::Path) -> std::net::SocketAddr {
        let store = Store::open(dir).unwrap();
        let store = Arc::new(RwLock::new(store));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = stream.unwrap();
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    server::handle_conn(stream, store);
                });
            }
        });
        addr
    }

    fn trades_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("ts", ColumnType::I64),
            ColumnDef::new("symbol", ColumnType::I32),
            ColumnDef::new("price", ColumnType::F64),
        ])
    }

    #[test]
    fn write_then_query_round_trips_over_the_wire() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(dir.path());
        let mut client = Client::connect(&addr.to_string()).unwrap();

        let schema = trades_schema();
        let base_ms = 1_700_000_000_000i64;
        let rows = vec![
            vec![Value::I64(base_ms), Value::I32(1), Value::F64(100.5)],
            vec![Value::I64(base_ms + 1), Value::I32(1), Value::F64(101.0)],
        ];
        client.write("trades", &schema, &rows).unwrap();

        let outcome = client.query("SELECT price FROM trades ORDER BY price DESC LIMIT 1").unwrap();
        match outcome {
            ndts_client::QueryResult::Rows { columns, rows } => {
                assert_eq!(columns, vec!["price".to_string()]);
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0][0].as_f64(), 101.0);
            }
            ndts_client::QueryResult::Affected(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn write_creates_table_on_first_use() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(dir.path());
        let mut client = Client::connect(&addr.to_string()).unwrap();

        let schema = trades_schema();
        let rows = vec![vec![Value::I64(1), Value::I32(1), Value::F64(1.0)]];
        client.write("fresh_table", &schema, &rows).unwrap();

        let outcome = client.query("SELECT price FROM fresh_table").unwrap();
        match outcome {
            ndts_client::QueryResult::Rows { rows, .. } => assert_eq!(rows.len(), 1),
            ndts_client::QueryResult::Affected(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn query_against_missing_table_errors() {
        let dir = TempDir::new().unwrap();
        let addr = start_server(dir.path());
        let mut client = Client::connect(&addr.to_string()).unwrap();

        let result = client.query("SELECT * FROM nonexistent");
        assert!(result.is_err());
    }

    #[test]
    fn partition_strategy_reexports_are_usable() {
        // Exercises the re-exports consumed by `server::handle_write`'s
        // implicit table-creation path.
        let _ = PartitionStrategy::Time { column: "ts".into(), granularity: TimeGranularity::Day };
    }
}
