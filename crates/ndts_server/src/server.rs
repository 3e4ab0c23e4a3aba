use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use zerocopy::{FromBytes, IntoBytes};

use ndts::{sql, Store, Value};
use ndts_proto::*;
use tracing::{error, warn};

pub fn handle_conn(mut stream: TcpStream, store: Arc<RwLock<Store>>) {
    stream.set_read_timeout(Some(Duration::from_secs(30))).ok();
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();

    let mut header_buf = [0u8; WIRE_HEADER_SIZE];
    loop {
        match stream.read_exact(&mut header_buf) {
            Ok(()) => {}
            Err(ref e)
                if e.kind() == std::io::ErrorKind::UnexpectedEof
                    || e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return;
            }
            Err(_) => return,
        }

        let header = match WireHeader::ref_from_bytes(&header_buf) {
            Ok(h) => *h,
            Err(_) => {
                send_error(&mut stream, "invalid header");
                return;
            }
        };

        if header.magic != WIRE_MAGIC {
            send_error(&mut stream, "bad magic");
            return;
        }
        if header.body_len > MAX_BODY_LEN {
            send_error(&mut stream, "body too large");
            return;
        }

        let body_len = header.body_len as usize;
        let mut body = vec![0u8; body_len];
        if body_len > 0 && stream.read_exact(&mut body).is_err() {
            return;
        }

        match header.msg_type {
            MSG_WRITE => match handle_write(&body, &store) {
                Ok(()) => send_ok(&mut stream),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "write failed");
                    send_error(&mut stream, &e);
                }
            },
            MSG_QUERY => match handle_query(&body, &store) {
                Ok(outcome) => send_result(&mut stream, &outcome),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "query failed");
                    send_error(&mut stream, &e);
                }
            },
            other => send_error(&mut stream, &format!("unknown message type: {other}")),
        }
    }
}

fn handle_write(body: &[u8], store: &Arc<RwLock<Store>>) -> Result<(), String> {
    let mut r = Reader::new(body);

    let table_bytes = r.read_section()?;
    let table = std::str::from_utf8(table_bytes).map_err(|e| format!("bad table name: {e}"))?;

    let schema_bytes = r.read_section()?;
    let schema_text = std::str::from_utf8(schema_bytes).map_err(|e| format!("bad schema: {e}"))?;
    let schema = parse_schema(schema_text)?;

    let rows = read_rows(&mut r, schema.columns.len())?;

    let mut store = store.write().map_err(|e| format!("lock error: {e}"))?;
    if store.table(table).is_none() {
        store
            .create_table(table, schema, ndts::PartitionStrategy::Hash { column: "symbol".into(), buckets: 16 }, ndts::CodecMap::new())
            .map_err(|e| e.to_string())?;
    }
    store.write(table, &rows).map_err(|e| e.to_string())
}

/// Takes the write lock rather than the read lock: `MSG_QUERY` covers
/// `INSERT`/`UPSERT` as well as `SELECT`, and `Store::query` persists
/// mutating statements back to durable storage before returning.
fn handle_query(body: &[u8], store: &Arc<RwLock<Store>>) -> Result<sql::QueryOutcome, String> {
    let mut r = Reader::new(body);
    let sql_bytes = r.read_section()?;
    let sql_text = std::str::from_utf8(sql_bytes).map_err(|e| format!("bad query text: {e}"))?;

    let mut store = store.write().map_err(|e| format!("lock error: {e}"))?;
    store.query(sql_text).map_err(|e| e.to_string())
}

fn send_ok(stream: &mut TcpStream) {
    let header = WireHeader { magic: WIRE_MAGIC, version: WIRE_VERSION, msg_type: MSG_OK, _pad: 0, body_len: 0 };
    let _ = stream.write_all(header.as_bytes());
}

fn send_error(stream: &mut TcpStream, msg: &str) {
    error!(error = msg, "responding with error");
    let header = WireHeader { magic: WIRE_MAGIC, version: WIRE_VERSION, msg_type: MSG_ERROR, _pad: 0, body_len: msg.len() as u64 };
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(msg.as_bytes());
}

/// Normalizes both `QueryOutcome` shapes into one column-tagged row batch:
/// `Affected(n)` becomes a single `affected` column with one `I64` row.
fn send_result(stream: &mut TcpStream, outcome: &sql::QueryOutcome) {
    let (columns, rows): (Vec<String>, Vec<Vec<Value>>) = match outcome {
        sql::QueryOutcome::Rows { columns, rows } => (columns.clone(), rows.clone()),
        sql::QueryOutcome::Affected(n) => (vec!["affected".to_string()], vec![vec![Value::I64(*n as i64)]]),
    };

    let mut body = Vec::new();
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    write_str_array(&mut body, &names);
    write_rows(&mut body, &rows);

    let header = WireHeader { magic: WIRE_MAGIC, version: WIRE_VERSION, msg_type: MSG_RESULT, _pad: 0, body_len: body.len() as u64 };
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end from `lib.rs`'s integration tests, which spin up
    // a real listener and drive it through `ndts_client::Client`.
}
