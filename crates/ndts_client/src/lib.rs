use std::io::{Read, Write};
use std::net::TcpStream;

use zerocopy::{FromBytes, IntoBytes};

use ndts_core::{Schema, Value};
use ndts_proto::*;

/// Client-side mirror of the server's `sql::QueryOutcome`: the client crate
/// does not depend on the full store, so it carries its own row-batch shape
/// over the wire instead.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows { columns: Vec<String>, rows: Vec<Vec<Value>> },
    Affected(usize),
}

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Client { stream })
    }

    /// Sends a batch of rows for `table`. The server creates the table with
    /// this schema on first write if it does not already exist.
    pub fn write(&mut self, table: &str, schema: &Schema, rows: &[Vec<Value>]) -> Result<(), String> {
        let body = build_write_body(table, schema, rows);
        self.send(MSG_WRITE, &body)?;
        self.expect_ok()
    }

    pub fn query(&mut self, sql: &str) -> Result<QueryResult, String> {
        let mut body = Vec::new();
        write_section(&mut body, sql.as_bytes());
        self.send(MSG_QUERY, &body)?;
        self.recv_result()
    }

    fn send(&mut self, msg_type: u32, body: &[u8]) -> Result<(), String> {
        let header = WireHeader { magic: WIRE_MAGIC, version: WIRE_VERSION, msg_type, _pad: 0, body_len: body.len() as u64 };
        self.stream.write_all(header.as_bytes()).map_err(|e| format!("send error: {e}"))?;
        self.stream.write_all(body).map_err(|e| format!("send error: {e}"))?;
        Ok(())
    }

    fn recv_header(&mut self) -> Result<(WireHeader, Vec<u8>), String> {
        let mut header_buf = [0u8; WIRE_HEADER_SIZE];
        self.stream.read_exact(&mut header_buf).map_err(|e| format!("recv error: {e}"))?;
        let header = *WireHeader::ref_from_bytes(&header_buf).map_err(|e| format!("bad header: {e}"))?;

        if header.magic != WIRE_MAGIC {
            return Err("bad magic in response".into());
        }
        if header.body_len > MAX_BODY_LEN {
            return Err(format!("body too large: {}", header.body_len));
        }

        let body_len = header.body_len as usize;
        let mut body = vec![0u8; body_len];
        if body_len > 0 {
            self.stream.read_exact(&mut body).map_err(|e| format!("recv error: {e}"))?;
        }
        Ok((header, body))
    }

    fn expect_ok(&mut self) -> Result<(), String> {
        let (header, body) = self.recv_header()?;
        match header.msg_type {
            MSG_OK => Ok(()),
            MSG_ERROR => Err(String::from_utf8_lossy(&body).into_owned()),
            other => Err(format!("unexpected response type: {other}")),
        }
    }

    fn recv_result(&mut self) -> Result<QueryResult, String> {
        let (header, body) = self.recv_header()?;
        match header.msg_type {
            MSG_RESULT => parse_query_result(&body),
            MSG_ERROR => Err(String::from_utf8_lossy(&body).into_owned()),
            other => Err(format!("unexpected response type: {other}")),
        }
    }
}

fn build_write_body(table: &str, schema: &Schema, rows: &[Vec<Value>]) -> Vec<u8> {
    let mut body = Vec::new();
    write_section(&mut body, table.as_bytes());
    write_schema(&mut body, schema);
    write_rows(&mut body, rows);
    body
}

fn parse_query_result(body: &[u8]) -> Result<QueryResult, String> {
    let mut r = Reader::new(body);
    let columns: Vec<String> = r.read_str_array()?.into_iter().map(str::to_string).collect();
    let rows = read_rows(&mut r, columns.len())?;

    if columns.len() == 1 && columns[0] == "affected" && rows.len() == 1 {
        if let Value::I64(n) = rows[0][0] {
            return Ok(QueryResult::Affected(n as usize));
        }
    }
    Ok(QueryResult::Rows { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_result_recognizes_affected_shape() {
        let mut body = Vec::new();
        write_str_array(&mut body, &["affected"]);
        write_rows(&mut body, &[vec![Value::I64(3)]]);
        let result = parse_query_result(&body).unwrap();
        assert_eq!(result, QueryResult::Affected(3));
    }

    #[test]
    fn parse_query_result_recognizes_row_batch() {
        let mut body = Vec::new();
        write_str_array(&mut body, &["price"]);
        write_rows(&mut body, &[vec![Value::F64(1.5)]]);
        let result = parse_query_result(&body).unwrap();
        assert_eq!(result, QueryResult::Rows { columns: vec!["price".to_string()], rows: vec![vec![Value::F64(1.5)]] });
    }
}
