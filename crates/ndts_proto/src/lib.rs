//! Wire protocol: a fixed 24-byte header followed by a body of
//! length-prefixed, 8-byte-padded sections. A convenience surface over the
//! store — not part of its on-disk contract.

use zerocopy::{FromBytes, IntoBytes, KnownLayout, Immutable};

pub const WIRE_MAGIC: u32 = 0x4E_4454_53; // "NDTS" (low 4 bytes)
pub const WIRE_VERSION: u32 = 1;

pub const MSG_WRITE: u32 = 1;
pub const MSG_QUERY: u32 = 2;
pub const MSG_OK: u32 = 3;
pub const MSG_RESULT: u32 = 4;
pub const MSG_ERROR: u32 = 5;

pub const MAX_BODY_LEN: u64 = 4 * 1024 * 1024 * 1024; // 4 GB

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct WireHeader {
    pub magic: u32,
    pub version: u32,
    pub msg_type: u32,
    pub _pad: u32,
    pub body_len: u64,
}

pub const WIRE_HEADER_SIZE: usize = std::mem::size_of::<WireHeader>();

/// Round up to next 8-byte boundary.
pub fn padded_len(len: usize) -> usize {
    (len + 7) & !7
}

/// Write a length-prefixed section with padding to 8-byte alignment.
pub fn write_section(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u64).to_ne_bytes());
    buf.extend_from_slice(data);
    let pad = padded_len(data.len()) - data.len();
    for _ in 0..pad {
        buf.push(0);
    }
}

/// Cursor for reading fields from a byte buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.pos + n > self.buf.len() {
            return Err("unexpected end of message".into());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u64(&mut self) -> Result<u64, String> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_ne_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, String> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_ne_bytes(bytes.try_into().unwrap()))
    }

    /// Read a length-prefixed section and skip padding.
    pub fn read_section(&mut self) -> Result<&'a [u8], String> {
        let len = self.read_u64()? as usize;
        let data = self.read_bytes(len)?;
        let pad = padded_len(len) - len;
        if pad > 0 {
            self.read_bytes(pad)?;
        }
        Ok(data)
    }

    pub fn read_i64_slice(&mut self, count: usize) -> Result<&'a [i64], String> {
        let bytes = self.read_bytes(count * 8)?;
        <[i64]>::ref_from_bytes(bytes).map_err(|e| format!("alignment error: {e}"))
    }

    pub fn read_f64_slice(&mut self, count: usize) -> Result<&'a [f64], String> {
        let bytes = self.read_bytes(count * 8)?;
        <[f64]>::ref_from_bytes(bytes).map_err(|e| format!("alignment error: {e}"))
    }

    pub fn read_str_array(&mut self) -> Result<Vec<&'a str>, String> {
        let count = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.read_u64()? as usize;
            let bytes = self.read_bytes(len)?;
            let s = std::str::from_utf8(bytes).map_err(|e| format!("bad utf8: {e}"))?;
            out.push(s);
        }
        // Align to 8 bytes
        let pad = padded_len(self.pos) - self.pos;
        if pad > 0 && pad < 8 {
            self.read_bytes(pad)?;
        }
        Ok(out)
    }
}

pub fn write_str_array(buf: &mut Vec<u8>, strings: &[&str]) {
    buf.extend_from_slice(&(strings.len() as u64).to_ne_bytes());
    for s in strings {
        buf.extend_from_slice(&(s.len() as u64).to_ne_bytes());
        buf.extend_from_slice(s.as_bytes());
    }
    let pad = padded_len(buf.len()) - buf.len();
    for _ in 0..pad {
        buf.push(0);
    }
}

impl<'a> Reader<'a> {
    /// Reads one length-prefixed cell value: a `u64` tag followed by its
    /// payload. Tags: 0 `Null`, 1 `I16`, 2 `I32`, 3 `I64`, 4 `F64`, 5 `Str`.
    pub fn read_value(&mut self) -> Result<ndts_core::Value, String> {
        use ndts_core::Value;
        match self.read_u64()? {
            0 => Ok(Value::Null),
            1 => Ok(Value::I16(self.read_u64()? as i16)),
            2 => Ok(Value::I32(self.read_u64()? as i32)),
            3 => Ok(Value::I64(self.read_u64()? as i64)),
            4 => Ok(Value::F64(f64::from_bits(self.read_u64()?))),
            5 => {
                let bytes = self.read_section()?;
                Ok(Value::Str(std::str::from_utf8(bytes).map_err(|e| format!("bad utf8: {e}"))?.to_string()))
            }
            other => Err(format!("unknown value tag: {other}")),
        }
    }
}

/// Appends one cell as a `u64` tag plus an 8-byte (or section) payload;
/// see [`Reader::read_value`] for the tag layout.
pub fn write_value(buf: &mut Vec<u8>, value: &ndts_core::Value) {
    use ndts_core::Value;
    match value {
        Value::Null => buf.extend_from_slice(&0u64.to_ne_bytes()),
        Value::I16(v) => {
            buf.extend_from_slice(&1u64.to_ne_bytes());
            buf.extend_from_slice(&(*v as i64 as u64).to_ne_bytes());
        }
        Value::I32(v) => {
            buf.extend_from_slice(&2u64.to_ne_bytes());
            buf.extend_from_slice(&(*v as i64 as u64).to_ne_bytes());
        }
        Value::I64(v) => {
            buf.extend_from_slice(&3u64.to_ne_bytes());
            buf.extend_from_slice(&(*v as u64).to_ne_bytes());
        }
        Value::F64(v) => {
            buf.extend_from_slice(&4u64.to_ne_bytes());
            buf.extend_from_slice(&v.to_bits().to_ne_bytes());
        }
        Value::Str(s) => {
            buf.extend_from_slice(&5u64.to_ne_bytes());
            write_section(buf, s.as_bytes());
        }
    }
}

/// Encodes row-major cells: `row_count` (u64) then, for each row in order,
/// each cell via [`write_value`].
pub fn write_rows(buf: &mut Vec<u8>, rows: &[Vec<ndts_core::Value>]) {
    buf.extend_from_slice(&(rows.len() as u64).to_ne_bytes());
    for row in rows {
        for cell in row {
            write_value(buf, cell);
        }
    }
}

/// Inverse of [`write_rows`]; `col_count` must match the row width used to
/// encode (carried alongside, e.g. via the column-name array length).
pub fn read_rows(r: &mut Reader<'_>, col_count: usize) -> Result<Vec<Vec<ndts_core::Value>>, String> {
    let row_count = r.read_u64()? as usize;
    let mut rows = Vec::with_capacity(row_count);
    for _ in 0..row_count {
        let mut row = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            row.push(r.read_value()?);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Writes a `Schema` as newline-delimited `name:type` text in one section.
pub fn write_schema(buf: &mut Vec<u8>, schema: &ndts_core::Schema) {
    let mut text = String::new();
    for col in &schema.columns {
        text.push_str(&col.name);
        text.push(':');
        text.push_str(col.col_type.as_str());
        text.push('\n');
    }
    write_section(buf, text.as_bytes());
}

/// Inverse of [`write_schema`].
pub fn parse_schema(text: &str) -> Result<ndts_core::Schema, String> {
    use ndts_core::{ColumnDef, ColumnType, Schema};
    let mut columns = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, type_str) = line.split_once(':').ok_or_else(|| format!("bad schema line: {line}"))?;
        let col_type = match type_str {
            "i16" => ColumnType::I16,
            "i32" => ColumnType::I32,
            "i64" => ColumnType::I64,
            "f64" => ColumnType::F64,
            "string" => ColumnType::String,
            other => return Err(format!("unknown column type: {other}")),
        };
        columns.push(ColumnDef::new(name, col_type));
    }
    Ok(Schema::new(columns))
}
