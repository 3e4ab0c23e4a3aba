//! Segment file layout shared by the Columnar Table's binary persistence
//! and the Segment Writer/Reader: a length-prefixed JSON header followed by
//! per-column blocks, 8-byte aligned for zero-copy reinterpretation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use ndts_core::{ColumnDef, Schema};

pub const FORMAT_VERSION: u32 = 1;

/// The self-describing metadata block written at offset 0, length-prefixed
/// by a `u32` byte count. Mirrors the teacher's own small text-sidecar
/// convention (`.schema`), but as JSON per spec rather than `name:type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub version: u32,
    #[serde(rename = "rowCount")]
    pub row_count: u64,
    pub columns: Vec<HeaderColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codecs: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
}

impl SegmentHeader {
    pub fn from_schema(schema: &Schema, row_count: u64, codecs: Option<HashMap<String, String>>) -> Self {
        SegmentHeader {
            version: FORMAT_VERSION,
            row_count,
            columns: schema
                .columns
                .iter()
                .map(|c| HeaderColumn { name: c.name.clone(), col_type: c.col_type.as_str().to_string() })
                .collect(),
            codecs,
        }
    }

    pub fn to_schema(&self) -> ndts_core::Result<Schema> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            let col_type = match c.col_type.as_str() {
                "i16" => ndts_core::ColumnType::I16,
                "i32" => ndts_core::ColumnType::I32,
                "i64" => ndts_core::ColumnType::I64,
                "f64" => ndts_core::ColumnType::F64,
                "string" => ndts_core::ColumnType::String,
                other => return Err(ndts_core::NdtsError::corrupt(format!("unknown column type {other}"))),
            };
            columns.push(ColumnDef::new(c.name.clone(), col_type));
        }
        Ok(Schema::new(columns))
    }
}

/// Pads `len` up to the next multiple of 8.
pub fn align8(len: usize) -> usize {
    len.div_ceil(8) * 8
}

const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

/// CRC32, IEEE variant (polynomial `0xEDB8_8320`, init `0xFFFF_FFFF`, final
/// XOR `0xFFFF_FFFF`) — the same variant zlib/gzip use.
pub struct Crc32(u32);

impl Crc32 {
    pub fn new() -> Self {
        Crc32(0xFFFF_FFFF)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let idx = ((self.0 ^ b as u32) & 0xFF) as usize;
            self.0 = CRC32_TABLE[idx] ^ (self.0 >> 8);
        }
    }

    pub fn finalize(self) -> u32 {
        self.0 ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Crc32::new()
    }
}

pub fn crc32_ieee(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(bytes);
    crc.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_matches_known_vector() {
        // Standard "123456789" check value for CRC-32/ISO-HDLC (zlib).
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }
}
