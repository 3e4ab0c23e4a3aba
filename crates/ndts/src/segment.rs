//! The Segment Writer & Reader: an append-only segment file with a
//! self-describing header, per-column compressed blocks, CRC32, and
//! memory-mapped zero-copy reads for `raw` numeric columns.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ndts_codecs::{delta, gorilla, rle, Codec};
use ndts_core::{ColumnDef, ColumnType, NdtsError, Result, Schema, Value};

use crate::column::Column;
use crate::format::{self, SegmentHeader};
use crate::io::atomic_write;
use crate::table::Table;

/// Per-column codec assignment the writer was opened with (or read back
/// from an existing file's header on reopen).
pub type CodecMap = HashMap<String, Codec>;

fn width_of(t: ColumnType) -> usize {
    t.fixed_width().expect("segment columns are numeric-only")
}

fn encode_raw(col: &Column) -> Vec<u8> {
    let mut out = Vec::with_capacity(col.len() * width_of(col.column_type()));
    match col {
        Column::I16(_) => col.as_i16().unwrap().iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Column::I32(_) => col.as_i32().unwrap().iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Column::I64(_) => col.as_i64().unwrap().iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Column::F64(_) => col.as_f64().unwrap().iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
        Column::Str(_) => unreachable!("segment columns are numeric-only"),
    }
    out
}

fn decode_raw(bytes: &[u8], col_type: ColumnType, count: usize) -> Result<Vec<Value>> {
    let width = width_of(col_type);
    if bytes.len() < width * count {
        return Err(NdtsError::corrupt("raw column region truncated"));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let cell = &bytes[i * width..(i + 1) * width];
        out.push(match col_type {
            ColumnType::I16 => Value::I16(i16::from_le_bytes(cell.try_into().unwrap())),
            ColumnType::I32 => Value::I32(i32::from_le_bytes(cell.try_into().unwrap())),
            ColumnType::I64 => Value::I64(i64::from_le_bytes(cell.try_into().unwrap())),
            ColumnType::F64 => Value::F64(f64::from_le_bytes(cell.try_into().unwrap())),
            ColumnType::String => unreachable!(),
        });
    }
    Ok(out)
}

/// Frames one compressed batch block: `[u32 count][u32 comp_len][u32 crc32][payload]`.
fn frame_block(count: usize, payload: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(12 + payload.len());
    block.extend_from_slice(&(count as u32).to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block.extend_from_slice(&format::crc32_ieee(payload).to_le_bytes());
    block.extend_from_slice(payload);
    block
}

fn encode_compressed(col: &Column, codec: Codec) -> Result<Vec<u8>> {
    let payload = match (col, codec) {
        (Column::F64(_), Codec::Gorilla) => gorilla::encode(col.as_f64().unwrap())?,
        (Column::I64(_), Codec::Delta) => delta::encode(col.as_i64().unwrap())?,
        (Column::I16(_), Codec::Rle) => {
            rle::encode(&col.as_i16().unwrap().iter().map(|&v| v as i64).collect::<Vec<_>>())?
        }
        (Column::I32(_), Codec::Rle) => {
            rle::encode(&col.as_i32().unwrap().iter().map(|&v| v as i64).collect::<Vec<_>>())?
        }
        (Column::I64(_), Codec::Rle) => rle::encode(col.as_i64().unwrap())?,
        _ => {
            return Err(NdtsError::unsupported(format!(
                "codec {codec} is not valid for a {} column",
                col.column_type()
            )))
        }
    };
    Ok(frame_block(col.len(), &payload))
}

/// Reads consecutive framed blocks for a compressed column until the
/// accumulated row count reaches `row_count`, decoding and concatenating
/// each one in append order.
fn decode_compressed_region(
    bytes: &[u8],
    col_type: ColumnType,
    codec: Codec,
    row_count: usize,
) -> Result<(Vec<Value>, usize)> {
    let mut values = Vec::with_capacity(row_count);
    let mut offset = 0usize;
    while values.len() < row_count {
        if bytes.len() < offset + 12 {
            return Err(NdtsError::corrupt("truncated compressed block header"));
        }
        let count = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let comp_len = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
        let crc = u32::from_le_bytes(bytes[offset + 8..offset + 12].try_into().unwrap());
        let payload = bytes
            .get(offset + 12..offset + 12 + comp_len)
            .ok_or_else(|| NdtsError::corrupt("truncated compressed block payload"))?;
        if format::crc32_ieee(payload) != crc {
            return Err(NdtsError::corrupt("compressed block CRC mismatch"));
        }
        let decoded: Vec<Value> = match (col_type, codec) {
            (ColumnType::F64, Codec::Gorilla) => gorilla::decode(payload, count)?.into_iter().map(Value::F64).collect(),
            (ColumnType::I64, Codec::Delta) => delta::decode(payload, count)?.into_iter().map(Value::I64).collect(),
            (ColumnType::I64, Codec::Rle) => rle::decode(payload, count)?.into_iter().map(Value::I64).collect(),
            (ColumnType::I32, Codec::Rle) => {
                rle::decode(payload, count)?.into_iter().map(|v| Value::I32(v as i32)).collect()
            }
            (ColumnType::I16, Codec::Rle) => {
                rle::decode(payload, count)?.into_iter().map(|v| Value::I16(v as i16)).collect()
            }
            _ => return Err(NdtsError::corrupt("codec/type combination not decodable")),
        };
        values.extend(decoded);
        offset += 12 + comp_len;
    }
    if values.len() != row_count {
        return Err(NdtsError::corrupt("compressed blocks overran declared row count"));
    }
    Ok((values, offset))
}

fn region_len(bytes: &[u8], col_type: ColumnType, codec: Codec, row_count: usize) -> Result<usize> {
    match codec {
        Codec::Raw => {
            let needed = width_of(col_type) * row_count;
            if bytes.len() < needed {
                return Err(NdtsError::corrupt("raw column region truncated"));
            }
            Ok(needed)
        }
        _ => Ok(decode_compressed_region(bytes, col_type, codec, row_count)?.1),
    }
}

/// Splits the data section (everything after the padded header) into one
/// byte region per column, in declaration order, each region's length
/// already 8-byte-padded.
fn split_regions(data: &[u8], schema: &Schema, codecs: &CodecMap, row_count: usize) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(schema.columns.len());
    let mut offset = 0usize;
    for def in &schema.columns {
        let codec = codecs.get(&def.name).copied().unwrap_or(Codec::Raw);
        let region_bytes = data.get(offset..).ok_or_else(|| NdtsError::corrupt("segment truncated"))?;
        let len = region_len(region_bytes, def.col_type, codec, row_count)?;
        let padded = format::align8(len);
        let region = data
            .get(offset..offset + len)
            .ok_or_else(|| NdtsError::corrupt(format!("segment truncated in column {}", def.name)))?
            .to_vec();
        out.push(region);
        offset += padded;
    }
    Ok(out)
}

fn decode_all_regions(regions: &[Vec<u8>], schema: &Schema, codecs: &CodecMap, row_count: usize) -> Result<Table> {
    let mut table = Table::create(schema.clone(), row_count);
    let mut columns: Vec<Vec<Value>> = Vec::with_capacity(schema.columns.len());
    for (i, def) in schema.columns.iter().enumerate() {
        let codec = codecs.get(&def.name).copied().unwrap_or(Codec::Raw);
        let values = match codec {
            Codec::Raw => decode_raw(&regions[i], def.col_type, row_count)?,
            _ => decode_compressed_region(&regions[i], def.col_type, codec, row_count)?.0,
        };
        columns.push(values);
    }
    for row_idx in 0..row_count {
        let row: Vec<Value> = columns.iter().map(|c| c[row_idx].clone()).collect();
        table.append_row(&row);
    }
    Ok(table)
}

fn read_file_header(path: &Path, bytes: &[u8]) -> Result<(SegmentHeader, usize)> {
    if bytes.len() < 4 {
        return Err(NdtsError::corrupt("segment file too short for header length"));
    }
    let header_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let header_bytes = bytes
        .get(4..4 + header_len)
        .ok_or_else(|| NdtsError::corrupt("segment file too short for declared header"))?;
    let header: SegmentHeader =
        serde_json::from_slice(header_bytes).map_err(|e| NdtsError::corrupt(format!("invalid header JSON in {}: {e}", path.display())))?;
    if header.version != format::FORMAT_VERSION {
        return Err(NdtsError::corrupt(format!("unsupported segment version {}", header.version)));
    }
    let data_offset = format::align8(4 + header_len);
    Ok((header, data_offset))
}

fn codec_map_from_header(header: &SegmentHeader) -> CodecMap {
    let mut map = CodecMap::new();
    if let Some(codecs) = &header.codecs {
        for (name, id) in codecs {
            if let Ok(codec) = Codec::parse(id) {
                map.insert(name.clone(), codec);
            }
        }
    }
    map
}

/// Append-only segment writer. Every `append()` rewrites the file
/// atomically; previously written column bytes are copied through
/// unchanged rather than re-encoded, matching the "existing blocks are not
/// rewritten" contract at the value level.
pub struct SegmentWriter {
    path: PathBuf,
    schema: Schema,
    codecs: CodecMap,
    regions: Vec<Vec<u8>>,
    row_count: u64,
}

impl SegmentWriter {
    pub fn open(path: impl Into<PathBuf>, schema: Schema, codecs: CodecMap) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let regions = vec![Vec::new(); schema.columns.len()];
            return Ok(SegmentWriter { path, schema, codecs, regions, row_count: 0 });
        }

        let bytes = fs::read(&path).map_err(|e| NdtsError::io(&path, e))?;
        let (header, data_offset) = read_file_header(&path, &bytes)?;
        let existing_schema = header.to_schema()?;
        if existing_schema.columns.iter().map(|c| (&c.name, c.col_type)).ne(schema.columns.iter().map(|c| (&c.name, c.col_type)))
        {
            return Err(NdtsError::corrupt("reopened segment schema does not match"));
        }
        let existing_codecs = codec_map_from_header(&header);
        let merged_codecs = if codecs.is_empty() { existing_codecs } else { codecs };
        let regions = split_regions(&bytes[data_offset..], &schema, &merged_codecs, header.row_count as usize)?;
        Ok(SegmentWriter { path, schema, codecs: merged_codecs, regions, row_count: header.row_count })
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Encodes `rows` against the schema and appends the result to each
    /// column's on-disk region, then atomically rewrites the file.
    pub fn append(&mut self, rows: &[Vec<Value>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut batch = Table::create(self.schema.clone(), rows.len());
        batch.append_batch(rows);

        for (i, def) in self.schema.columns.iter().enumerate() {
            let col = batch.column(&def.name)?;
            let codec = self.codecs.get(&def.name).copied().unwrap_or(Codec::Raw);
            let new_bytes = match codec {
                Codec::Raw => encode_raw(col),
                _ => encode_compressed(col, codec)?,
            };
            self.regions[i].extend_from_slice(&new_bytes);
        }
        self.row_count += rows.len() as u64;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let codecs_out: HashMap<String, String> = self
            .codecs
            .iter()
            .filter(|(_, c)| **c != Codec::Raw)
            .map(|(name, c)| (name.clone(), c.as_str().to_string()))
            .collect();
        let header = SegmentHeader::from_schema(
            &self.schema,
            self.row_count,
            if codecs_out.is_empty() { None } else { Some(codecs_out) },
        );
        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| NdtsError::Invariant(format!("header serialization failed: {e}")))?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.resize(format::align8(buf.len()), 0);

        for region in &self.regions {
            buf.extend_from_slice(region);
            buf.resize(format::align8(buf.len()), 0);
        }

        atomic_write(&self.path, &buf)
    }

    /// Flushes pending bytes. `append()` already flushes after every call,
    /// so this is idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.flush()
    }

    pub fn read_header(path: &Path) -> Result<SegmentHeader> {
        let bytes = fs::read(path).map_err(|e| NdtsError::io(path, e))?;
        Ok(read_file_header(path, &bytes)?.0)
    }

    /// Decodes the full segment (all columns, all batches reassembled in
    /// append order) into an owned `Table`.
    pub fn read_all(path: &Path) -> Result<Table> {
        let bytes = fs::read(path).map_err(|e| NdtsError::io(path, e))?;
        let (header, data_offset) = read_file_header(path, &bytes)?;
        let schema = header.to_schema()?;
        let codecs = codec_map_from_header(&header);
        let regions = split_regions(&bytes[data_offset..], &schema, &codecs, header.row_count as usize)?;
        decode_all_regions(&regions, &schema, &codecs, header.row_count as usize)
    }
}

/// A borrowed-or-owned typed column view returned by [`SegmentReader::column`].
/// `raw`-codec numeric columns borrow straight from the mapping; compressed
/// codecs decode into an owned array.
pub enum ColumnView<'a> {
    I16Borrowed(&'a [i16]),
    I16Owned(Vec<i16>),
    I32Borrowed(&'a [i32]),
    I32Owned(Vec<i32>),
    I64Borrowed(&'a [i64]),
    I64Owned(Vec<i64>),
    F64Borrowed(&'a [f64]),
    F64Owned(Vec<f64>),
}

impl ColumnView<'_> {
    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            ColumnView::I64Borrowed(s) => Some(s),
            ColumnView::I64Owned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            ColumnView::F64Borrowed(s) => Some(s),
            ColumnView::F64Owned(v) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnView::I16Borrowed(s) => s.len(),
            ColumnView::I16Owned(v) => v.len(),
            ColumnView::I32Borrowed(s) => s.len(),
            ColumnView::I32Owned(v) => v.len(),
            ColumnView::I64Borrowed(s) => s.len(),
            ColumnView::I64Owned(v) => v.len(),
            ColumnView::F64Borrowed(s) => s.len(),
            ColumnView::F64Owned(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory-mapped, read-only segment reader. On open, magic/version/CRC are
/// validated; mismatches fail with `Corrupt`.
pub struct SegmentReader {
    mmap: Mmap,
    schema: Schema,
    codecs: CodecMap,
    row_count: usize,
    /// (start offset into `mmap`, byte length) per column, in schema order.
    column_spans: Vec<(usize, usize)>,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| NdtsError::io(path, e))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| NdtsError::io(path, e))?;
        let (header, data_offset) = read_file_header(path, &mmap)?;
        let schema = header.to_schema()?;
        let codecs = codec_map_from_header(&header);
        let row_count = header.row_count as usize;

        let mut column_spans = Vec::with_capacity(schema.columns.len());
        let mut offset = data_offset;
        for def in &schema.columns {
            let codec = codecs.get(&def.name).copied().unwrap_or(Codec::Raw);
            let len = region_len(&mmap[offset..], def.col_type, codec, row_count)?;
            column_spans.push((offset, len));
            offset += format::align8(len);
        }

        Ok(SegmentReader { mmap, schema, codecs, row_count, column_spans })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column(&self, name: &str) -> Result<ColumnView<'_>> {
        let idx = self.schema.index_of(name).ok_or_else(|| NdtsError::not_found(format!("column {name}")))?;
        let def: &ColumnDef = &self.schema.columns[idx];
        let (offset, len) = self.column_spans[idx];
        let bytes = &self.mmap[offset..offset + len];
        let codec = self.codecs.get(&def.name).copied().unwrap_or(Codec::Raw);

        if codec == Codec::Raw {
            return Ok(match def.col_type {
                ColumnType::I16 => ColumnView::I16Borrowed(cast_slice_i16(bytes)?),
                ColumnType::I32 => ColumnView::I32Borrowed(cast_slice_i32(bytes)?),
                ColumnType::I64 => ColumnView::I64Borrowed(cast_slice_i64(bytes)?),
                ColumnType::F64 => ColumnView::F64Borrowed(cast_slice_f64(bytes)?),
                ColumnType::String => return Err(NdtsError::unsupported("string segment columns")),
            });
        }

        let (values, _) = decode_compressed_region(bytes, def.col_type, codec, self.row_count)?;
        Ok(match def.col_type {
            ColumnType::I16 => ColumnView::I16Owned(values.into_iter().map(|v| if let Value::I16(x) = v { x } else { 0 }).collect()),
            ColumnType::I32 => ColumnView::I32Owned(values.into_iter().map(|v| if let Value::I32(x) = v { x } else { 0 }).collect()),
            ColumnType::I64 => ColumnView::I64Owned(values.into_iter().map(|v| if let Value::I64(x) = v { x } else { 0 }).collect()),
            ColumnType::F64 => ColumnView::F64Owned(values.into_iter().map(|v| if let Value::F64(x) = v { x } else { 0.0 }).collect()),
            ColumnType::String => return Err(NdtsError::unsupported("string segment columns")),
        })
    }
}

fn cast_slice_i16(bytes: &[u8]) -> Result<&[i16]> {
    use zerocopy::FromBytes;
    <[i16]>::ref_from_bytes(bytes).map_err(|_| NdtsError::corrupt("misaligned i16 column"))
}
fn cast_slice_i32(bytes: &[u8]) -> Result<&[i32]> {
    use zerocopy::FromBytes;
    <[i32]>::ref_from_bytes(bytes).map_err(|_| NdtsError::corrupt("misaligned i32 column"))
}
fn cast_slice_i64(bytes: &[u8]) -> Result<&[i64]> {
    use zerocopy::FromBytes;
    <[i64]>::ref_from_bytes(bytes).map_err(|_| NdtsError::corrupt("misaligned i64 column"))
}
fn cast_slice_f64(bytes: &[u8]) -> Result<&[f64]> {
    use zerocopy::FromBytes;
    <[f64]>::ref_from_bytes(bytes).map_err(|_| NdtsError::corrupt("misaligned f64 column"))
}
