//! Run-length encoding for low-cardinality `i64` columns (symbol ids, flags,
//! partition keys). Emits `(value, run_length)` pairs, both zig-zag/varint
//! coded. Lossless for any input; only a space win when runs are long, so
//! callers pick this codec based on observed cardinality rather than type.

use crate::bitio::{read_varint, write_varint_capped, zigzag_decode, zigzag_encode};
use crate::error::{CodecError, Result};

fn default_capacity_bytes(count: usize) -> usize {
    4 + count.saturating_mul(20) + 8
}

pub fn encode(xs: &[i64]) -> Result<Vec<u8>> {
    encode_with_capacity(xs, default_capacity_bytes(xs.len()))
}

pub fn encode_with_capacity(xs: &[i64], capacity_bytes: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(capacity_bytes);
    let mut i = 0usize;
    while i < xs.len() {
        let value = xs[i];
        let mut run_len: u64 = 1;
        let mut j = i + 1;
        while j < xs.len() && xs[j] == value {
            run_len += 1;
            j += 1;
        }
        write_varint_capped(&mut buf, capacity_bytes, zigzag_encode(value))?;
        write_varint_capped(&mut buf, capacity_bytes, run_len)?;
        i = j;
    }
    Ok(buf)
}

pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity(count);
    let mut pos = 0usize;
    while out.len() < count {
        if pos >= bytes.len() {
            return Err(CodecError::Corrupt("rle stream ended before row count reached".into()));
        }
        let value = zigzag_decode(read_varint(bytes, &mut pos)?);
        let run_len = read_varint(bytes, &mut pos)?;
        if run_len == 0 {
            return Err(CodecError::Corrupt("rle run length of zero".into()));
        }
        for _ in 0..run_len {
            out.push(value);
        }
    }
    if out.len() != count {
        return Err(CodecError::Corrupt(format!(
            "rle stream produced {} rows, expected {count}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_long_runs() {
        let xs = [vec![1i64; 100], vec![2i64; 50], vec![1i64; 25]].concat();
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
        assert!(encoded.len() < xs.len() * 8);
    }

    #[test]
    fn round_trip_no_runs() {
        let xs: Vec<i64> = (0..50).collect();
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_empty_and_single() {
        assert!(decode(&encode(&[]).unwrap(), 0).unwrap().is_empty());
        let xs = vec![-7i64];
        assert_eq!(decode(&encode(&xs).unwrap(), 1).unwrap(), xs);
    }

    #[test]
    fn corrupt_row_count_mismatch_is_detected() {
        let xs = vec![1i64, 1, 1];
        let encoded = encode(&xs).unwrap();
        assert!(decode(&encoded, 2).is_err());
    }
}
