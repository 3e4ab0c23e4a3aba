//! Delta-of-delta compression for `i64` timestamp columns.
//!
//! The first timestamp is stored raw; the second as a zig-zag varint delta;
//! every later value as a zig-zag varint second difference. This is highly
//! compact whenever the inter-arrival time is close to constant, which is
//! the common case for exchange tick and K-line timestamps.

use crate::bitio::{read_varint, write_varint_capped, zigzag_decode, zigzag_encode};
use crate::error::{CodecError, Result};

fn default_capacity_bytes(count: usize) -> usize {
    8 + count.saturating_mul(10) + 8
}

pub fn encode(xs: &[i64]) -> Result<Vec<u8>> {
    encode_with_capacity(xs, default_capacity_bytes(xs.len()))
}

pub fn encode_with_capacity(xs: &[i64], capacity_bytes: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(capacity_bytes);
    if xs.is_empty() {
        return Ok(buf);
    }

    if buf.len() + 8 > capacity_bytes {
        return Err(CodecError::BufferFull { needed: 8, capacity: capacity_bytes });
    }
    buf.extend_from_slice(&xs[0].to_le_bytes());

    if xs.len() == 1 {
        return Ok(buf);
    }

    let delta_1 = xs[1].wrapping_sub(xs[0]);
    write_varint_capped(&mut buf, capacity_bytes, zigzag_encode(delta_1))?;

    let mut prev_ts = xs[1];
    let mut prev_delta = delta_1;
    for &ts in &xs[2..] {
        let delta = ts.wrapping_sub(prev_ts);
        let dd = delta.wrapping_sub(prev_delta);
        write_varint_capped(&mut buf, capacity_bytes, zigzag_encode(dd))?;
        prev_delta = delta;
        prev_ts = ts;
    }

    Ok(buf)
}

pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<i64>> {
    let mut out = Vec::with_capacity(count);
    if count == 0 {
        return Ok(out);
    }
    if bytes.len() < 8 {
        return Err(CodecError::Corrupt("delta stream too short for base timestamp".into()));
    }
    let ts0 = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
    out.push(ts0);
    if count == 1 {
        return Ok(out);
    }

    let mut pos = 8usize;
    let delta_1 = zigzag_decode(read_varint(bytes, &mut pos)?);
    let ts1 = ts0.wrapping_add(delta_1);
    out.push(ts1);

    let mut prev_ts = ts1;
    let mut prev_delta = delta_1;
    while out.len() < count {
        let dd = zigzag_decode(read_varint(bytes, &mut pos)?);
        let delta = prev_delta.wrapping_add(dd);
        let ts = prev_ts.wrapping_add(delta);
        out.push(ts);
        prev_delta = delta;
        prev_ts = ts;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_constant_step() {
        let start = 1_700_000_000_000i64;
        let xs: Vec<i64> = (0..10).map(|i| start + i * 1000).collect();
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_irregular_steps() {
        let xs = vec![1000i64, 1050, 1300, 1301, 1301, 5000, -20, i64::MAX, i64::MIN, 0];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_single_and_empty() {
        assert!(decode(&encode(&[]).unwrap(), 0).unwrap().is_empty());
        let xs = vec![42i64];
        assert_eq!(decode(&encode(&xs).unwrap(), 1).unwrap(), xs);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trip_arbitrary(xs in proptest::collection::vec(any::<i64>(), 2..200)) {
            let encoded = encode(&xs).unwrap();
            let decoded = decode(&encoded, xs.len()).unwrap();
            prop_assert_eq!(xs, decoded);
        }
    }
}
