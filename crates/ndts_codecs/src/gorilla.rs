//! Gorilla XOR compression for `f64` columns.
//!
//! The first value is stored as raw bits. Each subsequent value is XORed
//! against the previous one; a zero XOR costs a single bit, and a nonzero
//! XOR reuses the previous block's leading/trailing-zero window when it
//! still covers the new value, falling back to a fresh 6+6-bit window
//! descriptor otherwise. This mirrors the Facebook Gorilla paper's scheme.

use crate::bitio::{BitReader, BitWriter};
use crate::error::Result;

/// Worst case is ~1 (zero-xor control bit) ... or 1 + 1 + 6 + 6 + 64 bits for
/// a value that needs a brand new window every time. Round generously.
fn default_capacity_bytes(count: usize) -> usize {
    8 + count.saturating_mul(10) + 8
}

pub fn encode(xs: &[f64]) -> Result<Vec<u8>> {
    encode_with_capacity(xs, default_capacity_bytes(xs.len()))
}

pub fn encode_with_capacity(xs: &[f64], capacity_bytes: usize) -> Result<Vec<u8>> {
    let mut w = BitWriter::with_capacity_bytes(capacity_bytes);
    if xs.is_empty() {
        return Ok(w.finish());
    }

    w.write_bits(xs[0].to_bits(), 64)?;

    let mut prev_bits = xs[0].to_bits();
    let mut prev_leading: u32 = 64;
    let mut prev_trailing: u32 = 0;

    for &v in &xs[1..] {
        let bits = v.to_bits();
        let x = bits ^ prev_bits;
        if x == 0 {
            w.write_bit(false)?;
        } else {
            w.write_bit(true)?;
            let leading = x.leading_zeros();
            let trailing = x.trailing_zeros();
            if leading >= prev_leading && trailing >= prev_trailing {
                w.write_bit(false)?;
                let meaningful = 64 - prev_leading - prev_trailing;
                w.write_bits(x >> prev_trailing, meaningful as usize)?;
            } else {
                w.write_bit(true)?;
                w.write_bits(leading as u64, 6)?;
                let meaningful = 64 - leading - trailing;
                w.write_bits((meaningful - 1) as u64, 6)?;
                w.write_bits(x >> trailing, meaningful as usize)?;
                prev_leading = leading;
                prev_trailing = trailing;
            }
        }
        prev_bits = bits;
    }

    Ok(w.finish())
}

pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(count);
    if count == 0 {
        return Ok(out);
    }

    let mut r = BitReader::new(bytes);
    let first_bits = r.read_bits(64)?;
    out.push(f64::from_bits(first_bits));

    let mut prev_bits = first_bits;
    let mut prev_leading: u32 = 64;
    let mut prev_trailing: u32 = 0;

    while out.len() < count {
        let control = r.read_bit()?;
        if !control {
            out.push(f64::from_bits(prev_bits));
            continue;
        }
        let reuse_window = !r.read_bit()?;
        let (leading, trailing, meaningful) = if reuse_window {
            (prev_leading, prev_trailing, 64 - prev_leading - prev_trailing)
        } else {
            let leading = r.read_bits(6)? as u32;
            let meaningful = r.read_bits(6)? as u32 + 1;
            let trailing = 64 - leading - meaningful;
            prev_leading = leading;
            prev_trailing = trailing;
            (leading, trailing, meaningful)
        };
        let mid = r.read_bits(meaningful as usize)?;
        let x = mid << trailing;
        let bits = prev_bits ^ x;
        out.push(f64::from_bits(bits));
        prev_bits = bits;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_series() {
        let xs = vec![100.0, 100.5, 101.2, 100.8, 101.5];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_constant_series() {
        let xs = vec![42.0; 50];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_special_values_bit_exact() {
        let xs = vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0, -0.0, 1.0];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        for (a, b) in xs.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn round_trip_empty() {
        let xs: Vec<f64> = vec![];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn round_trip_single_value() {
        let xs = vec![3.14159];
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }

    #[test]
    fn round_trip_varying_windows() {
        let xs: Vec<f64> = (0..500)
            .map(|i| (i as f64 * 0.013).sin() * (i as f64))
            .collect();
        let encoded = encode(&xs).unwrap();
        let decoded = decode(&encoded, xs.len()).unwrap();
        assert_eq!(xs, decoded);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_f64_including_special() -> impl Strategy<Value = f64> {
        prop_oneof![
            any::<f64>(),
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(0.0),
            Just(-0.0),
        ]
    }

    proptest! {
        #[test]
        fn round_trip_is_bit_exact(xs in proptest::collection::vec(any_f64_including_special(), 0..200)) {
            let encoded = encode(&xs).unwrap();
            let decoded = decode(&encoded, xs.len()).unwrap();
            for (a, b) in xs.iter().zip(decoded.iter()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
        }
    }
}
