//! Column compression codecs: bit-level I/O primitives plus the four
//! concrete schemes a segment column may be encoded with.

pub mod bitio;
pub mod delta;
pub mod error;
pub mod gorilla;
pub mod rle;

pub use error::{CodecError, Result};

/// Codec identifiers as they appear in a segment column header.
pub const CODEC_RAW: &str = "raw";
pub const CODEC_GORILLA: &str = "gorilla";
pub const CODEC_DELTA: &str = "delta";
pub const CODEC_RLE: &str = "rle";

/// Which compression scheme a column segment was written with.
///
/// `Raw` columns carry their native little-endian bytes uninterpreted;
/// the other three dispatch to the matching module in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Raw,
    Gorilla,
    Delta,
    Rle,
}

impl Codec {
    pub fn as_str(self) -> &'static str {
        match self {
            Codec::Raw => CODEC_RAW,
            Codec::Gorilla => CODEC_GORILLA,
            Codec::Delta => CODEC_DELTA,
            Codec::Rle => CODEC_RLE,
        }
    }

    pub fn parse(s: &str) -> Result<Codec> {
        match s {
            CODEC_RAW => Ok(Codec::Raw),
            CODEC_GORILLA => Ok(Codec::Gorilla),
            CODEC_DELTA => Ok(Codec::Delta),
            CODEC_RLE => Ok(Codec::Rle),
            other => Err(CodecError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_id_round_trips() {
        for c in [Codec::Raw, Codec::Gorilla, Codec::Delta, Codec::Rle] {
            assert_eq!(Codec::parse(c.as_str()).unwrap(), c);
        }
    }

    #[test]
    fn unknown_codec_id_is_unsupported() {
        assert!(matches!(Codec::parse("lz4"), Err(CodecError::Unsupported(_))));
    }
}
