use std::path::PathBuf;

use thiserror::Error;

/// Unified error taxonomy shared by every crate in the workspace. Each
/// variant is a *kind*, not a call site; the core never differentiates
/// errors more finely than this to its callers.
#[derive(Debug, Error)]
pub enum NdtsError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("out of bounds: index {index} >= length {len}")]
    OutOfBounds { index: usize, len: usize },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("buffer full: needed {needed}, capacity {capacity}")]
    BufferFull { needed: usize, capacity: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl NdtsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NdtsError::Io { path: path.into(), source }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        NdtsError::NotFound(what.into())
    }

    pub fn corrupt(what: impl Into<String>) -> Self {
        NdtsError::Corrupt(what.into())
    }

    pub fn syntax(what: impl Into<String>) -> Self {
        NdtsError::Syntax(what.into())
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        NdtsError::Unsupported(what.into())
    }

    pub fn type_mismatch(what: impl Into<String>) -> Self {
        NdtsError::TypeMismatch(what.into())
    }
}

impl From<ndts_codecs::CodecError> for NdtsError {
    fn from(e: ndts_codecs::CodecError) -> Self {
        match e {
            ndts_codecs::CodecError::BufferFull { needed, capacity } => {
                NdtsError::BufferFull { needed, capacity }
            }
            ndts_codecs::CodecError::Corrupt(msg) => NdtsError::Corrupt(msg),
            ndts_codecs::CodecError::Unsupported(msg) => NdtsError::Unsupported(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, NdtsError>;
