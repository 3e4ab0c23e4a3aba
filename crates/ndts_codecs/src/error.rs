use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encoder buffer full: needed {needed} bits, capacity {capacity} bits")]
    BufferFull { needed: usize, capacity: usize },
    #[error("corrupt codec stream: {0}")]
    Corrupt(String),
    #[error("unsupported codec identifier: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
