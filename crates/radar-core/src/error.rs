//! Error Types for the core primitives
//!
//! Only the binary decoding side can fail; encoding into a `BufMut` is
//! infallible. The timed cache is generic over the error type of the value
//! it computes and has no error type of its own.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Varint exceeds 64 bits")]
    VarintOverflow,

    #[error("Value {0} does not fit in an Avro int")]
    IntOverflow(i64),

    #[error("Negative length: {0}")]
    NegativeLength(i64),

    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(String),
}

pub type Result<T> = std::result::Result<T, Error>;
