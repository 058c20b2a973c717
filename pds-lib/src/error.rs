use bytes::Bytes;
use std::io;
use thiserror::Error;

/// The primary error type for the `pds-lib` library.
///
/// None of these are fatal: whenever the assembler reports one it has already
/// dropped the partial reply and is back to idle.
#[derive(Error, Debug)]
pub enum PdsError {
    #[error("Malformed header: field `{field}` at offset {offset} is not a decimal integer")]
    MalformedHeader { field: &'static str, offset: usize },

    #[error("Unexpected reply prefix: {}", hex::encode(.0))]
    UnexpectedReplyPrefix(Bytes),

    #[error("Buffer overrun: reply needs {required} bytes, limit is {limit}")]
    BufferOverrun { required: usize, limit: usize },

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout waiting for reply: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}
