//! OPP Gen2 protocol error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid record length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("CRC mismatch: expected {expected:#04x}, got {actual:#04x}")]
    CrcMismatch { expected: u8, actual: u8 },

    #[error("Not a Gen2 address byte: {0:#04x}")]
    NotGen2Address(u8),

    #[error("Unexpected command: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedCommand { expected: u8, actual: u8 },

    #[error("Message is missing its end-of-message terminator")]
    MissingTerminator,

    #[error("Byte range {offset}+{len} is out of bounds for a {actual}-byte message")]
    OutOfRange {
        offset: usize,
        len: usize,
        actual: usize,
    },

    #[error("Recycle factor {0} exceeds the maximum of 7")]
    InvalidRecycleFactor(u8),

    #[error("Hold may not be 0 for a driver that stays enabled")]
    ZeroHold,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
