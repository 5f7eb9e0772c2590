mod wire;
mod message;
mod codec;

pub use wire::{WireType, encode_varint, decode_varint, field_tag};
pub use message::{TaskRequest, SubmitProofRequest, NodeTelemetry};
pub use codec::decode_task_response;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Field {field} is {len} bytes, single-byte length prefix allows at most {max}")]
    FieldTooLong { field: u32, len: usize, max: usize },

    #[error("Truncated varint at offset {0}")]
    TruncatedVarint(usize),

    #[error("Varint at offset {0} exceeds 64 bits")]
    VarintOverflow(usize),

    #[error("Missing length prefix at offset {0}")]
    TruncatedLength(usize),

    #[error("Length prefix at offset {0} uses a multi-byte varint")]
    MultiByteLength(usize),

    #[error("Field at offset {offset} declares {declared} bytes, only {remaining} remain")]
    LengthOverrun {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("Unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType { wire_type: u8, offset: usize },

    #[error("Field {0} is not valid UTF-8")]
    InvalidUtf8(u32),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Largest length expressible in a single-byte length prefix
pub const MAX_SINGLE_BYTE_LEN: usize = 0x7F;
