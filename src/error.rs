//! Error taxonomy for the MCAP reader/writer engine.

use thiserror::Error;

/// Every fallible operation in this crate returns this.
pub type McapResult<T> = Result<T, McapError>;

/// Errors that can occur while reading or writing an MCAP file.
///
/// Variants map onto the error taxonomy implementations are expected to share:
/// callers that only care about the coarse category can match on the outer
/// variant; the payload carries enough context (opcode, offset, id) for a
/// useful message.
#[derive(Error, Debug)]
pub enum McapError {
    #[error("not an MCAP file: bad magic bytes")]
    InvalidMagic,

    #[error("malformed record (opcode {opcode:#04x} at offset {offset}): {reason}")]
    MalformedRecord {
        opcode: u8,
        offset: u64,
        reason: String,
    },

    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("string field is not valid UTF-8")]
    StringEncoding(#[from] std::str::Utf8Error),

    #[error("message (sequence {0}) referenced unknown channel id {1}")]
    UnknownChannel(u32, u16),

    #[error("channel {0:?} referenced unknown schema id {1}")]
    UnknownSchema(String, u16),

    #[error("schema id 0 is reserved for \"no schema\" and cannot be registered")]
    InvalidSchemaId,

    #[error("inconsistent record (opcode {opcode:#04x}): {reason}")]
    InconsistentRecord { opcode: u8, reason: String },

    #[error("unsupported compression scheme {0:?}: no decompressor registered")]
    UnsupportedCompression(String),

    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch { expected: u32, computed: u32 },

    #[error("reached end of input before a Footer record and trailing magic were found")]
    TruncatedTail,

    #[error("file has no summary section; open it with a streaming reader instead")]
    NotIndexed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    UsageError(String),

    #[error("index entry points outside the file bounds")]
    BadIndex,

    #[error("too many schemas: ran out of 16-bit ids")]
    TooManySchemas,

    #[error("too many channels: ran out of 16-bit ids")]
    TooManyChannels,

    #[error("attachment write is not in progress")]
    AttachmentNotInProgress,

    #[error("attachment overflowed its declared length by {excess} bytes (declared {attachment_length})")]
    AttachmentTooLarge { excess: u64, attachment_length: u64 },

    #[error("attachment incomplete: expected {expected} bytes, wrote {current}")]
    AttachmentIncomplete { expected: u64, current: u64 },

    #[error("writer is closed and cannot accept further records")]
    WriterClosed,

    #[error("decompression failed: {0}")]
    DecompressionError(String),

    #[error("chunk buffer of {0} bytes is too large to allocate on this platform")]
    ChunkBufferTooLarge(u64),
}

impl McapError {
    /// Builds a [`McapError::MalformedRecord`] for a short or otherwise
    /// ill-formed record payload.
    pub(crate) fn malformed(opcode: u8, offset: u64, reason: impl Into<String>) -> Self {
        McapError::MalformedRecord {
            opcode,
            offset,
            reason: reason.into(),
        }
    }
}
