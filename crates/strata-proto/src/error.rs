//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Not enough bytes to decode the next field.
    ///
    /// On the legacy family, which has no length framing, this doubles as
    /// the "frame incomplete, read more" signal; decoders must not consume
    /// anything before returning it.
    #[error("buffer too short: needed {needed} more bytes, {remaining} remaining")]
    BufferTooShort { needed: usize, remaining: usize },

    #[error("VarInt longer than 5 bytes")]
    VarIntTooLong,

    #[error("string length {length} outside limit {max}")]
    StringTooLong { length: i64, max: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("invalid UTF-16 in string field")]
    InvalidUtf16,

    #[error("unknown packet id {id:#04x} for {version}")]
    UnknownPacketId { id: i32, version: crate::version::ProtocolVersion },

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(crate::version::ProtocolVersion),

    #[error("invalid block face code {0}")]
    InvalidFace(u8),

    #[error("invalid dig status {0}")]
    InvalidDigStatus(u8),

    #[error("invalid handshake next-state {0}")]
    InvalidNextState(i32),

    #[error("unsupported item payload")]
    UnsupportedItemPayload,

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("malformed uuid string {0:?}")]
    InvalidUuid(String),

    #[error("chunk payload error: {0}")]
    ChunkPayload(String),
}
