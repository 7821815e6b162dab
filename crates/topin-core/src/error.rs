//! Error types for the protocol engine.

use thiserror::Error;
use topin_proto::{DecodeError, FrameError};

/// Errors the engine can raise while driving a single connection.
///
/// Every variant other than [`EngineError::UnknownOpcode`] is fatal for the
/// connection: the caller should transition the session to `Closing` and
/// release the socket.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The frame codec rejected the byte stream.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A payload decoder rejected the frame's body.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An opcode outside the closed registry was received.
    ///
    /// Not fatal — the caller logs the raw bytes and keeps the session
    /// `Active`. Kept as an error variant (rather than silently swallowed)
    /// so callers can log it.
    #[error("unknown opcode {0:#04X}")]
    UnknownOpcode(u8),

    /// A [`crate::engine::ReplyWriter`] failed to write a reply to the
    /// transport.
    #[error("write error: {0}")]
    Write(String),
}

impl EngineError {
    /// `true` if this error should close the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownOpcode(_))
    }
}
