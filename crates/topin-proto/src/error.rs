//! Error types for frame parsing and payload decoding.

use thiserror::Error;

/// Errors raised while splitting a byte stream into frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The two bytes following the declared-length body were not
    /// `0x0D 0x0A`.
    #[error("malformed trailer: expected 0x0D 0x0A after {declared_len} body bytes, found {found:02X?}")]
    BadTrailer {
        /// The length byte the frame declared.
        declared_len: u8,
        /// The two bytes actually found where the trailer was expected.
        found: [u8; 2],
    },

    /// A frame declared a body of zero length, which would leave no opcode
    /// byte at all.
    #[error("frame declares zero-length body (no room for an opcode byte)")]
    EmptyBody,
}

/// Errors raised while decoding a frame's payload into a typed value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload length did not match what the opcode requires.
    #[error("opcode {opcode:#04X} expects a payload of {expected}, got {actual} bytes")]
    WrongPayloadLength {
        /// Opcode whose decoder rejected the payload.
        opcode: u8,
        /// Human-readable expectation (e.g. "18 bytes" or "4 or 5 bytes").
        expected: &'static str,
        /// Bytes actually present.
        actual: usize,
    },
}
