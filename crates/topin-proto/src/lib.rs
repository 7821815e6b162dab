//! Wire-level codec for the TOPIN tracker protocol.
//!
//! A frame is `0x78 0x78 | length | opcode | payload | 0x0D 0x0A`. This
//! crate owns byte-level concerns only: finding frame boundaries in a byte
//! stream ([`frame`]), decoding each opcode's payload into a typed value
//! ([`payloads`]), the closed opcode registry ([`opcode`]), and composing
//! reply bodies under the per-opcode length policy ([`response`]). Session
//! state and the dispatch loop live one layer up, in `topin-core`.

pub mod error;
pub mod frame;
pub mod opcode;
pub mod payloads;
pub mod response;

pub use error::{DecodeError, FrameError};
pub use frame::{Frame, FrameDecoder, LengthPolicy};
pub use opcode::Opcode;
pub use response::Reply;
