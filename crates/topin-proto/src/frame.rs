//! Frame codec: `0x78 0x78 | length | opcode | payload | 0x0D 0x0A`.
//!
//! Framing is marker-delimited, not fixed-header: the only way to know where
//! a frame ends is to read the length byte and then expect a trailer right
//! after it. [`FrameDecoder`] buffers partial reads across TCP boundaries and
//! discards bytes until it resynchronises on a start marker.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Start-of-frame marker, repeated twice on the wire.
pub const START_MARKER: u8 = 0x78;
/// Two-byte end-of-frame trailer.
pub const STOP_MARKER: [u8; 2] = [0x0D, 0x0A];

/// How the outbound length byte `L` is derived from the reply body.
///
/// The device firmware has inconsistent expectations across opcodes; rather
/// than scatter conditionals through the response builder, every reply
/// chooses exactly one of these up front (see design notes: "length-field
/// quirks").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    /// `L = opcode(1) + payload.len()`.
    Default,
    /// `Default`, minus 6: the payload carries a 6-byte device timestamp the
    /// firmware doesn't count.
    IgnoreDatetime,
    /// `Default`, minus 1: the payload embeds a `,` (`0x2C`) separator the
    /// firmware doesn't count.
    IgnoreSeparator,
    /// `L` is set verbatim, ignoring the body entirely.
    ForceLength(u8),
}

impl LengthPolicy {
    fn resolve(self, opcode: u8, payload: &[u8]) -> u8 {
        let default = 1usize.saturating_add(payload.len());
        #[allow(clippy::cast_possible_truncation)]
        match self {
            Self::Default => default.min(u8::MAX as usize) as u8,
            Self::IgnoreDatetime => default.saturating_sub(6).min(u8::MAX as usize) as u8,
            Self::IgnoreSeparator => default.saturating_sub(1).min(u8::MAX as usize) as u8,
            Self::ForceLength(v) => {
                let _ = opcode;
                v
            },
        }
    }
}

/// A decoded or to-be-encoded protocol frame, stripped of markers and the
/// length byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw opcode byte. Kept raw (not the symbolic [`crate::Opcode`]) so
    /// unknown opcodes still round-trip through the codec.
    pub opcode: u8,
    /// Payload bytes following the opcode.
    pub payload: Bytes,
}

impl Frame {
    /// Encodes `(opcode, payload)` into a complete wire frame under `policy`.
    #[must_use]
    pub fn encode(opcode: u8, payload: &[u8], policy: LengthPolicy) -> Bytes {
        let length = policy.resolve(opcode, payload);
        let mut out = BytesMut::with_capacity(5 + payload.len());
        out.put_u8(START_MARKER);
        out.put_u8(START_MARKER);
        out.put_u8(length);
        out.put_u8(opcode);
        out.put_slice(payload);
        out.put_slice(&STOP_MARKER);
        out.freeze()
    }

    /// The hex string of `opcode ‖ payload`, for the raw info-log column.
    #[must_use]
    pub fn hex_body(&self) -> String {
        let mut s = String::with_capacity(2 + self.payload.len() * 2);
        s.push_str(&format!("{:02X}", self.opcode));
        for byte in &self.payload {
            s.push_str(&format!("{byte:02X}"));
        }
        s
    }
}

/// Buffers a byte stream and yields whole [`Frame`]s as they become
/// available, tolerating partial TCP reads and garbage preceding a start
/// marker.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: BytesMut::new() }
    }

    /// Appends freshly-read bytes to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to pull one complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't yet contain a whole frame
    /// (the caller should read more bytes and call again). Returns
    /// `Err(FrameError)` if a start marker was found but what follows it
    /// cannot be a valid frame; the caller should close the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(start) = find_start_marker(&self.buffer) else {
            // No marker at all: drop everything except a possible
            // trailing lone 0x78 that might be the first half of one.
            let keep = usize::from(self.buffer.last() == Some(&START_MARKER));
            let drop_to = self.buffer.len().saturating_sub(keep);
            self.buffer.advance(drop_to);
            return Ok(None);
        };
        if start > 0 {
            self.buffer.advance(start);
        }

        // Need start(2) + length(1) at minimum to proceed.
        if self.buffer.len() < 3 {
            return Ok(None);
        }
        let declared_len = self.buffer[2];
        if declared_len == 0 {
            self.buffer.advance(3);
            return Err(FrameError::EmptyBody);
        }
        let body_len = declared_len as usize;
        let total = 3 + body_len + 2;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let trailer: [u8; 2] = [self.buffer[3 + body_len], self.buffer[3 + body_len + 1]];
        if trailer != STOP_MARKER {
            return Err(FrameError::BadTrailer { declared_len, found: trailer });
        }

        let mut frame_bytes = self.buffer.split_to(total);
        frame_bytes.advance(3);
        frame_bytes.truncate(body_len);
        let opcode = frame_bytes[0];
        let payload = frame_bytes.slice(1..);
        Ok(Some(Frame { opcode, payload }))
    }
}

fn find_start_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == [START_MARKER, START_MARKER])
}
