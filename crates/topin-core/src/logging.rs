//! Append-only evidence logging collaborator.
//!
//! Separate from the `tracing` diagnostic stack used for operator-facing
//! logs: these rows are the protocol's own audit trail (`§4.6`), one TSV
//! file for raw frame traffic and one for resolved positions.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::session::PositionRecord;

/// Direction of a raw frame relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to server.
    In,
    /// Server to device.
    Out,
}

impl Direction {
    /// `"IN"` / `"OUT"`, matching the log column literally.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

/// One raw-frame audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRecord {
    /// Wall-clock time the frame crossed the socket.
    pub timestamp: NaiveDateTime,
    /// Remote IP, as a display string.
    pub peer_ip: String,
    /// Device IMEI, or empty if not yet logged in.
    pub imei: String,
    /// Direction relative to the server.
    pub direction: Direction,
    /// Full frame body, uppercase hex, no separators.
    pub hex_payload: String,
}

/// Errors while appending a log row. Engine treats every sink failure as
/// non-fatal to the connection — logging must never take a device offline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("log sink write failed: {0}")]
pub struct LogSinkError(pub String);

/// Durable sink for the two audit logs. Implementations must serialize
/// concurrent writers internally (the engine calls this from one task per
/// connection).
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Appends one raw-frame row.
    async fn append_info(&self, record: &InfoRecord) -> Result<(), LogSinkError>;

    /// Appends one resolved-position row for the given device.
    async fn append_position(&self, peer_ip: &str, imei: &str, record: &PositionRecord) -> Result<(), LogSinkError>;
}

/// Discards every row. Useful for tests and for a degraded startup mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

#[async_trait]
impl LogSink for NullLogSink {
    async fn append_info(&self, _record: &InfoRecord) -> Result<(), LogSinkError> {
        Ok(())
    }

    async fn append_position(&self, _peer_ip: &str, _imei: &str, _record: &PositionRecord) -> Result<(), LogSinkError> {
        Ok(())
    }
}
