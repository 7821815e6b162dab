//! Per-connection protocol engine sitting on top of the wire codec.
//!
//! [`session`] owns per-connection state, [`geolocation`] and [`logging`]
//! define the collaborator traits the engine calls out to, [`engine`]
//! implements the opcode dispatch table, and [`error`] collects the error
//! types the engine can raise.

pub mod engine;
pub mod error;
pub mod geolocation;
pub mod logging;
pub mod session;

pub use engine::{Engine, ReplyWriter};
pub use error::EngineError;
pub use geolocation::{GeoFix, GeolocationError, Geolocator, NullGeolocator};
pub use logging::{Direction, InfoRecord, LogSink, LogSinkError, NullLogSink};
pub use session::{Carrier, PositionMethod, PositionRecord, RollingEvidence, Session, SessionState};
