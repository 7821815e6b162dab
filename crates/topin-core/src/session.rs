//! Per-connection session state.

use std::net::SocketAddr;

use topin_proto::payloads::{GsmCell, WifiAccessPoint};

/// Where a connection currently sits in the handshake/streaming lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No successful login yet; the only acceptable inbound opcode is `login`.
    AwaitingLogin,
    /// Logged in; accepting status/GPS/Wi-Fi/setup traffic.
    Active,
    /// Terminal: the socket is about to be released.
    Closing,
}

/// The most recently decoded evidence used for LBS/Wi-Fi geolocation,
/// reset before parsing every `0x17`/`0x69` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollingEvidence {
    /// Observed Wi-Fi access points from the most recent frame.
    pub wifi: Vec<WifiAccessPoint>,
    /// Observed GSM cell towers from the most recent frame.
    pub gsm_cells: Vec<GsmCell>,
    /// Carrier identity, if the frame carried one.
    pub carrier: Option<Carrier>,
}

/// Mobile carrier identity reported alongside GSM cell evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carrier {
    /// Mobile country code.
    pub mcc: u16,
    /// Mobile network code.
    pub mnc: u8,
}

/// `method` column of a position log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMethod {
    /// Decoded directly from a GPS fix.
    Gps,
    /// Derived from GSM cell evidence only.
    LbsGsm,
    /// Derived from a mix of GSM and Wi-Fi evidence.
    LbsGsmWifi,
    /// Generic LBS fallback (e.g. geolocation failed).
    Lbs,
}

/// One row that will be appended to the location log.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    /// How the position was obtained.
    pub method: PositionMethod,
    /// Local/device-reported or server-substituted timestamp.
    pub datetime_local: chrono::NaiveDateTime,
    /// `0` = invalid, `1` = valid, `2` = valid fix but clock unset.
    pub validity: u8,
    /// Satellite count, when known.
    pub nb_sat: Option<u8>,
    /// Decimal degrees, when known.
    pub latitude: Option<f64>,
    /// Decimal degrees, when known.
    pub longitude: Option<f64>,
    /// Estimated accuracy in metres, when known (LBS fixes only).
    pub accuracy: Option<f64>,
    /// Speed over ground, km/h, when known (GPS fixes only).
    pub speed_kmh: Option<u8>,
    /// Heading in degrees, when known (GPS fixes only).
    pub heading_degrees: Option<u16>,
}

/// Per-connection state, owned by the task driving that connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Remote address, fixed at accept time.
    pub peer_addr: SocketAddr,
    /// 15-digit device identity; set on login, immutable afterwards.
    pub imei: Option<String>,
    /// Firmware/software version reported at login.
    pub software_version: Option<u8>,
    /// Most recent decoded GPS position, if any.
    pub last_gps: Option<PositionRecord>,
    /// Wi-Fi/GSM evidence accumulated from the most recent LBS frame.
    pub rolling_evidence: RollingEvidence,
    /// Current lifecycle state.
    pub state: SessionState,
}

impl Session {
    /// Creates a freshly-accepted, unauthenticated session.
    #[must_use]
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            imei: None,
            software_version: None,
            last_gps: None,
            rolling_evidence: RollingEvidence::default(),
            state: SessionState::AwaitingLogin,
        }
    }

    /// `imei`, or an empty string if the session hasn't logged in yet —
    /// used for the info-log column, which must never be absent.
    #[must_use]
    pub fn imei_or_empty(&self) -> &str {
        self.imei.as_deref().unwrap_or("")
    }
}
