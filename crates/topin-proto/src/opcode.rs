//! The closed set of opcodes this server understands.

/// Symbolic name for a protocol opcode byte.
///
/// Unknown bytes decode to `None` via [`Opcode::from_byte`] rather than an
/// error — the engine logs and ignores them instead of closing the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Login,
    Supervision,
    Heartbeat,
    GpsPositioning,
    GpsOfflinePositioning,
    Status,
    Hibernation,
    Reset,
    WhitelistTotal,
    WifiOfflinePositioning,
    Time,
    StopAlarm,
    Setup,
    SynchronousWhitelist,
    RestorePassword,
    WifiPositioning,
    ManualPositioning,
    BatteryCharge,
    ChargerConnected,
    ChargerDisconnected,
    VibrationReceived,
    PositionUploadInterval,
}

impl Opcode {
    /// Maps a wire opcode byte to its symbolic name.
    ///
    /// Returns `None` for any byte outside the closed registry, including
    /// the disputed `0x43` (see design notes: treated as unknown pending a
    /// device trace).
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Login),
            0x05 => Some(Self::Supervision),
            0x08 => Some(Self::Heartbeat),
            0x10 => Some(Self::GpsPositioning),
            0x11 => Some(Self::GpsOfflinePositioning),
            0x13 => Some(Self::Status),
            0x14 => Some(Self::Hibernation),
            0x15 => Some(Self::Reset),
            0x16 => Some(Self::WhitelistTotal),
            0x17 => Some(Self::WifiOfflinePositioning),
            0x30 => Some(Self::Time),
            0x56 => Some(Self::StopAlarm),
            0x57 => Some(Self::Setup),
            0x58 => Some(Self::SynchronousWhitelist),
            0x67 => Some(Self::RestorePassword),
            0x69 => Some(Self::WifiPositioning),
            0x80 => Some(Self::ManualPositioning),
            0x81 => Some(Self::BatteryCharge),
            0x82 => Some(Self::ChargerConnected),
            0x83 => Some(Self::ChargerDisconnected),
            0x94 => Some(Self::VibrationReceived),
            0x98 => Some(Self::PositionUploadInterval),
            _ => None,
        }
    }

    /// Maps a symbolic opcode back to its wire byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Login => 0x01,
            Self::Supervision => 0x05,
            Self::Heartbeat => 0x08,
            Self::GpsPositioning => 0x10,
            Self::GpsOfflinePositioning => 0x11,
            Self::Status => 0x13,
            Self::Hibernation => 0x14,
            Self::Reset => 0x15,
            Self::WhitelistTotal => 0x16,
            Self::WifiOfflinePositioning => 0x17,
            Self::Time => 0x30,
            Self::StopAlarm => 0x56,
            Self::Setup => 0x57,
            Self::SynchronousWhitelist => 0x58,
            Self::RestorePassword => 0x67,
            Self::WifiPositioning => 0x69,
            Self::ManualPositioning => 0x80,
            Self::BatteryCharge => 0x81,
            Self::ChargerConnected => 0x82,
            Self::ChargerDisconnected => 0x83,
            Self::VibrationReceived => 0x94,
            Self::PositionUploadInterval => 0x98,
        }
    }
}
