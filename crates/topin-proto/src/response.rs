//! Response builder: the only place that knows a reply's length policy.

use crate::frame::LengthPolicy;
use crate::opcode::Opcode;

/// A reply about to be handed to the frame codec: everything [`crate::Frame::encode`]
/// needs except the wire markers themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Opcode byte the reply is sent under.
    pub opcode: u8,
    /// Reply body.
    pub payload: Vec<u8>,
    /// Length-byte policy to apply when encoding.
    pub policy: LengthPolicy,
}

/// `content = 0x01`, default length. Login acknowledgement.
#[must_use]
pub fn login_ack() -> Reply {
    Reply { opcode: Opcode::Login.to_byte(), payload: vec![0x01], policy: LengthPolicy::Default }
}

/// 7-byte decimal-coded (BCD) server UTC time, default length.
#[must_use]
pub fn time_reply(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Reply {
    let to_bcd = |v: u8| ((v / 10) << 4) | (v % 10);
    let year_tens = u8::try_from(year / 100 % 100).unwrap_or(0);
    let year_ones = u8::try_from(year % 100).unwrap_or(0);
    let payload = vec![
        to_bcd(year_tens),
        to_bcd(year_ones),
        to_bcd(month),
        to_bcd(day),
        to_bcd(hour),
        to_bcd(minute),
        to_bcd(second),
    ];
    Reply { opcode: Opcode::Time.to_byte(), payload, policy: LengthPolicy::Default }
}

/// Echoes the device's 6-byte timestamp, `force_length_to(0)`. Used for
/// `gps_positioning`, `gps_offline_positioning`, and as stage 1 of both
/// `wifi_offline_positioning` and `wifi_positioning`.
#[must_use]
pub fn timestamp_echo(opcode: u8, device_timestamp: [u8; 6]) -> Reply {
    Reply { opcode, payload: device_timestamp.to_vec(), policy: LengthPolicy::ForceLength(0) }
}

/// Stage 2 of `wifi_positioning`: `"<±lat>,<±lng>"` as ASCII, `force_length_to(0)`.
///
/// `fix` is `None` when geolocation failed; both fields are then emitted as
/// empty strings, leaving a lone `,` separator byte.
#[must_use]
pub fn wifi_positioning_stage2(fix: Option<(f64, f64)>) -> Reply {
    let body = match fix {
        Some((lat, lng)) => format!("{}", SignedDegrees(lat)) + "," + &format!("{}", SignedDegrees(lng)),
        None => ",".to_string(),
    };
    Reply {
        opcode: Opcode::WifiPositioning.to_byte(),
        payload: body.into_bytes(),
        policy: LengthPolicy::ForceLength(0),
    }
}

struct SignedDegrees(f64);

impl std::fmt::Display for SignedDegrees {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0.0 { '-' } else { '+' };
        write!(f, "{sign}{:.6}", self.0.abs())
    }
}

/// Default setup values: every slot zeroed, no emergency numbers.
#[must_use]
pub fn setup_reply_defaults() -> Reply {
    let mut payload = Vec::with_capacity(2 + 1 + 9 + 1 + 9 + 1 + 2 + 2);
    payload.extend_from_slice(&[0x03, 0x00]); // upload interval
    payload.push(0x00); // binary switch
    payload.extend_from_slice(&[0x00; 9]); // 3 alarm slots, 3 bytes each
    payload.push(0x00); // DND switch
    payload.extend_from_slice(&[0x00; 9]); // 3 DND slots, 3 bytes each
    payload.push(0x00); // GPS-time switch
    payload.extend_from_slice(&[0x00, 0x00]); // GPS-time start
    payload.extend_from_slice(&[0x00, 0x00]); // GPS-time stop
    payload.push(0x3B);
    payload.push(0x3B);
    Reply { opcode: Opcode::Setup.to_byte(), payload, policy: LengthPolicy::Default }
}

/// Echoes the 2-byte new upload interval, default length.
#[must_use]
pub fn position_interval_ack(interval: [u8; 2]) -> Reply {
    Reply {
        opcode: Opcode::PositionUploadInterval.to_byte(),
        payload: interval.to_vec(),
        policy: LengthPolicy::Default,
    }
}

/// Generic echo: opcode, empty content, default length.
#[must_use]
pub fn generic_ack(opcode: u8) -> Reply {
    Reply { opcode, payload: Vec::new(), policy: LengthPolicy::Default }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn login_ack_matches_scenario() {
        let reply = login_ack();
        let wire = Frame::encode(reply.opcode, &reply.payload, reply.policy);
        assert_eq!(&wire[..], &[0x78, 0x78, 0x02, 0x01, 0x01, 0x0D, 0x0A]);
    }

    #[test]
    fn time_reply_matches_scenario() {
        let reply = time_reply(2024, 1, 15, 8, 30, 45);
        let wire = Frame::encode(reply.opcode, &reply.payload, reply.policy);
        assert_eq!(&wire[..], &[0x78, 0x78, 0x08, 0x30, 0x20, 0x24, 0x01, 0x15, 0x08, 0x30, 0x45, 0x0D, 0x0A]);
    }

    #[test]
    fn gps_ack_forces_zero_length() {
        let reply = timestamp_echo(Opcode::GpsPositioning.to_byte(), [0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D]);
        let wire = Frame::encode(reply.opcode, &reply.payload, reply.policy);
        assert_eq!(&wire[..], &[0x78, 0x78, 0x00, 0x10, 0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D, 0x0D, 0x0A]);
    }

    #[test]
    fn stage2_success_formats_signed_coordinates() {
        let reply = wifi_positioning_stage2(Some((48.8566, 2.3522)));
        assert_eq!(reply.payload, b"+48.856600,+2.352200");
        assert_eq!(reply.policy, LengthPolicy::ForceLength(0));
    }

    #[test]
    fn stage2_failure_is_bare_separator() {
        let reply = wifi_positioning_stage2(None);
        assert_eq!(reply.payload, b",");
    }

    #[test]
    fn stage2_negative_coordinates_get_minus_sign() {
        let reply = wifi_positioning_stage2(Some((-33.8688, -151.2093)));
        assert_eq!(reply.payload, b"-33.868800,-151.209300");
    }
}
