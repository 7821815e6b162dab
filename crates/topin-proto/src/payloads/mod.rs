//! Per-opcode payload decoders.
//!
//! Each decoder takes the frame's payload bytes (opcode already stripped)
//! and returns a typed value, or a [`DecodeError`] if the length doesn't
//! match what the opcode requires. Decoders never allocate more than the
//! payload itself requires and never panic on attacker-controlled input.

use crate::error::DecodeError;

/// Decoded login payload (opcode `0x01`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPayload {
    /// 15-digit device identity, BCD-decoded with the leading nibble dropped.
    pub imei: String,
    /// Firmware/software version byte, reported verbatim.
    pub software_version: u8,
}

/// Decodes an 8-byte BCD IMEI plus trailing software-version byte.
pub fn decode_login(payload: &[u8]) -> Result<LoginPayload, DecodeError> {
    if payload.len() != 9 {
        return Err(DecodeError::WrongPayloadLength {
            opcode: 0x01,
            expected: "9 bytes",
            actual: payload.len(),
        });
    }
    let mut digits = String::with_capacity(16);
    for byte in &payload[0..8] {
        digits.push_str(&format!("{:X}", byte >> 4));
        digits.push_str(&format!("{:X}", byte & 0x0F));
    }
    // First nibble is always 0 and is dropped, yielding a 15-digit IMEI.
    let imei = digits[1..].to_string();
    Ok(LoginPayload { imei, software_version: payload[8] })
}

/// Decoded status payload (opcode `0x13`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPayload {
    /// Battery level, device-defined scale.
    pub battery: u8,
    /// Firmware/software version byte.
    pub sw_version: u8,
    /// Status upload interval, device-defined units.
    pub status_upload_interval: u8,
    /// Signal strength, present on newer firmware only.
    pub signal_strength: Option<u8>,
}

/// Decodes a 4- or 5-byte status payload.
pub fn decode_status(payload: &[u8]) -> Result<StatusPayload, DecodeError> {
    match payload.len() {
        4 => Ok(StatusPayload {
            battery: payload[0],
            sw_version: payload[1],
            status_upload_interval: payload[2],
            signal_strength: None,
        }),
        5 => Ok(StatusPayload {
            battery: payload[0],
            sw_version: payload[1],
            status_upload_interval: payload[2],
            signal_strength: Some(payload[3]),
        }),
        actual => Err(DecodeError::WrongPayloadLength {
            opcode: 0x13,
            expected: "4 or 5 bytes",
            actual,
        }),
    }
}

/// Validates the (empty) payload of a time-sync request (opcode `0x30`).
pub fn decode_time(payload: &[u8]) -> Result<(), DecodeError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::WrongPayloadLength {
            opcode: 0x30,
            expected: "0 bytes",
            actual: payload.len(),
        })
    }
}

/// Decoded GPS fix (opcodes `0x10`, `0x11`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsPayload {
    /// Device-reported timestamp, raw wire bytes (see [`Self::timestamp_is_zero`]).
    pub device_timestamp: [u8; 6],
    /// Packet length indicator from the high nibble of byte 6; read but
    /// never validated, per design notes.
    pub length_indicator: u8,
    /// Satellite count from the low nibble of byte 6.
    pub satellite_count: u8,
    /// Decimal degrees, already sign-adjusted for hemisphere.
    pub latitude: f64,
    /// Decimal degrees, already sign-adjusted for hemisphere.
    pub longitude: f64,
    /// Speed over ground, km/h.
    pub speed_kmh: u8,
    /// Whether the device reports this fix as valid.
    pub position_valid: bool,
    /// Heading in degrees; values `>= 360` are passed through verbatim.
    pub heading_degrees: u16,
}

impl GpsPayload {
    /// `true` if the device's 6-byte timestamp is all zero, meaning the
    /// clock was not yet set when the fix was taken.
    #[must_use]
    pub fn timestamp_is_zero(&self) -> bool {
        self.device_timestamp == [0u8; 6]
    }

    /// Interprets the raw timestamp bytes as a `(year, month, day, hour,
    /// minute, second)` tuple, each byte read as a plain decimal integer
    /// (year is `2000 + byte`). This is the "hex-decimal" reading: the
    /// byte's numeric value *is* the field, not a BCD nibble pair.
    #[must_use]
    pub fn timestamp_fields(&self) -> (u16, u8, u8, u8, u8, u8) {
        let b = self.device_timestamp;
        (2000 + u16::from(b[0]), b[1], b[2], b[3], b[4], b[5])
    }
}

/// Decodes the fixed 18-byte GPS positioning payload.
pub fn decode_gps(payload: &[u8], opcode: u8) -> Result<GpsPayload, DecodeError> {
    if payload.len() != 18 {
        return Err(DecodeError::WrongPayloadLength { opcode, expected: "18 bytes", actual: payload.len() });
    }
    let mut device_timestamp = [0u8; 6];
    device_timestamp.copy_from_slice(&payload[0..6]);

    let length_indicator = payload[6] >> 4;
    let satellite_count = payload[6] & 0x0F;

    let lat_raw = u32::from_be_bytes([payload[7], payload[8], payload[9], payload[10]]);
    let lon_raw = u32::from_be_bytes([payload[11], payload[12], payload[13], payload[14]]);
    let scale = f64::from(30_000 * 60);
    let mut latitude = f64::from(lat_raw) / scale;
    let mut longitude = f64::from(lon_raw) / scale;

    let speed_kmh = payload[15];
    let flags = u16::from_be_bytes([payload[16], payload[17]]);
    let position_valid = flags & 0x1000 != 0;
    let west = flags & 0x0800 != 0;
    let south = flags & 0x0400 == 0;
    let heading_degrees = flags & 0x03FF;

    if west {
        longitude = -longitude;
    }
    if south {
        latitude = -latitude;
    }

    Ok(GpsPayload {
        device_timestamp,
        length_indicator,
        satellite_count,
        latitude,
        longitude,
        speed_kmh,
        position_valid,
        heading_degrees,
    })
}

/// A single observed Wi-Fi access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiAccessPoint {
    /// BSSID (MAC address), 6 bytes.
    pub bssid: [u8; 6],
    /// Signal strength, dBm (stored as a negative integer).
    pub rssi: i16,
}

/// A single observed GSM cell tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GsmCell {
    /// Location area code.
    pub lac: u16,
    /// Cell identifier.
    pub cid: u16,
    /// Signal strength, dBm (stored as a negative integer).
    pub rssi: i16,
}

/// Decoded Wi-Fi + LBS evidence (opcodes `0x17`, `0x69`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiLbsPayload {
    /// BCD-decoded timestamp, `(year, month, day, hour, minute, second)`.
    pub timestamp: (u16, u8, u8, u8, u8, u8),
    /// Observed access points.
    pub wifi: Vec<WifiAccessPoint>,
    /// Mobile country code.
    pub mcc: u16,
    /// Mobile network code.
    pub mnc: u8,
    /// Observed cell towers.
    pub gsm_cells: Vec<GsmCell>,
}

fn bcd_to_decimal(byte: u8) -> u8 {
    (byte >> 4).saturating_mul(10).saturating_add(byte & 0x0F)
}

/// Decodes the variable-length Wi-Fi/LBS evidence payload.
pub fn decode_wifi_lbs(payload: &[u8], opcode: u8) -> Result<WifiLbsPayload, DecodeError> {
    let too_short = || DecodeError::WrongPayloadLength {
        opcode,
        expected: "at least 1 + 6 + 1 + 3 bytes",
        actual: payload.len(),
    };

    let n_wifi = usize::from(*payload.first().ok_or_else(too_short)?);
    let timestamp_bytes = payload.get(1..7).ok_or_else(too_short)?;
    let timestamp = (
        2000 + u16::from(bcd_to_decimal(timestamp_bytes[0])),
        bcd_to_decimal(timestamp_bytes[1]),
        bcd_to_decimal(timestamp_bytes[2]),
        bcd_to_decimal(timestamp_bytes[3]),
        bcd_to_decimal(timestamp_bytes[4]),
        bcd_to_decimal(timestamp_bytes[5]),
    );

    let mut cursor = 7usize;
    let mut wifi = Vec::with_capacity(n_wifi);
    for _ in 0..n_wifi {
        let entry = payload.get(cursor..cursor + 7).ok_or_else(too_short)?;
        let mut bssid = [0u8; 6];
        bssid.copy_from_slice(&entry[0..6]);
        let rssi = -i16::from(entry[6]);
        wifi.push(WifiAccessPoint { bssid, rssi });
        cursor += 7;
    }

    let n_gsm = usize::from(*payload.get(cursor).ok_or_else(too_short)?);
    cursor += 1;
    let carrier = payload.get(cursor..cursor + 3).ok_or_else(too_short)?;
    let mcc = u16::from_be_bytes([carrier[0], carrier[1]]);
    let mnc = carrier[2];
    cursor += 3;

    let mut gsm_cells = Vec::with_capacity(n_gsm);
    for _ in 0..n_gsm {
        let entry = payload.get(cursor..cursor + 5).ok_or_else(too_short)?;
        let lac = u16::from_be_bytes([entry[0], entry[1]]);
        let cid = u16::from_be_bytes([entry[2], entry[3]]);
        let rssi = -i16::from(entry[4]);
        gsm_cells.push(GsmCell { lac, cid, rssi });
        cursor += 5;
    }

    Ok(WifiLbsPayload { timestamp, wifi, mcc, mnc, gsm_cells })
}

/// Decodes the 2-byte position-upload-interval payload (opcode `0x98`).
pub fn decode_position_interval(payload: &[u8]) -> Result<[u8; 2], DecodeError> {
    payload.try_into().map_err(|_| DecodeError::WrongPayloadLength {
        opcode: 0x98,
        expected: "2 bytes",
        actual: payload.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_login_imei_and_sw_version() {
        let payload = [0x03, 0x59, 0x33, 0x90, 0x75, 0x01, 0x68, 0x07, 0x42];
        let decoded = decode_login(&payload).unwrap();
        assert_eq!(decoded.imei, "359339075016807");
        assert_eq!(decoded.software_version, 0x42);
    }

    #[test]
    fn rejects_wrong_login_length() {
        assert!(decode_login(&[0u8; 8]).is_err());
    }

    #[test]
    fn decodes_status_without_signal() {
        let decoded = decode_status(&[80, 3, 10]).unwrap();
        assert_eq!(decoded.battery, 80);
        assert_eq!(decoded.signal_strength, None);
    }

    #[test]
    fn decodes_status_with_signal() {
        let decoded = decode_status(&[80, 3, 10, 22, 0]).unwrap();
        assert_eq!(decoded.signal_strength, Some(22));
    }

    #[test]
    fn decodes_gps_fix_matching_scenario() {
        let payload: [u8; 18] = [
            0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D, // timestamp
            0xC5, // len=12, sats=5
            0x02, 0x7A, 0xB4, 0x00, // lat_raw
            0x06, 0x0C, 0xC8, 0x40, // lon_raw
            0x0F, // speed
            0x0C, 0x1A, // flags
        ];
        let decoded = decode_gps(&payload, 0x10).unwrap();
        assert_eq!(decoded.satellite_count, 5);
        assert_eq!(decoded.length_indicator, 0x0C);
        assert_eq!(decoded.speed_kmh, 15);
        assert!((decoded.latitude.abs() - 23.144_96).abs() < 1e-3);
        assert_eq!(decoded.timestamp_fields(), (2024, 1, 15, 10, 30, 45));
    }

    #[test]
    fn zero_timestamp_is_detected() {
        let mut payload = [0u8; 18];
        payload[6] = 0x05;
        let decoded = decode_gps(&payload, 0x10).unwrap();
        assert!(decoded.timestamp_is_zero());
    }

    #[test]
    fn decodes_wifi_lbs_evidence() {
        #[rustfmt::skip]
        let payload: Vec<u8> = vec![
            0x02, // n_wifi
            0x23, 0x01, 0x15, 0x08, 0x1E, 0x2D, // BCD timestamp 2023-01-15 08:30:45
            0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x64, // ap1, rssi -100
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x50, // ap2, rssi -80
            0x01, // n_gsm
            0x02, 0x08, 0x0A, // mcc=520, mnc=10
            0x00, 0x01, 0x00, 0x02, 0x46, // lac=1, cid=2, rssi=-70
        ];
        let decoded = decode_wifi_lbs(&payload, 0x69).unwrap();
        assert_eq!(decoded.wifi.len(), 2);
        assert_eq!(decoded.wifi[0].rssi, -100);
        assert_eq!(decoded.gsm_cells.len(), 1);
        assert_eq!(decoded.mcc, 520);
        assert_eq!(decoded.mnc, 10);
        assert_eq!(decoded.timestamp.0, 2023);
    }

    #[test]
    fn rejects_truncated_wifi_lbs() {
        assert!(decode_wifi_lbs(&[0x01], 0x69).is_err());
    }
}
