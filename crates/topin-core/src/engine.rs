//! The protocol engine: state-table dispatch over decoded frames.
//!
//! One [`Engine`] is shared (via `Arc`, typically) across every connection;
//! all per-connection mutable state lives in the caller's [`Session`]. Rather
//! than collecting replies into a list and handing them back once a frame is
//! fully handled, the engine writes each reply through a [`ReplyWriter`] as
//! soon as it is built. This matters for `wifi_positioning`: stage 1 must
//! reach the wire before the geolocation call starts, and a
//! frame-in/replies-out API cannot express that ordering without the caller
//! re-deriving which replies are "early".

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike, Utc};
use topin_proto::payloads::{self, GpsPayload, WifiLbsPayload};
use topin_proto::{Frame, Opcode, Reply};

use crate::error::EngineError;
use crate::geolocation::{GeoFix, Geolocator};
use crate::logging::{Direction, InfoRecord, LogSink};
use crate::session::{Carrier, PositionMethod, PositionRecord, Session, SessionState};

/// Sink a connection task hands to the engine so it can flush replies as
/// soon as they are built, rather than after the whole frame is processed.
#[async_trait]
pub trait ReplyWriter: Send {
    /// Writes one reply frame. An `Err` here is always treated as fatal to
    /// the connection.
    async fn write_reply(&mut self, reply: Reply) -> Result<(), EngineError>;
}

/// Drives a single decoded frame through session state, collaborator calls,
/// and reply construction.
pub struct Engine<G, L> {
    geolocator: G,
    log_sink: L,
}

impl<G, L> Engine<G, L>
where
    G: Geolocator,
    L: LogSink,
{
    /// Builds an engine around its two collaborators.
    pub fn new(geolocator: G, log_sink: L) -> Self {
        Self { geolocator, log_sink }
    }

    /// Processes one inbound frame, mutating `session` and writing every
    /// reply through `writer` in generation order.
    ///
    /// An `Err` result that is fatal ([`EngineError::is_fatal`]) means the
    /// caller should close the connection; a non-fatal error means the
    /// frame was logged and otherwise ignored.
    pub async fn handle_frame<W: ReplyWriter>(
        &self,
        session: &mut Session,
        frame: &Frame,
        writer: &mut W,
    ) -> Result<(), EngineError> {
        self.log_info(session, Direction::In, frame.opcode, &frame.payload).await;

        let Some(opcode) = Opcode::from_byte(frame.opcode) else {
            return Err(EngineError::UnknownOpcode(frame.opcode));
        };

        if session.state == SessionState::AwaitingLogin && opcode != Opcode::Login {
            tracing::warn!(peer = %session.peer_addr, opcode = ?opcode, "closing: frame received before login");
            session.state = SessionState::Closing;
            return Ok(());
        }

        self.dispatch(session, opcode, &frame.payload, writer).await
    }

    async fn dispatch<W: ReplyWriter>(
        &self,
        session: &mut Session,
        opcode: Opcode,
        payload: &[u8],
        writer: &mut W,
    ) -> Result<(), EngineError> {
        use topin_proto::response;

        match opcode {
            Opcode::Login => {
                let login = payloads::decode_login(payload)?;
                session.imei = Some(login.imei);
                session.software_version = Some(login.software_version);
                session.state = SessionState::Active;
                self.emit(session, writer, response::login_ack()).await
            },

            Opcode::GpsPositioning | Opcode::GpsOfflinePositioning => {
                let gps = payloads::decode_gps(payload, opcode.to_byte())?;
                self.record_gps(session, &gps).await;
                self.emit(session, writer, response::timestamp_echo(opcode.to_byte(), gps.device_timestamp)).await
            },

            Opcode::Status => {
                let status = payloads::decode_status(payload)?;
                tracing::info!(
                    peer = %session.peer_addr,
                    imei = session.imei_or_empty(),
                    battery = status.battery,
                    interval = status.status_upload_interval,
                    signal = status.signal_strength,
                    "STATUS"
                );
                Ok(())
            },

            Opcode::Hibernation => {
                session.state = SessionState::Closing;
                Ok(())
            },

            Opcode::WhitelistTotal
            | Opcode::Reset
            | Opcode::Supervision
            | Opcode::Heartbeat
            | Opcode::StopAlarm
            | Opcode::SynchronousWhitelist
            | Opcode::RestorePassword
            | Opcode::ManualPositioning
            | Opcode::BatteryCharge
            | Opcode::ChargerConnected
            | Opcode::ChargerDisconnected
            | Opcode::VibrationReceived => self.emit(session, writer, response::generic_ack(opcode.to_byte())).await,

            Opcode::WifiOfflinePositioning => {
                let raw_timestamp = raw_timestamp_bytes(payload, opcode.to_byte())?;
                let lbs = payloads::decode_wifi_lbs(payload, opcode.to_byte())?;
                session.rolling_evidence.wifi = lbs.wifi;
                session.rolling_evidence.gsm_cells = lbs.gsm_cells;
                session.rolling_evidence.carrier = Some(Carrier { mcc: lbs.mcc, mnc: lbs.mnc });
                self.emit(session, writer, response::timestamp_echo(opcode.to_byte(), raw_timestamp)).await
            },

            Opcode::WifiPositioning => self.two_stage_positioning(session, opcode.to_byte(), payload, writer).await,

            Opcode::Time => {
                payloads::decode_time(payload)?;
                let now = Utc::now().naive_utc();
                let reply = response::time_reply(
                    u16::try_from(now.year()).unwrap_or_default(),
                    now.month(),
                    now.day(),
                    now.hour(),
                    now.minute(),
                    now.second(),
                );
                self.emit(session, writer, reply).await
            },

            Opcode::Setup => self.emit(session, writer, response::setup_reply_defaults()).await,

            Opcode::PositionUploadInterval => {
                let interval = payloads::decode_position_interval(payload)?;
                self.emit(session, writer, response::position_interval_ack(interval)).await
            },
        }
    }

    /// Generates stage 1, flushes it through `writer`, then calls
    /// geolocation and flushes stage 2. The flush between the two stages is
    /// the whole point of this method existing separately from `dispatch`:
    /// a device must see its ack promptly even when the lookup is slow.
    async fn two_stage_positioning<W: ReplyWriter>(
        &self,
        session: &mut Session,
        opcode: u8,
        payload: &[u8],
        writer: &mut W,
    ) -> Result<(), EngineError> {
        use topin_proto::response;

        let raw_timestamp = raw_timestamp_bytes(payload, opcode)?;
        let lbs = payloads::decode_wifi_lbs(payload, opcode)?;

        session.rolling_evidence.wifi.clone_from(&lbs.wifi);
        session.rolling_evidence.gsm_cells.clone_from(&lbs.gsm_cells);
        let carrier = Carrier { mcc: lbs.mcc, mnc: lbs.mnc };
        session.rolling_evidence.carrier = Some(carrier);

        self.emit(session, writer, response::timestamp_echo(opcode, raw_timestamp)).await?;

        let fix = self.geolocator.locate(Some(carrier), &session.rolling_evidence).await;
        let stage2 = response::wifi_positioning_stage2(fix.as_ref().ok().map(|f: &GeoFix| (f.lat, f.lng)));

        self.record_lbs(session, &lbs, fix.ok()).await;

        self.emit(session, writer, stage2).await
    }

    async fn emit<W: ReplyWriter>(&self, session: &Session, writer: &mut W, reply: Reply) -> Result<(), EngineError> {
        self.log_info(session, Direction::Out, reply.opcode, &reply.payload).await;
        writer.write_reply(reply).await
    }

    async fn record_gps(&self, session: &mut Session, gps: &GpsPayload) {
        let validity = if gps.timestamp_is_zero() {
            2
        } else if gps.position_valid {
            1
        } else {
            0
        };
        let datetime_local = if gps.timestamp_is_zero() {
            Utc::now().naive_utc()
        } else {
            let (year, month, day, hour, minute, second) = gps.timestamp_fields();
            naive_datetime(year, month, day, hour, minute, second)
        };
        let record = PositionRecord {
            method: PositionMethod::Gps,
            datetime_local,
            validity,
            nb_sat: Some(gps.satellite_count),
            latitude: Some(gps.latitude),
            longitude: Some(gps.longitude),
            accuracy: None,
            speed_kmh: Some(gps.speed_kmh),
            heading_degrees: Some(gps.heading_degrees),
        };
        session.last_gps = Some(record.clone());
        let peer_ip = session.peer_addr.ip().to_string();
        let imei = session.imei_or_empty().to_string();
        if let Err(err) = self.log_sink.append_position(&peer_ip, &imei, &record).await {
            tracing::warn!(peer = %session.peer_addr, error = %err, "failed to log gps position");
        }
    }

    async fn record_lbs(&self, session: &mut Session, lbs: &WifiLbsPayload, fix: Option<GeoFix>) {
        let (year, month, day, hour, minute, second) = lbs.timestamp;
        let datetime_local = naive_datetime(year, month, day, hour, minute, second);
        let method = match (lbs.wifi.is_empty(), lbs.gsm_cells.is_empty()) {
            (false, _) => PositionMethod::LbsGsmWifi,
            (true, false) => PositionMethod::LbsGsm,
            (true, true) => PositionMethod::Lbs,
        };
        let record = PositionRecord {
            method,
            datetime_local,
            validity: u8::from(fix.is_some()),
            nb_sat: None,
            latitude: fix.as_ref().map(|f| f.lat),
            longitude: fix.as_ref().map(|f| f.lng),
            accuracy: fix.as_ref().map(|f| f.accuracy),
            speed_kmh: None,
            heading_degrees: None,
        };
        let peer_ip = session.peer_addr.ip().to_string();
        let imei = session.imei_or_empty().to_string();
        if let Err(err) = self.log_sink.append_position(&peer_ip, &imei, &record).await {
            tracing::warn!(peer = %session.peer_addr, error = %err, "failed to log lbs position");
        }
    }

    async fn log_info(&self, session: &Session, direction: Direction, opcode: u8, payload: &[u8]) {
        let mut hex_payload = String::with_capacity(2 + payload.len() * 2);
        hex_payload.push_str(&format!("{opcode:02X}"));
        for byte in payload {
            hex_payload.push_str(&format!("{byte:02X}"));
        }
        let record = InfoRecord {
            timestamp: Utc::now().naive_utc(),
            peer_ip: session.peer_addr.ip().to_string(),
            imei: session.imei_or_empty().to_string(),
            direction,
            hex_payload,
        };
        if let Err(err) = self.log_sink.append_info(&record).await {
            tracing::warn!(peer = %session.peer_addr, error = %err, "failed to log info row");
        }
    }
}

/// Extracts the raw 6-byte BCD timestamp embedded in a `wifi`/`lbs` payload
/// (bytes `1..7`, after the access-point count byte) so it can be echoed
/// back verbatim in stage 1, without re-deriving it from the already
/// BCD-decoded [`WifiLbsPayload::timestamp`].
fn raw_timestamp_bytes(payload: &[u8], opcode: u8) -> Result<[u8; 6], EngineError> {
    let slice = payload.get(1..7).ok_or(topin_proto::DecodeError::WrongPayloadLength {
        opcode,
        expected: "at least 7 bytes",
        actual: payload.len(),
    })?;
    let mut out = [0u8; 6];
    out.copy_from_slice(slice);
    Ok(out)
}

/// Builds a local timestamp from device-reported fields, falling back to
/// the date/time epoch if the device sent an out-of-range value (e.g. a
/// clock that hasn't been set yet) rather than rejecting the whole frame.
fn naive_datetime(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> chrono::NaiveDateTime {
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day)).unwrap_or(NaiveDate::MIN);
    let time = chrono::NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
        .unwrap_or(chrono::NaiveTime::MIN);
    date.and_time(time)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::geolocation::GeolocationError;
    use crate::logging::LogSinkError;

    #[derive(Default)]
    struct MockGeolocator {
        fix: Option<GeoFix>,
    }

    #[async_trait]
    impl Geolocator for MockGeolocator {
        async fn locate(
            &self,
            _carrier: Option<Carrier>,
            _evidence: &crate::session::RollingEvidence,
        ) -> Result<GeoFix, GeolocationError> {
            self.fix.ok_or(GeolocationError::NotFound)
        }
    }

    #[derive(Default)]
    struct RecordingLogSink {
        info_rows: Mutex<Vec<InfoRecord>>,
        position_rows: Mutex<Vec<(String, PositionRecord)>>,
    }

    #[async_trait]
    impl LogSink for RecordingLogSink {
        async fn append_info(&self, record: &InfoRecord) -> Result<(), LogSinkError> {
            self.info_rows.lock().await.push(record.clone());
            Ok(())
        }

        async fn append_position(
            &self,
            _peer_ip: &str,
            imei: &str,
            record: &PositionRecord,
        ) -> Result<(), LogSinkError> {
            self.position_rows.lock().await.push((imei.to_string(), record.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecWriter {
        replies: Vec<Reply>,
    }

    #[async_trait]
    impl ReplyWriter for VecWriter {
        async fn write_reply(&mut self, reply: Reply) -> Result<(), EngineError> {
            self.replies.push(reply);
            Ok(())
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().expect("valid socket addr literal")
    }

    #[tokio::test]
    async fn s1_login_transitions_to_active_and_acks() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        let frame =
            Frame { opcode: 0x01, payload: vec![0x03, 0x59, 0x33, 0x90, 0x75, 0x01, 0x68, 0x07, 0x42].into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("login succeeds");

        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.imei.as_deref(), Some("359339075016807"));
        assert_eq!(writer.replies.len(), 1);
        assert_eq!(writer.replies[0].payload, vec![0x01]);
    }

    #[tokio::test]
    async fn frames_before_login_close_the_session() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        let frame = Frame { opcode: 0x14, payload: Vec::new().into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("non-fatal reject");
        assert!(writer.replies.is_empty());
        assert_eq!(session.state, SessionState::Closing);
    }

    #[tokio::test]
    async fn s3_gps_fix_updates_last_position_and_echoes_timestamp() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;

        let payload: Vec<u8> = vec![
            0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D, 0xC5, 0x02, 0x7A, 0xB4, 0x00, 0x06, 0x0C, 0xC8, 0x40, 0x0F, 0x0C,
            0x1A,
        ];
        let frame = Frame { opcode: 0x10, payload: payload.into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("gps frame succeeds");

        assert_eq!(writer.replies.len(), 1);
        assert_eq!(writer.replies[0].payload, vec![0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D]);
        assert!(session.last_gps.is_some());
    }

    #[tokio::test]
    async fn status_frame_produces_no_reply() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;
        let frame = Frame { opcode: 0x13, payload: vec![80, 3, 10, 0, 22].into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("status frame succeeds");
        assert!(writer.replies.is_empty());
        assert_eq!(session.state, SessionState::Active);
    }

    #[tokio::test]
    async fn s4_hibernation_produces_no_reply() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;
        let frame = Frame { opcode: 0x14, payload: Vec::new().into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("hibernation succeeds");
        assert!(writer.replies.is_empty());
        assert_eq!(session.state, SessionState::Closing);
    }

    #[tokio::test]
    async fn wifi_positioning_resolves_fix_and_emits_two_replies() {
        let engine = Engine::new(
            MockGeolocator { fix: Some(GeoFix { lat: 48.8566, lng: 2.3522, accuracy: 25.0 }) },
            RecordingLogSink::default(),
        );
        let mut session = Session::new(peer());
        session.state = SessionState::Active;

        #[rustfmt::skip]
        let payload: Vec<u8> = vec![
            0x01,
            0x23, 0x01, 0x15, 0x08, 0x1E, 0x2D,
            0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x64,
            0x01,
            0x02, 0x08, 0x0A,
            0x00, 0x01, 0x00, 0x02, 0x46,
        ];
        let frame = Frame { opcode: 0x69, payload: payload.into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("wifi positioning succeeds");

        assert_eq!(writer.replies.len(), 2);
        assert_eq!(writer.replies[1].payload, b"+48.856600,+2.352200");
        assert_eq!(session.rolling_evidence.wifi.len(), 1);
    }

    #[tokio::test]
    async fn wifi_positioning_stage1_is_written_before_geolocation_is_consulted() {
        struct OrderTrackingGeolocator;

        #[async_trait]
        impl Geolocator for OrderTrackingGeolocator {
            async fn locate(
                &self,
                _carrier: Option<Carrier>,
                _evidence: &crate::session::RollingEvidence,
            ) -> Result<GeoFix, GeolocationError> {
                Err(GeolocationError::NotFound)
            }
        }

        struct OrderTrackingWriter<'a> {
            stage1_written: &'a std::sync::atomic::AtomicBool,
            count: usize,
        }

        #[async_trait]
        impl ReplyWriter for OrderTrackingWriter<'_> {
            async fn write_reply(&mut self, _reply: Reply) -> Result<(), EngineError> {
                self.count += 1;
                if self.count == 1 {
                    self.stage1_written.store(true, std::sync::atomic::Ordering::SeqCst);
                }
                Ok(())
            }
        }

        let stage1_written = std::sync::atomic::AtomicBool::new(false);
        let engine = Engine::new(OrderTrackingGeolocator, RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;

        #[rustfmt::skip]
        let payload: Vec<u8> = vec![
            0x00,
            0x23, 0x01, 0x15, 0x08, 0x1E, 0x2D,
            0x01,
            0x02, 0x08, 0x0A,
            0x00, 0x01, 0x00, 0x02, 0x46,
        ];
        let frame = Frame { opcode: 0x69, payload: payload.into() };
        let mut writer = OrderTrackingWriter { stage1_written: &stage1_written, count: 0 };

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("wifi positioning succeeds");

        assert_eq!(writer.count, 2);
        assert!(stage1_written.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wifi_positioning_failure_emits_bare_separator() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;

        #[rustfmt::skip]
        let payload: Vec<u8> = vec![
            0x00,
            0x23, 0x01, 0x15, 0x08, 0x1E, 0x2D,
            0x01,
            0x02, 0x08, 0x0A,
            0x00, 0x01, 0x00, 0x02, 0x46,
        ];
        let frame = Frame { opcode: 0x69, payload: payload.into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("wifi positioning succeeds");
        assert_eq!(writer.replies[1].payload, b",");
    }

    #[tokio::test]
    async fn manual_positioning_is_logged_only_with_generic_ack() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;
        let frame = Frame { opcode: 0x80, payload: Vec::new().into() };
        let mut writer = VecWriter::default();

        engine.handle_frame(&mut session, &frame, &mut writer).await.expect("manual positioning succeeds");

        assert_eq!(writer.replies.len(), 1);
        assert_eq!(writer.replies[0].opcode, 0x80);
        assert!(writer.replies[0].payload.is_empty());
        assert!(session.rolling_evidence.wifi.is_empty());
    }

    #[tokio::test]
    async fn unknown_opcode_is_non_fatal() {
        let engine = Engine::new(MockGeolocator::default(), RecordingLogSink::default());
        let mut session = Session::new(peer());
        session.state = SessionState::Active;
        let frame = Frame { opcode: 0x43, payload: Vec::new().into() };
        let mut writer = VecWriter::default();

        let err = engine.handle_frame(&mut session, &frame, &mut writer).await.expect_err("unregistered opcode");
        assert!(!err.is_fatal());
    }
}
