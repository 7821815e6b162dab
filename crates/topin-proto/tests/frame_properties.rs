//! Integration tests exercising the frame codec and response builder
//! together against the concrete scenario byte vectors.

use topin_proto::frame::{Frame, FrameDecoder};
use topin_proto::payloads::{decode_gps, decode_login};
use topin_proto::response;

#[test]
fn s1_login_round_trips() {
    let wire: &[u8] = &[0x78, 0x78, 0x0A, 0x01, 0x03, 0x59, 0x33, 0x90, 0x75, 0x01, 0x68, 0x07, 0x42, 0x0D, 0x0A];
    let mut decoder = FrameDecoder::new();
    decoder.extend(wire);
    let frame = decoder.next_frame().unwrap().expect("a frame");
    assert_eq!(frame.opcode, 0x01);

    let login = decode_login(&frame.payload).unwrap();
    assert_eq!(login.imei, "359339075016807");
    assert_eq!(login.software_version, 0x42);

    let reply = response::login_ack();
    let out = Frame::encode(reply.opcode, &reply.payload, reply.policy);
    assert_eq!(&out[..], &[0x78, 0x78, 0x02, 0x01, 0x01, 0x0D, 0x0A]);
}

#[test]
fn s3_gps_fix_round_trips() {
    let payload: [u8; 18] = [
        0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D, 0xC5, 0x02, 0x7A, 0xB4, 0x00, 0x06, 0x0C, 0xC8, 0x40, 0x0F, 0x0C, 0x1A,
    ];
    let decoded = decode_gps(&payload, 0x10).unwrap();
    assert_eq!(decoded.timestamp_fields(), (2024, 1, 15, 10, 30, 45));

    let reply = response::timestamp_echo(0x10, decoded.device_timestamp);
    let out = Frame::encode(reply.opcode, &reply.payload, reply.policy);
    assert_eq!(&out[..], &[0x78, 0x78, 0x00, 0x10, 0x18, 0x01, 0x0F, 0x0A, 0x1E, 0x2D, 0x0D, 0x0A]);
}

#[test]
fn s4_hibernation_has_no_reply_and_is_length_consistent() {
    let wire: &[u8] = &[0x78, 0x78, 0x01, 0x14, 0x0D, 0x0A];
    let mut decoder = FrameDecoder::new();
    decoder.extend(wire);
    let frame = decoder.next_frame().unwrap().expect("a frame");
    assert_eq!(frame.opcode, 0x14);
    assert!(frame.payload.is_empty());
}
