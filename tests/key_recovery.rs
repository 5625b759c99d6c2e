//! Integration tests for key recovery through the public API

#![allow(clippy::expect_used, clippy::unwrap_used)]

use live_timing::protocol::key_recovery::PLEASE_WAIT;
use live_timing::service::TimingSession;
use live_timing::transport::PacketHandler;
use live_timing::{
    recover_key, KeyRecoveryError, KeyReverser, Keystream, Packet, ReverserStatus, StreamFramer,
    SystemPacketType, ValidationMarker,
};
use std::time::SystemTime;

const AT: SystemTime = SystemTime::UNIX_EPOCH;

/// Builds the wire bytes of a session encrypted with one key.
struct SessionWriter {
    keystream: Keystream,
    wire: Vec<u8>,
}

impl SessionWriter {
    fn new(key: u32) -> Self {
        Self {
            keystream: Keystream::new(key),
            wire: Vec::new(),
        }
    }

    fn event_start(&mut self) -> &mut Self {
        self.wire.extend_from_slice(&[0x20, 0x00]);
        self.keystream.reset();
        self
    }

    fn notice(&mut self, text: &[u8]) -> &mut Self {
        self.encrypted(&[0xC0, (text.len() as u8) << 1], text)
    }

    fn car_atom(&mut self, car: u8, code: u8, text: &[u8]) -> &mut Self {
        let b0 = ((code & 0x07) << 5) | car;
        let b1 = ((text.len() as u8) << 4) | (code >> 3);
        self.encrypted(&[b0, b1], text)
    }

    fn position(&mut self, car: u8, position: u8) -> &mut Self {
        self.wire.extend_from_slice(&[car, position << 1]);
        self
    }

    fn encrypted(&mut self, header: &[u8], text: &[u8]) -> &mut Self {
        let mut payload = text.to_vec();
        self.keystream.apply(&mut payload);
        self.wire.extend_from_slice(header);
        self.wire.extend_from_slice(&payload);
        self
    }
}

fn frame(wire: &[u8]) -> Vec<Packet> {
    StreamFramer::new()
        .feed_at(wire, AT)
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn test_session_recovers_key_and_decrypts_cache() {
    let key = 0xC0FF_EE42;
    let mut writer = SessionWriter::new(key);
    writer.event_start().notice(PLEASE_WAIT);
    for car in 1..=6 {
        writer.position(car, car);
        writer.car_atom(car, 2, b"1:31.7");
    }

    let mut forwarded = 0;
    let mut session = TimingSession::new(|_: Packet| forwarded += 1);
    let mut framer = StreamFramer::new();
    for chunk in writer.wire.chunks(7) {
        for packet in framer.feed_at(chunk, AT) {
            session.handle(packet.unwrap());
        }
    }

    assert_eq!(session.key(), Some(key));
    let decrypted = session.decrypted_cache().unwrap();
    assert_eq!(decrypted[1].payload(), PLEASE_WAIT);
    for packet in decrypted.iter().filter(|p| p.type_code() == 2 && !p.is_system()) {
        assert_eq!(packet.payload(), b"1:31.7");
    }
    drop(session);
    assert_eq!(forwarded, 14);
}

#[test]
fn test_key_frame_resets_keystream_but_keeps_key() {
    let key = 0x1357_9BDF;
    let mut writer = SessionWriter::new(key);
    writer.event_start().notice(PLEASE_WAIT);
    for car in 1..=3 {
        writer.car_atom(car, 4, b"+12.345");
    }
    // Key frame restarts the cipher mid-session
    writer.wire.extend_from_slice(&[0x40, 0x10, 0x07]);
    writer.keystream.reset();
    writer.car_atom(9, 3, b"PIT");

    let mut session = TimingSession::new(|_: Packet| {});
    for packet in frame(&writer.wire) {
        session.handle(packet);
    }
    assert_eq!(session.status(), ReverserStatus::Recovered(key));

    let decrypted = session.decrypted_cache().unwrap();
    assert_eq!(decrypted.last().unwrap().payload(), b"PIT");
}

#[test]
fn test_fresh_derivation_after_reconnect() {
    let first = frame(SessionWriter::new(0x0AAA_5555).notice(PLEASE_WAIT).wire.as_slice());
    let second = frame(SessionWriter::new(0x7F00_00FF).notice(PLEASE_WAIT).wire.as_slice());

    // Neither fixes all 32 bits on its own, and the second is unaffected
    // by having solved the first.
    assert_eq!(
        recover_key(&first[0]),
        Err(KeyRecoveryError::Underdetermined { resolved_bits: 22 })
    );
    assert_eq!(
        recover_key(&second[0]),
        Err(KeyRecoveryError::Underdetermined { resolved_bits: 22 })
    );

    let mut reverser = KeyReverser::new();
    reverser.observe(&first[0]);
    reverser.reset();
    assert_eq!(
        reverser.observe(&second[0]),
        ReverserStatus::InProgress { resolved_bits: 22 }
    );
}

#[test]
fn test_custom_marker_recovers_in_one_step() {
    let text: &'static [u8] = b"Please Wait ... connecting to timing";
    let key = 0xFEDC_BA98;
    let packets = frame(SessionWriter::new(key).notice(text).wire.as_slice());

    let marker = ValidationMarker::new(SystemPacketType::Notice, text);
    assert_eq!(marker.recover_key(&packets[0]), Ok(key));

    let mut reverser = KeyReverser::with_marker(marker);
    assert_eq!(reverser.observe(&packets[0]), ReverserStatus::Recovered(key));
}

#[test]
fn test_unencrypted_first_packet_is_rejected() {
    // A position update is never encrypted, so it is not a usable reference
    let packets = frame(&[0x05, 0x08]);
    assert_eq!(
        recover_key(&packets[0]),
        Err(KeyRecoveryError::UnexpectedCategory { car: 5, code: 0 })
    );
}

#[test]
fn test_wrong_key_stream_fails_consistency() {
    // Marker encrypted, then one byte flipped in transit
    let mut wire = SessionWriter::new(0x2468_ACE0).notice(PLEASE_WAIT).wire.clone();
    wire[6] ^= 0x21;
    let packets = frame(&wire);
    assert_eq!(
        recover_key(&packets[0]),
        Err(KeyRecoveryError::Inconsistent { offset: 4 })
    );

    let mut reverser = KeyReverser::new();
    assert_eq!(
        reverser.observe(&packets[0]),
        ReverserStatus::Failed(KeyRecoveryError::Inconsistent { offset: 4 })
    );
}
