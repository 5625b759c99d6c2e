//! Integration tests for the tokio codec and recorded-session streams

#![allow(clippy::expect_used, clippy::unwrap_used)]

use futures::{SinkExt, StreamExt};
use live_timing::transport::packet_stream;
use live_timing::{PacketCodec, ProtocolError, StreamFramer, SystemPacketType};
use tokio_util::codec::{FramedRead, FramedWrite};

const RECORDING: &[u8] = &[
    0x20, 0x00, // event id
    0x05, 0x08, // car 5 position update
    0x21, 0x10, b'9', // car 1 short atom
    0xE0, 0x0C, 0x01, 0x02, // timestamp
    0x03, 0x04, 0x05, 0x06, // two position updates
];

#[tokio::test]
async fn test_recorded_session_stream() {
    let packets: Vec<_> = packet_stream(&RECORDING[..7]).collect().await;
    let packets: Vec<_> = packets.into_iter().collect::<Result<_, _>>().unwrap();

    assert_eq!(packets.len(), 3);
    assert_eq!(packets[0].system_type(), Some(SystemPacketType::EventId));
    assert_eq!(packets[1].car(), 5);
    assert_eq!(packets[2].payload(), b"9");
}

#[tokio::test]
async fn test_timestamp_is_fixed_length() {
    // System code 7 is always four bytes, whatever byte 1 says
    let mut stream = packet_stream(&RECORDING[7..]);
    let timestamp = stream.next().await.unwrap().unwrap();
    assert_eq!(timestamp.system_type(), Some(SystemPacketType::Timestamp));
    assert_eq!(timestamp.payload(), &[0x01, 0x02]);

    // Only the first two bytes belong to it
    let next = stream.next().await.unwrap().unwrap();
    assert_eq!(next.car(), 3);
    assert!(next.is_empty());
}

#[tokio::test]
async fn test_truncated_recording_errors_at_eof() {
    let items: Vec<_> = packet_stream(&[0x05, 0x08, 0xC0, 0x20, 0x41][..])
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn test_framing_error_ends_stream() {
    let codec = PacketCodec::with_framer(StreamFramer::with_max_payload(4));
    let mut framed = FramedRead::new(&[0x05, 0x08, 0xC0, 0x20, 0x00][..], codec);

    assert!(framed.next().await.unwrap().is_ok());
    assert!(matches!(
        framed.next().await.unwrap(),
        Err(ProtocolError::Framing(_))
    ));
}

#[tokio::test]
async fn test_write_then_read_back() {
    let packets: Vec<_> = packet_stream(&RECORDING[..7])
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let mut sink = FramedWrite::new(Vec::new(), PacketCodec::new());
    for packet in &packets {
        sink.send(packet).await.unwrap();
    }
    assert_eq!(sink.get_ref().as_slice(), &RECORDING[..7]);
}
