//! Stress tests for the stream framer
//!
//! Replays long random streams through the framer in random-sized blocks.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use live_timing::core::packet::{PacketHeader, HEADER_LEN};
use live_timing::StreamFramer;
use rand::Rng;

/// A long stream of random well-formed frames.
fn random_stream(rng: &mut impl Rng, frames: usize) -> (Vec<u8>, Vec<usize>) {
    let mut stream = Vec::new();
    let mut lengths = Vec::with_capacity(frames);
    for _ in 0..frames {
        let (b0, b1): (u8, u8) = (rng.random(), rng.random());
        let len = PacketHeader::new(b0, b1).frame_len().unwrap();
        stream.extend_from_slice(&[b0, b1]);
        stream.extend((HEADER_LEN..len).map(|_| rng.random::<u8>()));
        lengths.push(len - HEADER_LEN);
    }
    (stream, lengths)
}

#[test]
fn stress_random_chunking_large_series() {
    // Heavy burst of packets read in random-sized blocks
    let mut rng = rand::rng();
    let (stream, lengths) = random_stream(&mut rng, 100_000);

    for _ in 0..5 {
        let mut framer = StreamFramer::new();
        let mut seen = Vec::with_capacity(lengths.len());
        let mut rest = stream.as_slice();
        while !rest.is_empty() {
            let cut = rng.random_range(1..=rest.len().min(600));
            let (chunk, tail) = rest.split_at(cut);
            for packet in framer.feed(chunk) {
                seen.push(packet.unwrap().len());
            }
            rest = tail;
        }
        assert_eq!(seen, lengths);
        assert_eq!(framer.buffered(), 0);
    }
}

#[test]
fn stress_random_noise_never_fails() {
    // Every header has a length rule, so noise frames without error
    let mut rng = rand::rng();
    let mut framer = StreamFramer::new();
    let mut block = [0u8; 4096];
    for _ in 0..2_000 {
        rng.fill(&mut block[..]);
        let len = rng.random_range(0..=block.len());
        for packet in framer.feed(&block[..len]) {
            assert!(packet.is_ok());
        }
    }
    assert!(!framer.is_poisoned());
}
