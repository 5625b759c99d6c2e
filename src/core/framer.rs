//! Incremental packet framing.
//!
//! Bytes arrive from the socket in whatever chunks the kernel hands over: a
//! single byte, exactly one packet, or several packets with a partial one at
//! the end. `StreamFramer` keeps the partial packet between calls and emits
//! every packet as soon as its last byte is seen.
//!
//! The framer works in two steps per packet:
//! - collect the 2 header bytes (there is no way to know the length before)
//! - derive the total length from the header and collect the rest
//!
//! # Example
//!
//! ```
//! use live_timing::core::framer::StreamFramer;
//!
//! let mut framer = StreamFramer::new();
//!
//! // A car packet split across two reads
//! assert_eq!(framer.feed(&[0x21]).count(), 0);
//! let packets: Vec<_> = framer.feed(&[0x10, b'7']).collect();
//! assert_eq!(packets.len(), 1);
//! ```

use std::iter::FusedIterator;
use std::time::SystemTime;

use tracing::{trace, warn};

use super::packet::{Packet, PacketHeader, HEADER_LEN, MAX_FRAME_LEN, MAX_PACKET_LEN};
use crate::error::FramingError;

/// Partial-frame state for one connection.
///
/// Not meant to be shared: callers serialise `feed` per connection, and every
/// connection owns its own framer.
#[derive(Debug, Clone)]
pub struct StreamFramer {
    /// Bytes of the packet currently being assembled.
    buffer: [u8; MAX_FRAME_LEN],
    buffer_len: usize,
    /// Total length of the packet in progress, known once the header is in.
    expected: Option<usize>,
    /// Largest payload accepted before the stream is declared corrupt.
    max_payload: usize,
    poisoned: bool,
}

impl StreamFramer {
    /// Create a framer accepting the protocol maximum payload of 127 bytes.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PACKET_LEN)
    }

    /// Create a framer with a tighter payload limit. Values above the
    /// protocol maximum are clamped to it.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buffer: [0; MAX_FRAME_LEN],
            buffer_len: 0,
            expected: None,
            max_payload: max_payload.min(MAX_PACKET_LEN),
            poisoned: false,
        }
    }

    /// Feed a chunk of stream bytes, stamping completed packets with the
    /// current wall clock time.
    ///
    /// The returned iterator consumes `input` lazily and yields every packet
    /// completed by this chunk, in stream order. Drain it: bytes it has not
    /// reached yet are not buffered anywhere else. A framing error is yielded
    /// once and ends the sequence; the framer stays poisoned until `reset`.
    pub fn feed<'a>(&'a mut self, input: &'a [u8]) -> Packets<'a> {
        self.feed_at(input, SystemTime::now())
    }

    /// Same as [`feed`](Self::feed) with an explicit receipt time.
    pub fn feed_at<'a>(&'a mut self, input: &'a [u8], at: SystemTime) -> Packets<'a> {
        Packets {
            framer: self,
            input,
            at,
            finished: false,
        }
    }

    /// Feed a chunk and hand each completed packet to `handler`.
    ///
    /// Packets completed before a framing error are still delivered.
    /// Returns the number of packets delivered.
    pub fn feed_all<F>(&mut self, input: &[u8], mut handler: F) -> Result<usize, FramingError>
    where
        F: FnMut(Packet),
    {
        let mut count = 0;
        for packet in self.feed(input) {
            handler(packet?);
            count += 1;
        }
        Ok(count)
    }

    /// Number of bytes held for the packet in progress.
    pub fn buffered(&self) -> usize {
        self.buffer_len
    }

    /// Total length of the packet in progress, if its header is complete.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Drop any partial packet and clear a previous framing error.
    ///
    /// Only call this at a known packet boundary (e.g. a new connection),
    /// otherwise the next packet will be misframed.
    pub fn reset(&mut self) {
        self.buffer_len = 0;
        self.expected = None;
        self.poisoned = false;
    }

    /// Copy up to one packet's worth of bytes out of `input`, advancing it.
    ///
    /// Returns `Ok(None)` once `input` is exhausted without completing a
    /// packet. Can be called a byte at a time.
    pub(crate) fn next_packet(
        &mut self,
        input: &mut &[u8],
        at: SystemTime,
    ) -> Result<Option<Packet>, FramingError> {
        if self.poisoned {
            return Err(FramingError::Poisoned);
        }

        // Two bytes are needed to figure out how long the rest is.
        if self.buffer_len < HEADER_LEN {
            self.take(input, HEADER_LEN - self.buffer_len);
            if self.buffer_len < HEADER_LEN {
                return Ok(None);
            }
        }

        let expected = match self.expected {
            Some(expected) => expected,
            None => {
                let expected = self.expected_from_header().inspect_err(|e| {
                    warn!(error = %e, "Framing error, stream can no longer be trusted");
                    self.poisoned = true;
                })?;
                self.expected = Some(expected);
                expected
            }
        };

        self.take(input, expected - self.buffer_len);
        if self.buffer_len < expected {
            return Ok(None);
        }

        let packet = Packet::from_frame(&self.buffer[..expected], at)?;
        self.buffer_len = 0;
        self.expected = None;

        trace!(
            car = packet.car(),
            packet_type = packet.type_code(),
            len = packet.len(),
            "Packet framed"
        );
        Ok(Some(packet))
    }

    fn expected_from_header(&self) -> Result<usize, FramingError> {
        let header = PacketHeader::new(self.buffer[0], self.buffer[1]);
        let expected = header.frame_len()?;
        if expected - HEADER_LEN > self.max_payload {
            return Err(FramingError::LengthExceedsMaximum {
                car: header.car(),
                code: header.type_code(),
                claimed: expected - HEADER_LEN,
                limit: self.max_payload,
            });
        }
        Ok(expected)
    }

    fn take(&mut self, input: &mut &[u8], wanted: usize) {
        let count = wanted.min(input.len());
        let (head, rest) = input.split_at(count);
        self.buffer[self.buffer_len..self.buffer_len + count].copy_from_slice(head);
        self.buffer_len += count;
        *input = rest;
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Packets completed by one chunk of input.
///
/// The iterator owns the unread part of the chunk. Dropping it before it
/// returns `None` discards those bytes and the next chunk will be misframed,
/// so always drain it (a `for` loop without `break`, `collect`, `count`).
#[must_use = "unconsumed input is lost when the iterator is dropped"]
#[derive(Debug)]
pub struct Packets<'a> {
    framer: &'a mut StreamFramer,
    input: &'a [u8],
    at: SystemTime,
    finished: bool,
}

impl<'a> Packets<'a> {
    /// Input bytes the iterator has not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }
}

impl Iterator for Packets<'_> {
    type Item = Result<Packet, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.framer.next_packet(&mut self.input, self.at) {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Packets<'_> {}

impl Drop for Packets<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.input.is_empty() {
            warn!(
                discarded = self.input.len(),
                "Packet iterator dropped before draining its input"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const AT: SystemTime = SystemTime::UNIX_EPOCH;

    fn frame_all(framer: &mut StreamFramer, input: &[u8]) -> Vec<Packet> {
        framer
            .feed_at(input, AT)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_single_byte_waits_for_header() {
        let mut framer = StreamFramer::new();
        assert!(frame_all(&mut framer, &[0x21]).is_empty());
        assert_eq!(framer.buffered(), 1);
        assert_eq!(framer.expected_len(), None);

        assert!(frame_all(&mut framer, &[0x20]).is_empty());
        assert_eq!(framer.expected_len(), Some(4));

        let packets = frame_all(&mut framer, &[b'1', b'2']);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), b"12");
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_several_packets_in_one_chunk() {
        let mut framer = StreamFramer::new();
        let stream = [
            0x05, 0x08, // car 5 position update
            0x21, 0x10, b'7', // car 1 short, one byte
            0xE0, 0x00, 0xAA, 0xBB, // timestamp, fixed length
            0x21, 0x20, // first half of the next packet
        ];
        let packets = frame_all(&mut framer, &stream);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].data(), 4);
        assert_eq!(packets[1].payload(), b"7");
        assert_eq!(packets[2].payload(), &[0xAA, 0xBB]);
        assert_eq!(framer.buffered(), 2);
    }

    #[test]
    fn test_header_only_packet_completes_without_more_input() {
        let mut framer = StreamFramer::new();
        let packets = frame_all(&mut framer, &[0x05, 0x08]);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_empty());
    }

    #[test]
    fn test_limit_poisons_framer() {
        let mut framer = StreamFramer::with_max_payload(4);
        // Notice claiming 5 payload bytes
        let results: Vec<_> = framer.feed_at(&[0xC0, 0x0A, 1, 2, 3], AT).collect();
        assert_eq!(
            results,
            vec![Err(FramingError::LengthExceedsMaximum {
                car: 0,
                code: 6,
                claimed: 5,
                limit: 4,
            })]
        );
        assert!(framer.is_poisoned());

        let again: Vec<_> = framer.feed_at(&[0x05, 0x08], AT).collect();
        assert_eq!(again, vec![Err(FramingError::Poisoned)]);

        framer.reset();
        assert_eq!(frame_all(&mut framer, &[0x05, 0x08]).len(), 1);
    }

    #[test]
    fn test_feed_all_delivers_packets_before_error() {
        let mut framer = StreamFramer::with_max_payload(1);
        let mut seen = Vec::new();
        let result = framer.feed_all(&[0x21, 0x10, b'x', 0x21, 0x20, b'a', b'b'], |p| seen.push(p));
        assert!(matches!(result, Err(FramingError::LengthExceedsMaximum { .. })));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_remaining_tracks_consumption() {
        let mut framer = StreamFramer::new();
        let input = [0x05, 0x08, 0x21, 0x10, b'7'];
        let mut packets = framer.feed_at(&input, AT);
        assert!(packets.next().is_some());
        assert_eq!(packets.remaining(), &input[2..]);
    }

    #[test]
    fn test_unread_input_can_be_fed_again() {
        let mut framer = StreamFramer::new();
        let input = [0x05, 0x08, 0x21, 0x10, b'7', 0x21];
        let rest = {
            let mut packets = framer.feed_at(&input, AT);
            assert_eq!(packets.next().unwrap().unwrap().car(), 5);
            packets.remaining().to_vec()
        };
        assert_eq!(framer.buffered(), 0);

        // Handing the unread bytes back keeps the stream aligned
        let packets = frame_all(&mut framer, &rest);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload(), b"7");
        assert_eq!(framer.buffered(), 1);
    }
}
