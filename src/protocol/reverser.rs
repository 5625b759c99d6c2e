//! Session-level key reversing.
//!
//! [`KeyReverser`] watches the packet stream of one connection and finishes
//! the key solve that the validation marker starts. After the marker, every
//! encrypted packet is assumed to carry 7-bit text, so each payload byte
//! still pins one key bit through its top bit. Categories that may carry
//! 8-bit data (commentary, notices, timestamps) cannot be used that way and
//! end the attempt.

use tracing::{debug, info, warn};

use super::key_recovery::{Anchor, Check, KeySolver, ValidationMarker};
use crate::core::packet::{Packet, SystemPacketType};
use crate::error::KeyRecoveryError;

/// Where the reverser stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverserStatus {
    /// Waiting for the validation marker.
    Start,
    /// Marker accepted, key partially solved.
    InProgress { resolved_bits: u32 },
    /// Key fully solved.
    Recovered(u32),
    /// The feed is not encrypted; the key is 0.
    Plaintext,
    Failed(KeyRecoveryError),
}

impl ReverserStatus {
    /// The usable key, if any.
    pub fn key(&self) -> Option<u32> {
        match self {
            Self::Recovered(key) => Some(*key),
            Self::Plaintext => Some(0),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Recovered(_) | Self::Plaintext | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
enum State {
    Start,
    Solving(KeySolver),
    Recovered(u32),
    Plaintext,
    Failed(KeyRecoveryError),
}

/// Incremental key recovery over a packet stream.
#[derive(Debug, Clone)]
pub struct KeyReverser {
    marker: ValidationMarker,
    state: State,
}

impl KeyReverser {
    pub fn new() -> Self {
        Self::with_marker(ValidationMarker::please_wait())
    }

    pub fn with_marker(marker: ValidationMarker) -> Self {
        Self {
            marker,
            state: State::Start,
        }
    }

    pub fn marker(&self) -> &ValidationMarker {
        &self.marker
    }

    pub fn status(&self) -> ReverserStatus {
        match &self.state {
            State::Start => ReverserStatus::Start,
            State::Solving(solver) => ReverserStatus::InProgress {
                resolved_bits: solver.resolved_bits(),
            },
            State::Recovered(key) => ReverserStatus::Recovered(*key),
            State::Plaintext => ReverserStatus::Plaintext,
            State::Failed(e) => ReverserStatus::Failed(*e),
        }
    }

    pub fn key(&self) -> Option<u32> {
        self.status().key()
    }

    /// Forget all progress, including a recovered key.
    pub fn reset(&mut self) {
        self.state = State::Start;
    }

    /// Feed the next packet of the stream, in stream order.
    ///
    /// Packets must be given exactly as framed (still encrypted).
    pub fn observe(&mut self, packet: &Packet) -> ReverserStatus {
        if packet.resets_decryption() {
            // The cipher restarts from its seed; a known key stays valid.
            if !matches!(
                self.state,
                State::Recovered(_) | State::Plaintext | State::Start
            ) {
                debug!(code = packet.type_code(), "Key reverser restarted");
                self.state = State::Start;
            }
            return self.status();
        }
        if !packet.is_encrypted() || packet.is_empty() {
            return self.status();
        }

        self.state = match std::mem::replace(&mut self.state, State::Start) {
            State::Start => self.anchor(packet),
            State::Solving(solver) => Self::extend(solver, packet),
            finished => finished,
        };
        self.status()
    }

    fn anchor(&self, packet: &Packet) -> State {
        match self.marker.anchor(packet) {
            Ok(Anchor::Plaintext) => {
                info!("Validation marker sent in clear, feed is not encrypted");
                State::Plaintext
            }
            Ok(Anchor::Solver(solver)) => Self::settle(solver),
            Err(e) => {
                warn!(error = %e, "Key recovery failed on validation marker");
                State::Failed(e)
            }
        }
    }

    fn extend(mut solver: KeySolver, packet: &Packet) -> State {
        if let Some(
            SystemPacketType::Commentary | SystemPacketType::Notice | SystemPacketType::Timestamp,
        ) = packet.system_type()
        {
            let e = KeyRecoveryError::UnreliablePlaintext {
                code: packet.type_code(),
            };
            warn!(error = %e, resolved_bits = solver.resolved_bits(), "Key recovery abandoned");
            return State::Failed(e);
        }

        for byte in packet.payload() {
            if solver.is_complete() {
                break;
            }
            if let Err(e) = solver.absorb(*byte, Check::HighBit) {
                warn!(error = %e, "Key recovery failed");
                return State::Failed(e);
            }
        }
        Self::settle(solver)
    }

    fn settle(solver: KeySolver) -> State {
        if solver.is_complete() {
            State::Recovered(solver.key())
        } else {
            State::Solving(solver)
        }
    }
}

impl Default for KeyReverser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::keystream::Keystream;
    use std::time::SystemTime;

    const AT: SystemTime = SystemTime::UNIX_EPOCH;

    fn encrypted(stream: &mut Keystream, header: [u8; 2], plain: &[u8]) -> Packet {
        let mut frame = header.to_vec();
        frame.extend_from_slice(plain);
        let mut packet = Packet::from_frame(&frame, AT).unwrap();
        stream.apply(packet.payload_mut());
        packet
    }

    fn notice_header(len: usize) -> [u8; 2] {
        [0xC0, (len as u8) << 1]
    }

    #[test]
    fn test_marker_then_car_packets_recover_key() {
        let key = 0xF00D_CAFE;
        let mut stream = Keystream::new(key);
        let mut reverser = KeyReverser::new();

        let event = Packet::from_frame(&[0x20, 0x00], AT).unwrap();
        assert_eq!(reverser.observe(&event), ReverserStatus::Start);

        let marker = encrypted(&mut stream, notice_header(15), b"Please Wait ...");
        assert_eq!(
            reverser.observe(&marker),
            ReverserStatus::InProgress { resolved_bits: 22 }
        );

        // Unencrypted position updates do not move the keystream
        let position = Packet::from_frame(&[0x03, 0x04], AT).unwrap();
        reverser.observe(&position);

        // car 3, type 2, six bytes of lap time
        let lap = encrypted(&mut stream, [0x43, 0x60], b"1:23.4");
        assert_eq!(
            reverser.observe(&lap),
            ReverserStatus::InProgress { resolved_bits: 28 }
        );

        let gap = encrypted(&mut stream, [0x63, 0x60], b"+1.234");
        assert_eq!(reverser.observe(&gap), ReverserStatus::Recovered(key));
        assert_eq!(reverser.key(), Some(key));
    }

    #[test]
    fn test_clear_marker_means_plaintext() {
        let mut reverser = KeyReverser::new();
        let mut frame = vec![0xC0, 0x10];
        frame.extend_from_slice(b"img:abcd");
        let notice = Packet::from_frame(&frame, AT).unwrap();
        assert_eq!(reverser.observe(&notice), ReverserStatus::Plaintext);
        assert_eq!(reverser.key(), Some(0));
    }

    #[test]
    fn test_wrong_first_packet_fails() {
        let mut reverser = KeyReverser::new();
        let weather = Packet::from_frame(&[0x20, 0x13, b'2'], AT).unwrap();
        assert_eq!(
            reverser.observe(&weather),
            ReverserStatus::Failed(KeyRecoveryError::UnexpectedCategory { car: 0, code: 9 })
        );
    }

    #[test]
    fn test_commentary_while_solving_fails() {
        let mut stream = Keystream::new(0xDEAD_BEEF);
        let mut reverser = KeyReverser::new();
        reverser.observe(&encrypted(&mut stream, notice_header(15), b"Please Wait ..."));

        let commentary = encrypted(&mut stream, [0x80, 0x04], &[0x01, b'x']);
        assert_eq!(
            reverser.observe(&commentary),
            ReverserStatus::Failed(KeyRecoveryError::UnreliablePlaintext { code: 4 })
        );
    }

    #[test]
    fn test_reset_packet_restarts_unfinished_attempt() {
        let mut reverser = KeyReverser::new();
        let weather = Packet::from_frame(&[0x20, 0x13, b'2'], AT).unwrap();
        assert!(reverser.observe(&weather).is_finished());

        let key_frame = Packet::from_frame(&[0x40, 0x10, 0x01], AT).unwrap();
        assert_eq!(reverser.observe(&key_frame), ReverserStatus::Start);
    }

    #[test]
    fn test_plaintext_feed_survives_key_frame() {
        let mut reverser = KeyReverser::new();
        let mut frame = vec![0xC0, 0x10];
        frame.extend_from_slice(b"img:abcd");
        let notice = Packet::from_frame(&frame, AT).unwrap();
        assert_eq!(reverser.observe(&notice), ReverserStatus::Plaintext);

        let key_frame = Packet::from_frame(&[0x40, 0x10, 0x01], AT).unwrap();
        assert_eq!(reverser.observe(&key_frame), ReverserStatus::Plaintext);

        let atom = Packet::from_frame(&[0x21, 0x10, b'7'], AT).unwrap();
        assert_eq!(reverser.observe(&atom), ReverserStatus::Plaintext);
        assert_eq!(reverser.key(), Some(0));
    }
}
