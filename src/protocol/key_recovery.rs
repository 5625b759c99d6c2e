//! Known-plaintext recovery of the session key.
//!
//! Every session begins with a notice packet whose decrypted text is
//! predictable ("Please Wait ..."). XORing its encrypted payload with that
//! text yields the first keystream bytes, and the key can be solved from
//! them one bit at a time:
//!
//! - the first byte comes straight from the seed and fixes key bits 0..7
//! - each later byte depends on exactly one new key bit, which lands in bit 7
//!   of the register; its low 7 bits depend only on bits already fixed, so
//!   they must match (this is the self-consistency check)
//!
//! Fixing a new bit changes every register position it was mixed into. The
//! solver keeps a tap register recording which steps mixed in the key, so the
//! correction is a single XOR and the whole solve is linear in the payload.
//!
//! A reference of `n` bytes fixes `7 + n` bits. The stock marker is 15 bytes
//! long and fixes 22, so [`recover_key`] reports `Underdetermined` for keys
//! with higher bits set; [`KeyReverser`](super::reverser::KeyReverser) carries
//! the solve over the packets that follow.

use std::borrow::Cow;

use tracing::debug;

use super::keystream::{self, CRYPTO_SEED};
use crate::core::packet::{Packet, SystemPacketType};
use crate::error::KeyRecoveryError;

/// Decrypted payload of the stock validation marker.
pub const PLEASE_WAIT: &[u8] = b"Please Wait ...";

/// Payload prefix of a marker sent in clear, meaning the feed is not encrypted.
pub const PLAINTEXT_PREFIX: &[u8] = b"img:";

/// Width of the session key.
pub const KEY_BITS: u32 = 32;

/// How much of a keystream byte is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Check {
    /// The whole plaintext byte is known.
    Strict,
    /// Only the plaintext's top bit is known (zero, for 7-bit text).
    HighBit,
}

/// Incremental key solver.
#[derive(Debug, Clone)]
pub(crate) struct KeySolver {
    /// Fixed key bits; bits not fixed yet are zero.
    key: u32,
    resolved: u32,
    /// Register value under the current `key`.
    salt: u32,
    /// Bit 31 is the latest step; set where that step mixed in the key.
    taps: u32,
    offset: usize,
}

impl KeySolver {
    pub(crate) fn new() -> Self {
        Self {
            key: 0,
            resolved: 0,
            salt: CRYPTO_SEED,
            taps: 0,
            offset: 0,
        }
    }

    pub(crate) fn key(&self) -> u32 {
        self.key
    }

    pub(crate) fn resolved_bits(&self) -> u32 {
        self.resolved
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.resolved == KEY_BITS
    }

    /// Absorb the next keystream byte (ciphertext XOR predicted plaintext).
    ///
    /// The first byte must be absorbed with [`Check::Strict`].
    pub(crate) fn absorb(&mut self, byte: u8, check: Check) -> Result<(), KeyRecoveryError> {
        let offset = self.offset;
        self.offset += 1;

        let mixes_key = self.salt & 0x01 != 0;
        self.taps = (self.taps >> 1) | if mixes_key { 1 << 31 } else { 0 };

        if self.resolved == 0 {
            // The seed is odd, so the first step mixes in the whole key.
            self.key = u32::from(byte) ^ ((self.salt >> 1) & 0xFF);
            self.salt = (self.salt >> 1) ^ self.key;
            self.resolved = 8;
            return Ok(());
        }

        self.salt = keystream::step(self.salt, self.key);
        let diff = u32::from(byte) ^ (self.salt & 0xFF);

        if self.resolved < KEY_BITS {
            if check == Check::Strict && diff & 0x7F != 0 {
                return Err(KeyRecoveryError::Inconsistent { offset });
            }
            let bit = self.resolved;
            if diff & 0x80 != 0 {
                self.key ^= 1 << bit;
                self.salt ^= self.taps >> (31 - bit);
            }
            self.resolved += 1;
            return Ok(());
        }

        let mask = match check {
            Check::Strict => 0xFF,
            Check::HighBit => 0x80,
        };
        if diff & mask != 0 {
            return Err(KeyRecoveryError::Inconsistent { offset });
        }
        Ok(())
    }
}

/// Outcome of anchoring a solve on a validation marker.
#[derive(Debug, Clone)]
pub(crate) enum Anchor {
    /// The marker arrived in clear; the feed is unencrypted.
    Plaintext,
    Solver(KeySolver),
}

/// A system packet category whose decrypted content is known in advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMarker {
    packet_type: SystemPacketType,
    plaintext: Cow<'static, [u8]>,
}

impl ValidationMarker {
    pub fn new(packet_type: SystemPacketType, plaintext: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            packet_type,
            plaintext: plaintext.into(),
        }
    }

    /// The "Please Wait ..." notice that opens every session.
    pub fn please_wait() -> Self {
        Self::new(SystemPacketType::Notice, PLEASE_WAIT)
    }

    pub fn packet_type(&self) -> SystemPacketType {
        self.packet_type
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Key bits a matching reference packet can fix.
    pub fn resolvable_bits(&self) -> u32 {
        match self.plaintext.len() {
            0 => 0,
            n => (n as u32 + 7).min(KEY_BITS),
        }
    }

    /// Derive the session key from a reference packet.
    ///
    /// Pure: the packet is not modified and nothing is kept between calls.
    /// Returns 0 when the reference was sent in clear (unencrypted feed).
    pub fn recover_key(&self, reference: &Packet) -> Result<u32, KeyRecoveryError> {
        match self.anchor(reference)? {
            Anchor::Plaintext => Ok(0),
            Anchor::Solver(solver) if solver.is_complete() => Ok(solver.key()),
            Anchor::Solver(solver) => Err(KeyRecoveryError::Underdetermined {
                resolved_bits: solver.resolved_bits(),
            }),
        }
    }

    /// Check the reference packet's shape and run the strict part of the solve.
    pub(crate) fn anchor(&self, reference: &Packet) -> Result<Anchor, KeyRecoveryError> {
        if reference.system_type() != Some(self.packet_type) {
            return Err(KeyRecoveryError::UnexpectedCategory {
                car: reference.car(),
                code: reference.type_code(),
            });
        }

        let payload = reference.payload();
        let in_clear = payload.starts_with(PLAINTEXT_PREFIX);
        if payload.len() != self.plaintext.len() {
            if in_clear {
                return Ok(Anchor::Plaintext);
            }
            return Err(KeyRecoveryError::UnexpectedLength {
                expected: self.plaintext.len(),
                actual: payload.len(),
            });
        }

        let mut solver = KeySolver::new();
        for (cipher, plain) in payload.iter().zip(self.plaintext.iter()) {
            if let Err(e) = solver.absorb(cipher ^ plain, Check::Strict) {
                if in_clear {
                    return Ok(Anchor::Plaintext);
                }
                return Err(e);
            }
        }

        debug!(
            resolved_bits = solver.resolved_bits(),
            "Validation marker anchored key solve"
        );
        Ok(Anchor::Solver(solver))
    }
}

impl Default for ValidationMarker {
    fn default() -> Self {
        Self::please_wait()
    }
}

/// Derive the session key from a "Please Wait ..." reference packet.
///
/// See [`ValidationMarker::recover_key`].
pub fn recover_key(reference: &Packet) -> Result<u32, KeyRecoveryError> {
    ValidationMarker::please_wait().recover_key(reference)
}
