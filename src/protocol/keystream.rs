//! Session salt generator.
//!
//! The feed obfuscates payloads with a keystream derived from a 32-bit key:
//! a shift register seeded with [`CRYPTO_SEED`] is stepped once per payload
//! byte and its low byte is XORed into the data. The register runs across
//! packet boundaries and restarts from the seed whenever an event or key
//! frame packet is seen.

/// Initial salt value.
pub const CRYPTO_SEED: u32 = 0x5555_5555;

/// Salt register for one session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keystream {
    key: u32,
    salt: u32,
}

impl Keystream {
    /// Key 0 means the feed is not encrypted.
    pub fn new(key: u32) -> Self {
        Self {
            key,
            salt: CRYPTO_SEED,
        }
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn salt(&self) -> u32 {
        self.salt
    }

    /// Restart from the seed.
    pub fn reset(&mut self) {
        self.salt = CRYPTO_SEED;
    }

    /// Advance the register one step and return the byte it produces.
    #[inline]
    pub fn next_byte(&mut self) -> u8 {
        self.salt = step(self.salt, self.key);
        self.salt as u8
    }

    /// XOR the keystream into `buf` in place. Does nothing for key 0.
    pub fn apply(&mut self, buf: &mut [u8]) {
        if self.key == 0 {
            return;
        }
        for byte in buf {
            *byte ^= self.next_byte();
        }
    }
}

/// One register step.
#[inline]
pub(crate) fn step(salt: u32, key: u32) -> u32 {
    (salt >> 1) ^ if salt & 0x01 != 0 { key } else { 0 }
}
