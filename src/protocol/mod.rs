//! # Protocol Layer
//!
//! Payload obfuscation used by the timing feed and recovery of its key.
//!
//! ## Components
//! - **Keystream**: the seeded shift register that encrypts payload bytes
//! - **Key Recovery**: known-plaintext solve from the validation marker
//! - **Reverser**: finishes the solve over the packets that follow the marker
//!
//! ## Session Flow
//! ```text
//! EventId ─> Notice "Please Wait ..." ─> encrypted car/system packets ...
//!   reset      anchor (22 key bits)        one key bit per payload byte
//! ```
//! The key is fixed for a connection. The keystream restarts from its seed on
//! every event or key frame packet.

pub mod key_recovery;
pub mod keystream;
pub mod reverser;
