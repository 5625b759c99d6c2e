//! # Error Types
//!
//! Error handling for the live timing feed.
//!
//! Three families of failure are kept apart so a caller can react to each
//! differently:
//!
//! ## Error Categories
//! - **Transport Errors**: resolution, connect and read failures. Fatal to the
//!   current connection attempt, retryable by whoever owns the reconnect policy.
//! - **Framing Errors**: an unrecognised category code or a header claiming more
//!   payload than the protocol allows. Fatal to the current stream; the framer
//!   refuses further input until it is reset.
//! - **Key Recovery Errors**: the reference packet has the wrong shape or fails
//!   the self-consistency check. Already framed packets stay valid.
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use live_timing::core::framer::StreamFramer;
//! use live_timing::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn frame_block(framer: &mut StreamFramer, block: &[u8]) -> Result<usize> {
//!     let mut count = 0;
//!     for packet in framer.feed(block) {
//!         packet.map_err(ProtocolError::Framing)?;
//!         count += 1;
//!     }
//!     Ok(count)
//! }
//!
//! let mut framer = StreamFramer::new();
//! match frame_block(&mut framer, &[0x21, 0x10, b'7']) {
//!     Ok(count) => info!(count, "Framed block"),
//!     Err(e) => error!(error = %e, "Framing failed"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_CONNECT_TIMEOUT: &str = "Timed out connecting to the timing server";
    pub const ERR_NO_ADDRESSES: &str = "Host name resolved to no addresses";

    /// Packet cache errors
    pub const ERR_CACHE_SIGNATURE: &str = "Unsupported packet cache file version";
    pub const ERR_CACHE_TRUNCATED: &str = "Packet cache file is truncated";
}

/// Protocol violations detected while framing the byte stream.
///
/// The framer cannot resynchronise on its own after any of these, so every
/// variant is fatal to the stream it was raised on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("Unknown packet category {code} (car {car})")]
    UnknownCategory { car: u8, code: u8 },

    #[error("Packet category {code} (car {car}) claims {claimed} payload bytes, limit is {limit}")]
    LengthExceedsMaximum {
        car: u8,
        code: u8,
        claimed: usize,
        limit: usize,
    },

    #[error("Frame holds {actual} bytes but its header announces {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Stream framer is poisoned by an earlier framing error")]
    Poisoned,
}

/// Reasons a decryption key could not be derived.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRecoveryError {
    #[error("Reference packet has category {code} (car {car}), not the validation marker")]
    UnexpectedCategory { car: u8, code: u8 },

    #[error("Reference packet carries {actual} payload bytes, expected {expected}")]
    UnexpectedLength { expected: usize, actual: usize },

    #[error("Derived key disagrees with the known plaintext at payload byte {offset}")]
    Inconsistent { offset: usize },

    #[error("Reference data resolves only {resolved_bits} of 32 key bits")]
    Underdetermined { resolved_bits: u32 },

    #[error("Packet category {code} may carry 8-bit plaintext and cannot extend the key")]
    UnreliablePlaintext { code: u8 },
}

// ProtocolError is the primary error type for all crate operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Key recovery error: {0}")]
    KeyRecovery(#[from] KeyRecoveryError),

    #[error("Packet cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
