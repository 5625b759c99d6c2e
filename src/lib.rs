//! # Live Timing
//!
//! Client-side plumbing for the live motorsport timing feed: incremental
//! packet framing over the raw byte stream and recovery of the key the
//! payloads are obfuscated with.
//!
//! ## Architecture
//! ```text
//! socket ─> StreamDriver ─> StreamFramer ─> Packet ─> TimingSession ─> handler
//!                                                       │
//!                                                       └─> KeyReverser ─> key
//! ```
//!
//! ## Modules
//! - [`core`]: packet model, stream framer, tokio codec, packet cache
//! - [`protocol`]: keystream and key recovery
//! - [`transport`]: connect and the polling read loop
//! - [`service`]: per-connection session wiring
//! - [`config`]: TOML / environment configuration
//! - [`utils`]: logging setup and metrics
//!
//! ## Example
//! ```no_run
//! use live_timing::config::TimingConfig;
//! use live_timing::service::TimingSession;
//! use live_timing::transport::StreamDriver;
//! use live_timing::Packet;
//!
//! # async fn run() -> live_timing::Result<()> {
//! let config = TimingConfig::from_env()?;
//! config.validate_strict()?;
//! live_timing::utils::logging::init_logging(&config.logging)?;
//!
//! let mut driver = StreamDriver::connect(config.stream).await?;
//! let mut session = TimingSession::from_config(&config.session, |packet: Packet| {
//!     println!("car {} type {} ({} bytes)", packet.car(), packet.type_code(), packet.len());
//! });
//! driver.run(&mut session).await?;
//! println!("session key: {:?}", session.key());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::cache::PacketCache;
pub use crate::core::codec::PacketCodec;
pub use crate::core::framer::{Packets, StreamFramer};
pub use crate::core::packet::{
    CarPacketType, FrameForm, Packet, PacketHeader, SystemPacketType, MAX_CAR_NUMBER,
    MAX_PACKET_LEN,
};
pub use crate::error::{FramingError, KeyRecoveryError, ProtocolError, Result};
pub use crate::protocol::key_recovery::{recover_key, ValidationMarker};
pub use crate::protocol::keystream::Keystream;
pub use crate::protocol::reverser::{KeyReverser, ReverserStatus};
