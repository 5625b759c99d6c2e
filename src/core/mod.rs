//! # Core Protocol Components
//!
//! Low-level packet handling: header decoding, incremental framing and the
//! tokio codec built on it.
//!
//! ## Components
//! - **Packet**: header bit fields, length rules, the `Packet` record
//! - **Framer**: stateful reassembly from arbitrarily chunked input
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Cache**: framed packets kept for later decryption or replay
//!
//! ## Wire Format
//! ```text
//! [Header(2)] [Payload(0..=127)]
//! ```
//! The payload length is not transmitted as such; it is derived from the
//! header using a category-specific rule.
//!
//! ## Safety
//! - Maximum packet size: 129 bytes, so the partial-frame buffer is fixed size
//! - Length validation before any payload byte is accepted

pub mod cache;
pub mod codec;
pub mod framer;
pub mod packet;
