//! # Transport Layer
//!
//! Connection to the timing server and the read loop that drives the framer.
//!
//! ## Components
//! - **Stream**: resolve/connect, bounded polling, keep-alive ping,
//!   packet delivery to a [`PacketHandler`](stream::PacketHandler)

pub mod stream;

pub use stream::{connect, packet_stream, PacketHandler, PollOutcome, StreamDriver};
