//! # Service Layer
//!
//! Ties framing and key recovery together for one live connection.

pub mod session;

pub use session::TimingSession;
