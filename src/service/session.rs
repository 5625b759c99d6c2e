//! Per-connection timing session.
//!
//! [`TimingSession`] sits between the stream driver and the application: it
//! keeps every framed packet, runs key recovery over the stream and passes
//! each packet on, still encrypted, to the downstream handler. Once the key
//! is known the cached packets can be decrypted after the fact.
//!
//! The cache is bounded by [`SessionConfig::max_cached_packets`]. It always
//! holds a prefix of the connection, so the keystream stays aligned with it.

use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::core::cache::PacketCache;
use crate::core::packet::Packet;
use crate::protocol::key_recovery::ValidationMarker;
use crate::protocol::keystream::Keystream;
use crate::protocol::reverser::{KeyReverser, ReverserStatus};
use crate::transport::stream::PacketHandler;
use crate::utils::metrics::global_metrics;

/// Packet handler for one connection. Create a fresh one per connection.
#[derive(Debug)]
pub struct TimingSession<H> {
    reverser: KeyReverser,
    cache: PacketCache,
    cache_limit: usize,
    cache_full: bool,
    downstream: H,
}

impl<H> TimingSession<H>
where
    H: PacketHandler,
{
    pub fn new(downstream: H) -> Self {
        Self::with_marker(ValidationMarker::please_wait(), downstream)
    }

    pub fn with_marker(marker: ValidationMarker, downstream: H) -> Self {
        Self {
            reverser: KeyReverser::with_marker(marker),
            cache: PacketCache::new(),
            cache_limit: SessionConfig::default().max_cached_packets,
            cache_full: false,
            downstream,
        }
    }

    pub fn from_config(config: &SessionConfig, downstream: H) -> Self {
        Self::new(downstream).with_cache_limit(config.max_cached_packets)
    }

    /// Keep at most `limit` packets; 0 disables the cache.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    pub fn cache_limit(&self) -> usize {
        self.cache_limit
    }

    /// Session key, once recovered (0 for an unencrypted feed).
    pub fn key(&self) -> Option<u32> {
        self.reverser.key()
    }

    pub fn status(&self) -> ReverserStatus {
        self.reverser.status()
    }

    pub fn cache(&self) -> &PacketCache {
        &self.cache
    }

    /// Hand over the cached packets, leaving the cache empty.
    pub fn take_cache(&mut self) -> PacketCache {
        self.cache_full = false;
        std::mem::take(&mut self.cache)
    }

    pub fn downstream(&self) -> &H {
        &self.downstream
    }

    pub fn downstream_mut(&mut self) -> &mut H {
        &mut self.downstream
    }

    pub fn into_downstream(self) -> H {
        self.downstream
    }

    /// The cached packets with their payloads decrypted, if the key is known.
    ///
    /// Assumes the cache starts at the beginning of the connection, so the
    /// keystream position matches the first cached packet.
    pub fn decrypted_cache(&self) -> Option<Vec<Packet>> {
        let mut keystream = Keystream::new(self.key()?);
        let packets = self
            .cache
            .iter()
            .map(|packet| {
                let mut packet = packet.clone();
                if packet.resets_decryption() {
                    keystream.reset();
                } else if packet.is_encrypted() {
                    keystream.apply(packet.payload_mut());
                }
                packet
            })
            .collect();
        Some(packets)
    }
}

impl<H> PacketHandler for TimingSession<H>
where
    H: PacketHandler,
{
    fn handle(&mut self, packet: Packet) {
        let before = self.reverser.status();
        let after = self.reverser.observe(&packet);
        if after != before {
            match after {
                ReverserStatus::Recovered(key) => {
                    global_metrics().key_recovered();
                    info!(key = format_args!("{key:#010x}"), "Decryption key recovered");
                }
                ReverserStatus::Plaintext => {
                    global_metrics().key_recovered();
                    info!("Feed is not encrypted");
                }
                ReverserStatus::Failed(e) => {
                    global_metrics().key_recovery_failed();
                    warn!(error = %e, "Decryption key could not be recovered");
                }
                ReverserStatus::Start | ReverserStatus::InProgress { .. } => {}
            }
        }

        if self.cache.len() < self.cache_limit {
            self.cache.push(packet.clone());
        } else if !self.cache_full {
            self.cache_full = true;
            warn!(limit = self.cache_limit, "Packet cache full, later packets are not kept");
        }
        self.downstream.handle(packet);
    }
}
