//! # Packet Cache
//!
//! Ordered buffer of framed packets, optionally persisted to disk.
//!
//! Packets are cached exactly as framed, so encrypted payloads stay encrypted
//! and can be decrypted later, once a key is known. A saved cache can be
//! loaded again to replay a session.
//!
//! ## File Format
//! ```text
//! [Signature line] [bincode Vec<Packet>]
//! ```
//! The signature identifies the file version; any other version is rejected.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, instrument};

use super::packet::Packet;
use crate::error::{constants, ProtocolError, Result};

/// Version signature written at the start of every cache file.
pub const CACHE_SIGNATURE: &[u8] = b"live-timing packet cache v1\n";

#[derive(Debug, Clone, Default)]
pub struct PacketCache {
    packets: VecDeque<Packet>,
}

impl PacketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet at the tail.
    pub fn push(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    /// Oldest packet still cached.
    pub fn head(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// Remove and return the oldest packet.
    pub fn drop_head(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }

    /// Write every cached packet to `path`, replacing its contents.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display(), packets = self.len()))]
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(CACHE_SIGNATURE)?;
        bincode::serialize_into(&mut writer, &self.packets)?;
        writer.flush()?;
        debug!("Packet cache saved");
        Ok(())
    }

    /// Load a cache previously written by [`save_to`](Self::save_to).
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut signature = vec![0u8; CACHE_SIGNATURE.len()];
        reader.read_exact(&mut signature).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                ProtocolError::Cache(constants::ERR_CACHE_TRUNCATED.to_string())
            }
            _ => ProtocolError::Io(e),
        })?;
        if signature != CACHE_SIGNATURE {
            return Err(ProtocolError::Cache(
                constants::ERR_CACHE_SIGNATURE.to_string(),
            ));
        }

        let packets: VecDeque<Packet> = bincode::deserialize_from(&mut reader)?;
        debug!(packets = packets.len(), "Packet cache loaded");
        Ok(Self { packets })
    }
}

impl Extend<Packet> for PacketCache {
    fn extend<T: IntoIterator<Item = Packet>>(&mut self, iter: T) {
        self.packets.extend(iter);
    }
}

impl FromIterator<Packet> for PacketCache {
    fn from_iter<T: IntoIterator<Item = Packet>>(iter: T) -> Self {
        Self {
            packets: iter.into_iter().collect(),
        }
    }
}
