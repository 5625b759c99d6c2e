//! Tokio codec over the stream framer.
//!
//! Lets a timing connection be wrapped in `FramedRead`/`Framed`. Decoding
//! consumes exactly the bytes the framer used, so the framer's partial packet
//! and the codec's read buffer never overlap.

use bytes::{Buf, BufMut, BytesMut};
use std::time::SystemTime;
use tokio_util::codec::{Decoder, Encoder};

use super::framer::StreamFramer;
use super::packet::Packet;
use crate::error::{ProtocolError, Result};

#[derive(Debug, Default)]
pub struct PacketCodec {
    framer: StreamFramer,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_framer(framer: StreamFramer) -> Self {
        Self { framer }
    }

    pub fn framer(&self) -> &StreamFramer {
        &self.framer
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let mut input: &[u8] = &src[..];
        let packet = self.framer.next_packet(&mut input, SystemTime::now())?;
        let consumed = src.len() - input.len();
        src.advance(consumed);
        Ok(packet)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None if self.framer.buffered() > 0 => Err(ProtocolError::ConnectionClosed),
            None => Ok(None),
        }
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(2 + packet.len());
        dst.put_slice(&packet.header().as_bytes());
        dst.put_slice(packet.payload());
        Ok(())
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&Packet>::encode(self, &packet, dst)
    }
}
