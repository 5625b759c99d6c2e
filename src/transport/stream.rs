//! Stream driver for the live timing socket.
//!
//! Owns the connection, reads with a bounded wait, keeps an idle connection
//! alive and feeds whatever arrives into a [`StreamFramer`]. The framer is
//! owned by the driver, so every connection gets its own partial-frame state.
//!
//! The server stops sending when it thinks nobody is listening. After
//! `idle_polls_before_ping` empty polls in a row the driver writes a single
//! ping byte, which is enough to wake it up.

use std::io;
use std::net::SocketAddr;
use std::time::SystemTime;

use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::StreamConfig;
use crate::core::codec::PacketCodec;
use crate::core::framer::StreamFramer;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::{global_metrics, Timer};

/// Consumer of framed packets, called in stream order.
pub trait PacketHandler {
    fn handle(&mut self, packet: Packet);
}

impl<F> PacketHandler for F
where
    F: FnMut(Packet),
{
    fn handle(&mut self, packet: Packet) {
        self(packet)
    }
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Bytes arrived; `packets` were completed by them.
    Data { bytes: usize, packets: usize },
    /// Nothing arrived within the poll interval.
    Idle,
    /// Nothing arrived and the keep-alive byte was written.
    PingSent,
    /// The peer closed the stream.
    Closed,
}

/// Resolve the configured host and connect to the first address that answers.
#[instrument(skip(config), fields(host = %config.host, port = config.port))]
pub async fn connect(config: &StreamConfig) -> Result<TcpStream> {
    let address = config.address();
    info!("Looking up timing server");

    let addrs: Vec<SocketAddr> = lookup_host(&address)
        .await
        .map_err(|source| {
            global_metrics().connection_error();
            ProtocolError::Resolve {
                host: config.host.clone(),
                source,
            }
        })?
        .collect();

    if addrs.is_empty() {
        global_metrics().connection_error();
        return Err(ProtocolError::Resolve {
            host: config.host.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, constants::ERR_NO_ADDRESSES),
        });
    }

    let mut last_error = String::from(constants::ERR_NO_ADDRESSES);
    for addr in addrs {
        debug!(%addr, "Trying address");
        match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                info!(%addr, "Connected to data stream");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_error = e.to_string();
            }
            Err(_) => {
                debug!(%addr, "Connect attempt timed out");
                last_error = constants::ERR_CONNECT_TIMEOUT.to_string();
            }
        }
    }

    global_metrics().connection_error();
    warn!(reason = %last_error, "Failed to connect to data stream");
    Err(ProtocolError::Connect {
        host: address,
        reason: last_error,
    })
}

/// Frame a read-only source (e.g. a recorded session) as a packet stream.
///
/// No keep-alive is sent; use [`StreamDriver`] for a live connection.
pub fn packet_stream<T>(io: T) -> impl Stream<Item = Result<Packet>>
where
    T: AsyncRead + Unpin,
{
    FramedRead::new(io, PacketCodec::new())
}

/// Read loop for one connection.
#[derive(Debug)]
pub struct StreamDriver<T> {
    io: T,
    framer: StreamFramer,
    buf: Vec<u8>,
    idle_polls: u32,
    config: StreamConfig,
    closed: bool,
}

impl StreamDriver<TcpStream> {
    /// Connect using [`connect`] and wrap the stream.
    pub async fn connect(config: StreamConfig) -> Result<Self> {
        let stream = connect(&config).await?;
        Ok(Self::new(stream, config))
    }
}

impl<T> StreamDriver<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T, config: StreamConfig) -> Self {
        global_metrics().connection_established();
        Self {
            io,
            framer: StreamFramer::new(),
            buf: vec![0; config.read_buffer_size.max(1)],
            idle_polls: 0,
            config,
            closed: false,
        }
    }

    pub fn framer(&self) -> &StreamFramer {
        &self.framer
    }

    /// Empty polls since the last data or ping.
    pub fn idle_polls(&self) -> u32 {
        self.idle_polls
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    /// Wait up to one poll interval for data and deliver the packets it
    /// completes.
    ///
    /// Packets completed before a framing error are delivered, then the
    /// error is returned; the stream cannot be framed any further.
    pub async fn poll_once<H>(&mut self, handler: &mut H) -> Result<PollOutcome>
    where
        H: PacketHandler + ?Sized,
    {
        if self.closed {
            return Ok(PollOutcome::Closed);
        }

        let read = timeout(self.config.poll_interval, self.io.read(&mut self.buf)).await;
        let n = match read {
            Err(_) => return self.on_idle().await,
            Ok(Ok(0)) => {
                self.mark_closed();
                return Ok(PollOutcome::Closed);
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "Read from data stream failed");
                return Err(e.into());
            }
        };

        self.idle_polls = 0;
        let metrics = global_metrics();
        metrics.bytes_read(n as u64);
        trace!(bytes = n, "Read block");

        let mut packets = 0;
        for packet in self.framer.feed_at(&self.buf[..n], SystemTime::now()) {
            match packet {
                Ok(packet) => {
                    metrics.packet_framed();
                    packets += 1;
                    handler.handle(packet);
                }
                Err(e) => {
                    metrics.framing_error();
                    return Err(e.into());
                }
            }
        }

        Ok(PollOutcome::Data { bytes: n, packets })
    }

    /// Poll until the peer closes the stream. Returns the packets delivered.
    #[instrument(skip(self, handler))]
    pub async fn run<H>(&mut self, handler: &mut H) -> Result<u64>
    where
        H: PacketHandler + ?Sized,
    {
        let _timer = Timer::start("stream_run");
        let mut total = 0u64;
        loop {
            match self.poll_once(handler).await? {
                PollOutcome::Data { packets, .. } => total += packets as u64,
                PollOutcome::Closed => return Ok(total),
                PollOutcome::Idle | PollOutcome::PingSent => {}
            }
        }
    }

    /// Like [`run`](Self::run), but also stops when `shutdown_rx` fires.
    #[instrument(skip(self, handler, shutdown_rx))]
    pub async fn run_with_shutdown<H>(
        &mut self,
        handler: &mut H,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<u64>
    where
        H: PacketHandler + ?Sized,
    {
        let mut total = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(packets = total, "Shutting down data stream");
                    self.mark_closed();
                    return Ok(total);
                }
                outcome = self.poll_once(handler) => match outcome? {
                    PollOutcome::Data { packets, .. } => total += packets as u64,
                    PollOutcome::Closed => return Ok(total),
                    PollOutcome::Idle | PollOutcome::PingSent => {}
                }
            }
        }
    }

    async fn on_idle(&mut self) -> Result<PollOutcome> {
        global_metrics().idle_poll();
        if self.idle_polls < self.config.idle_polls_before_ping {
            self.idle_polls += 1;
            return Ok(PollOutcome::Idle);
        }

        debug!("Sending ping");
        self.io.write_all(&[self.config.ping_byte]).await?;
        self.io.flush().await?;
        global_metrics().ping_sent();
        self.idle_polls = 0;
        Ok(PollOutcome::PingSent)
    }

    fn mark_closed(&mut self) {
        if !self.closed {
            self.closed = true;
            global_metrics().connection_closed();
            info!(buffered = self.framer.buffered(), "Data stream closed");
            global_metrics().log_metrics();
        }
    }
}
