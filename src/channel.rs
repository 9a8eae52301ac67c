//! Bidirectional ordered text-frame channels.
//!
//! Frames are length-prefixed on the wire: a big-endian `u32` byte count
//! followed by that many bytes of UTF-8 text. Delivery preserves send order
//! and never duplicates, which the session layer relies on.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;

/// Maximum accepted frame length in bytes. Real frames here are one-line
/// JSON objects; anything approaching this bound is garbage.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// A reliable, ordered, bidirectional carrier of text frames.
///
/// `recv` is cancellation safe: implementations keep partially received
/// frames buffered internally, so dropping a `recv` future loses nothing.
/// That allows callers to poll `recv` inside `select!` loops.
#[async_trait::async_trait]
pub trait Channel: Send + Sync + std::fmt::Debug {
    /// Transmit one frame. Resolves once the frame is handed to the OS.
    async fn send(&mut self, frame: &str) -> anyhow::Result<()>;
    /// Next frame from the peer. Errors once the peer is gone.
    async fn recv(&mut self) -> anyhow::Result<String>;
}

/// Channel over a connected TCP stream.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    /// Inbound bytes read but not yet consumed as a whole frame.
    buf: Vec<u8>,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    /// Address of the peer on the far end of the stream.
    pub fn peer_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Extract one complete frame from the inbound buffer, if present.
    fn buffered_frame(&mut self) -> anyhow::Result<Option<String>> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len == 0 {
            anyhow::bail!("Invalid frame length: 0");
        }
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Frame too large: {} bytes (max: {})", len, MAX_FRAME_LEN);
        }
        let total = 4 + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let payload = self.buf[4..total].to_vec();
        self.buf.drain(..total);
        let text = String::from_utf8(payload)
            .map_err(|_| anyhow::anyhow!("Frame is not valid UTF-8"))?;
        Ok(Some(text))
    }
}

#[async_trait::async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        let data = frame.as_bytes();
        if data.len() as u64 > MAX_FRAME_LEN as u64 {
            anyhow::bail!("Frame too large: {} bytes (max: {})", data.len(), MAX_FRAME_LEN);
        }
        let len = (data.len() as u32).to_be_bytes();
        let write = async {
            self.stream.write_all(&len).await?;
            self.stream.write_all(data).await?;
            self.stream.flush().await
        };
        write.await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe
                || e.kind() == std::io::ErrorKind::ConnectionReset
            {
                anyhow::anyhow!("Connection closed by peer")
            } else {
                anyhow::anyhow!("Write error: {}", e)
            }
        })
    }

    async fn recv(&mut self) -> anyhow::Result<String> {
        loop {
            if let Some(frame) = self.buffered_frame()? {
                return Ok(frame);
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::ConnectionReset {
                    anyhow::anyhow!("Connection reset by peer")
                } else {
                    anyhow::anyhow!("Read error: {}", e)
                }
            })?;
            if n == 0 {
                anyhow::bail!("Connection closed by peer");
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// In-process channel pair joined back to back. Used by same-process
/// sessions and tests; no sockets involved.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryChannel {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (
            Self { tx: tx_a, rx: rx_b },
            Self { tx: tx_b, rx: rx_a },
        )
    }
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| anyhow::anyhow!("Channel closed"))
    }

    async fn recv(&mut self) -> anyhow::Result<String> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("Channel closed"))
    }
}
