//! Byte transports the pipe can run over.
//!
//! The car's telemetry module speaks plain TCP on its own WiFi access point,
//! so [`TcpTransport`] is the transport used in practice; [`StreamTransport`]
//! generalizes to any async byte stream, which is what the integration tests
//! use via [`tokio::io::duplex`].

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// A bidirectional byte transport.
///
/// `receive` returning 0 means the peer closed the connection.
#[allow(async_fn_in_trait)]
pub trait Transport: Send {
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// [`Transport`] over any async byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Consume the transport, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }
}

/// TCP transport to the car's access point.
pub type TcpTransport = StreamTransport<TcpStream>;

impl TcpTransport {
    /// Connect to the telemetry module, typically `192.168.8.46:8080`.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        // Frames are tiny and latency-sensitive.
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            debug!(%peer, "transport connected");
        }
        Ok(Self::new(stream))
    }
}
