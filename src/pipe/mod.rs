//! The pipe: a connected protocol session.
//!
//! [`PhevPipe`] owns a transport and drives the whole protocol over it:
//! handshake, keepalive pings, frame splitting, event dispatch and automatic
//! acknowledgement. It spawns nothing; the owner's task drives it through
//! [`PhevPipe::connect`] and [`PhevPipe::poll`]/[`PhevPipe::run`], so frames
//! are always processed strictly in arrival order.
//!
//! # Example
//!
//! ```no_run
//! use phevlink::handler::{EventContext, HandlerAction};
//! use phevlink::pipe::PhevPipe;
//! use phevlink::transport::TcpTransport;
//! use phevlink::PhevEvent;
//!
//! # async fn demo() -> phevlink::Result<()> {
//! let transport = TcpTransport::connect("192.168.8.46:8080").await?;
//! let mut pipe = PhevPipe::builder(transport).build();
//! pipe.register_handler(Box::new(|_: &mut EventContext<'_>, event: &PhevEvent| {
//!     println!("event: {event:?}");
//!     HandlerAction::Continue
//! }))?;
//! pipe.connect([0x24, 0x0d, 0xc2, 0x00, 0x00, 0x01]).await?;
//! pipe.run().await
//! # }
//! ```

mod stages;

pub use stages::{AckResponder, ConnectHook, Responder, ScrambleTransformer, Transformer};

use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{PhevError, Result};
use crate::event::{self, PhevEvent};
use crate::handler::{EventHandler, HandlerId, HandlerRegistry};
use crate::protocol::commands;
use crate::protocol::message::PhevMessage;
use crate::protocol::splitter::{FrameSplitter, Splitter};
use crate::transport::Transport;

/// Timing and buffer knobs for a pipe.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// How long to wait for a start acknowledgement per handshake attempt.
    pub connect_wait: Duration,
    /// Handshake attempts before giving up.
    pub max_connect_retries: u32,
    /// Keepalive cadence once connected.
    pub ping_interval: Duration,
    /// Upper bound on a single [`PhevPipe::poll`] transport read.
    pub read_timeout: Duration,
    /// Transport read buffer size.
    pub read_buffer_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            connect_wait: Duration::from_millis(1000),
            max_connect_retries: 5,
            ping_interval: Duration::from_secs(1),
            read_timeout: Duration::from_millis(100),
            read_buffer_size: 1024,
        }
    }
}

/// Builder for [`PhevPipe`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use phevlink::pipe::PhevPipe;
/// use phevlink::transport::StreamTransport;
///
/// let (stream, _peer) = tokio::io::duplex(256);
/// let pipe = PhevPipe::builder(StreamTransport::new(stream))
///     .ping_interval(Duration::from_secs(5))
///     .max_connect_retries(3)
///     .build();
/// assert!(!pipe.is_connected());
/// ```
pub struct PipeBuilder<T> {
    transport: T,
    config: PipeConfig,
    splitter: Box<dyn Splitter>,
    responder: Box<dyn Responder>,
    transformer: Box<dyn Transformer>,
    connect_hook: Option<ConnectHook>,
}

impl<T: Transport> PipeBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: PipeConfig::default(),
            splitter: Box::new(FrameSplitter::new()),
            responder: Box::new(AckResponder),
            transformer: Box::new(ScrambleTransformer::new()),
            connect_hook: None,
        }
    }

    pub fn config(mut self, config: PipeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connect_wait(mut self, wait: Duration) -> Self {
        self.config.connect_wait = wait;
        self
    }

    pub fn max_connect_retries(mut self, retries: u32) -> Self {
        self.config.max_connect_retries = retries;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Replace the frame splitter stage.
    pub fn splitter(mut self, splitter: impl Splitter + 'static) -> Self {
        self.splitter = Box::new(splitter);
        self
    }

    /// Replace the automatic-acknowledgement stage.
    pub fn responder(mut self, responder: impl Responder + 'static) -> Self {
        self.responder = Box::new(responder);
        self
    }

    /// Replace the outbound framing stage.
    pub fn transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Box::new(transformer);
        self
    }

    /// Run a callback before the handshake sequence starts.
    pub fn connect_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.connect_hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> PhevPipe<T> {
        PhevPipe {
            transport: self.transport,
            config: self.config,
            splitter: self.splitter,
            responder: self.responder,
            transformer: self.transformer,
            connect_hook: self.connect_hook,
            handlers: HandlerRegistry::new(),
            error_handler: None,
            state: ConnectionState::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    connected: bool,
    last_ping: Option<Instant>,
    ping_sequence: u8,
}

/// A protocol session over a [`Transport`].
pub struct PhevPipe<T> {
    transport: T,
    config: PipeConfig,
    splitter: Box<dyn Splitter>,
    responder: Box<dyn Responder>,
    transformer: Box<dyn Transformer>,
    connect_hook: Option<ConnectHook>,
    handlers: HandlerRegistry,
    error_handler: Option<Box<dyn FnMut(&PhevError) + Send>>,
    state: ConnectionState,
}

impl<T: Transport> PhevPipe<T> {
    /// Pipe with default configuration and stages.
    pub fn new(transport: T) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: T) -> PipeBuilder<T> {
        PipeBuilder::new(transport)
    }

    /// Whether the handshake has completed on this connection.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    /// Register an event handler; dispatch order is registration order.
    pub fn register_handler(&mut self, handler: Box<dyn EventHandler>) -> Result<HandlerId> {
        self.handlers.register(handler)
    }

    /// Remove a handler; affects subsequent dispatches only.
    pub fn deregister_handler(&mut self, id: HandlerId) -> bool {
        self.handlers.deregister(id)
    }

    /// Observe errors the pipe reports without aborting, e.g. a corrupt
    /// frame inside an otherwise good batch.
    pub fn on_error(&mut self, handler: impl FnMut(&PhevError) + Send + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    /// Send one message through the outbound framing stage.
    ///
    /// A transport failure tears the session down before the error is
    /// returned, same as a failed receive.
    pub async fn send(&mut self, message: &PhevMessage) -> Result<()> {
        let frame = self.transformer.encode_outbound(message);
        debug!(
            command = format_args!("{:#04x}", message.command),
            register = format_args!("{:#04x}", message.register),
            len = frame.len(),
            "sending frame"
        );
        if let Err(err) = self.transport.send(&frame).await {
            self.disconnect();
            let err = PhevError::Io(err);
            self.report(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Write `value` to a vehicle register.
    pub async fn update_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.send(&commands::simple_request(register, value)).await
    }

    /// Restart the keepalive sequence from zero.
    pub fn reset_ping(&mut self) {
        self.state.last_ping = None;
        self.state.ping_sequence = 0;
    }

    /// Perform the handshake: announce `mac`, confirm registration, and wait
    /// for the car's start acknowledgement.
    ///
    /// Retries up to `max_connect_retries` times, waiting `connect_wait` per
    /// attempt; exhaustion returns [`PhevError::HandshakeExhausted`] and is
    /// never retried internally.
    pub async fn connect(&mut self, mac: [u8; 6]) -> Result<()> {
        if let Some(hook) = &mut self.connect_hook {
            hook();
        }

        let attempts = self.config.max_connect_retries;
        for attempt in 1..=attempts {
            debug!(attempt, "handshake attempt");
            self.send(&commands::start(mac)).await?;
            self.send(&commands::registration_confirm()).await?;

            let deadline = Instant::now() + self.config.connect_wait;
            loop {
                let mut buf = vec![0u8; self.config.read_buffer_size];
                let read = match timeout_at(deadline, self.transport.receive(&mut buf)).await {
                    Err(_) => break,
                    Ok(result) => result,
                };
                match read {
                    Ok(0) => {
                        self.disconnect();
                        let err = PhevError::ConnectionClosed;
                        self.report(&err);
                        return Err(err);
                    }
                    Ok(n) => {
                        self.process_bytes(&buf[..n]).await?;
                        if self.state.connected {
                            debug!(attempt, "handshake acknowledged");
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        self.disconnect();
                        let err = PhevError::Io(err);
                        self.report(&err);
                        return Err(err);
                    }
                }
            }
        }

        let err = PhevError::HandshakeExhausted { attempts };
        self.report(&err);
        Err(err)
    }

    /// One scheduling step: send a ping if due, then perform one bounded
    /// transport read and process whatever arrived.
    ///
    /// A read timing out is not an error; the step simply completes.
    pub async fn poll(&mut self) -> Result<()> {
        self.maybe_ping().await?;

        let mut buf = vec![0u8; self.config.read_buffer_size];
        let read = match timeout(self.config.read_timeout, self.transport.receive(&mut buf)).await
        {
            Err(_) => return Ok(()),
            Ok(result) => result,
        };
        match read {
            Ok(0) => {
                self.disconnect();
                let err = PhevError::ConnectionClosed;
                self.report(&err);
                Err(err)
            }
            Ok(n) => self.process_bytes(&buf[..n]).await,
            Err(err) => {
                self.disconnect();
                let err = PhevError::Io(err);
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Drive the pipe until the transport fails or closes.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.poll().await?;
        }
    }

    async fn maybe_ping(&mut self) -> Result<()> {
        if !self.state.connected {
            return Ok(());
        }
        let due = match self.state.last_ping {
            None => true,
            Some(at) => at.elapsed() >= self.config.ping_interval,
        };
        if !due {
            return Ok(());
        }

        let sequence = self.state.ping_sequence;
        self.state.ping_sequence = sequence.wrapping_add(1);
        self.state.last_ping = Some(Instant::now());
        self.send(&commands::ping(sequence)).await
    }

    async fn process_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let split = self.splitter.push(bytes);
        if let Some(decode_err) = split.error {
            warn!(error = %decode_err, "undecodable bytes in batch");
            self.report(&PhevError::Decode(decode_err));
        }

        for decoded in split.frames {
            self.transformer.observe_inbound(decoded.framing);
            self.process_message(decoded.message).await?;
        }
        Ok(())
    }

    async fn process_message(&mut self, message: PhevMessage) -> Result<()> {
        debug!(
            command = format_args!("{:#04x}", message.command),
            register = format_args!("{:#04x}", message.register),
            request = message.is_request(),
            "frame received"
        );

        let mut replied = false;
        if let Some(event) = event::classify(&message) {
            if matches!(event, PhevEvent::StartAck { .. }) {
                self.state.connected = true;
                // Keepalive cadence counts from the handshake; the first
                // ping goes out one interval later.
                self.state.last_ping = Some(Instant::now());
            }
            let mut outbox = Vec::new();
            replied = self
                .handlers
                .dispatch(&message, self.state.connected, &mut outbox, &event);
            for queued in outbox {
                self.send(&queued).await?;
            }
        }

        if !replied {
            if let Some(reply) = self.responder.respond(&message) {
                self.send(&reply).await?;
            }
        }
        Ok(())
    }

    /// Tear down session state. The transport is left to the owner.
    pub fn disconnect(&mut self) {
        self.state.connected = false;
        self.state.last_ping = None;
        self.state.ping_sequence = 0;
        self.splitter.reset();
        self.transformer.reset();
        debug!("pipe disconnected");
    }

    fn report(&mut self, err: &PhevError) {
        if let Some(handler) = &mut self.error_handler {
            handler(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StreamTransport;
    use tokio::io::AsyncReadExt;

    fn duplex_pipe() -> (
        PhevPipe<StreamTransport<tokio::io::DuplexStream>>,
        tokio::io::DuplexStream,
    ) {
        let (near, far) = tokio::io::duplex(4096);
        (PhevPipe::new(StreamTransport::new(near)), far)
    }

    #[test]
    fn test_config_defaults() {
        let config = PipeConfig::default();
        assert_eq!(config.connect_wait, Duration::from_millis(1000));
        assert_eq!(config.max_connect_retries, 5);
        assert_eq!(config.ping_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_send_uses_classic_framing_without_session_key() {
        let (mut pipe, mut far) = duplex_pipe();
        pipe.update_register(0xaa, 0).await.unwrap();

        let mut buf = [0u8; 16];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0xf6, 0x04, 0x00, 0xaa, 0x00, 0xa4]);
    }

    #[tokio::test]
    async fn test_poll_timeout_is_not_an_error() {
        let (near, _far) = tokio::io::duplex(64);
        let mut pipe = PhevPipe::builder(StreamTransport::new(near))
            .read_timeout(Duration::from_millis(5))
            .build();
        pipe.poll().await.unwrap();
        assert!(!pipe.is_connected());
    }

    #[tokio::test]
    async fn test_reset_ping_restarts_sequence() {
        let (mut pipe, mut far) = duplex_pipe();
        pipe.state.connected = true;
        pipe.state.ping_sequence = 7;

        pipe.maybe_ping().await.unwrap();
        assert_eq!(pipe.state.ping_sequence, 8);

        let mut buf = [0u8; 16];
        let n = far.read(&mut buf).await.unwrap();
        // Ping sequence travels in the register field.
        assert_eq!(buf[3], 7);
        assert!(n >= 5);

        pipe.reset_ping();
        assert_eq!(pipe.state.ping_sequence, 0);
        assert!(pipe.state.last_ping.is_none());
    }

    #[tokio::test]
    async fn test_ping_respects_interval() {
        let (near, _far) = tokio::io::duplex(4096);
        let mut pipe = PhevPipe::builder(StreamTransport::new(near))
            .ping_interval(Duration::from_secs(60))
            .build();
        pipe.state.connected = true;

        pipe.maybe_ping().await.unwrap();
        let first = pipe.state.last_ping;
        pipe.maybe_ping().await.unwrap();

        // Second call inside the interval must not ping again.
        assert_eq!(pipe.state.ping_sequence, 1);
        assert_eq!(pipe.state.last_ping, first);
    }
}
