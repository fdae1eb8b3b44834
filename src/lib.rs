//! # phevlink
//!
//! Client library for the reverse-engineered WiFi remote-control protocol of
//! the Outlander PHEV's onboard telemetry module.
//!
//! The car runs a TCP service on its own access point and speaks a compact
//! binary framing: one-byte command, length, direction, register, a short
//! payload and an additive checksum. Later model years additionally XOR every
//! frame with a self-describing session key. This crate provides:
//!
//! - **[`protocol`]**: the message model, codec, obfuscation transform,
//!   frame splitter and command builders,
//! - **[`event`]**: classification of inbound frames into protocol events,
//! - **[`handler`]**: an ordered registry of application event handlers,
//! - **[`transport`]**: the TCP transport plus a generic stream adapter,
//! - **[`pipe`]**: the orchestrator tying it all together: handshake,
//!   keepalive pings, dispatch and automatic acknowledgement.
//!
//! ## Quick start
//!
//! ```no_run
//! use phevlink::handler::{EventContext, HandlerAction};
//! use phevlink::pipe::PhevPipe;
//! use phevlink::transport::TcpTransport;
//! use phevlink::PhevEvent;
//!
//! #[tokio::main]
//! async fn main() -> phevlink::Result<()> {
//!     let transport = TcpTransport::connect("192.168.8.46:8080").await?;
//!     let mut pipe = PhevPipe::builder(transport).build();
//!
//!     pipe.register_handler(Box::new(|_: &mut EventContext<'_>, event: &PhevEvent| {
//!         if let PhevEvent::VinDiscovered { vin, .. } = event {
//!             println!("connected to {vin}");
//!         }
//!         HandlerAction::Continue
//!     }))?;
//!
//!     pipe.connect([0x24, 0x0d, 0xc2, 0x00, 0x00, 0x01]).await?;
//!     pipe.run().await
//! }
//! ```

pub mod error;
pub mod event;
pub mod handler;
pub mod pipe;
pub mod protocol;
pub mod transport;

pub use error::{DecodeError, PhevError, Result};
pub use event::PhevEvent;
pub use handler::{EventContext, EventHandler, HandlerAction, HandlerId};
pub use pipe::{PhevPipe, PipeBuilder, PipeConfig};
pub use protocol::{Direction, PhevMessage};
pub use transport::{StreamTransport, TcpTransport, Transport};
