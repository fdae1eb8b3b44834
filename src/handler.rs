//! Event handler registration and dispatch.
//!
//! Handlers run synchronously, in registration order, on the task driving the
//! pipe. A handler can queue outbound messages through its [`EventContext`]
//! and can claim an inbound request by returning [`HandlerAction::Replied`],
//! which suppresses the pipe's automatic acknowledgement.

use tracing::debug;

use crate::error::{PhevError, Result};
use crate::event::PhevEvent;
use crate::protocol::message::PhevMessage;

/// Fixed handler table capacity.
pub const MAX_EVENT_HANDLERS: usize = 10;

/// Opaque handle returned by registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What a handler did with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Pass the event on; the pipe acknowledges the request if needed.
    Continue,
    /// The handler produced the reply itself; skip the automatic ack.
    Replied,
}

/// Context handed to each handler invocation.
pub struct EventContext<'a> {
    source: &'a PhevMessage,
    connected: bool,
    outbox: &'a mut Vec<PhevMessage>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        source: &'a PhevMessage,
        connected: bool,
        outbox: &'a mut Vec<PhevMessage>,
    ) -> Self {
        Self {
            source,
            connected,
            outbox,
        }
    }

    /// The raw message the event was classified from.
    #[inline]
    pub fn source(&self) -> &PhevMessage {
        self.source
    }

    /// Whether the handshake has completed on this connection.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queue a message; the pipe sends it after the current frame is
    /// fully processed.
    pub fn send(&mut self, message: PhevMessage) {
        self.outbox.push(message);
    }
}

/// The handler this trait is implemented for can be registered on a pipe.
///
/// Blanket-implemented for `FnMut` closures with the matching signature, so
/// most callers never implement it by hand.
pub trait EventHandler: Send {
    fn handle(&mut self, ctx: &mut EventContext<'_>, event: &PhevEvent) -> HandlerAction;
}

impl<F> EventHandler for F
where
    F: FnMut(&mut EventContext<'_>, &PhevEvent) -> HandlerAction + Send,
{
    fn handle(&mut self, ctx: &mut EventContext<'_>, event: &PhevEvent) -> HandlerAction {
        self(ctx, event)
    }
}

/// Ordered handler table with a fixed capacity.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<(HandlerId, Box<dyn EventHandler>)>,
    next_id: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at the end of the dispatch order.
    ///
    /// Fails with [`PhevError::HandlerCapacity`] when the table is full;
    /// nothing is evicted.
    pub fn register(&mut self, handler: Box<dyn EventHandler>) -> Result<HandlerId> {
        if self.handlers.len() >= MAX_EVENT_HANDLERS {
            return Err(PhevError::HandlerCapacity {
                max: MAX_EVENT_HANDLERS,
            });
        }
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        debug!(id = id.0, count = self.handlers.len(), "handler registered");
        Ok(id)
    }

    /// Remove a handler. Affects subsequent dispatches only; returns whether
    /// the id was present.
    pub fn deregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(hid, _)| *hid != id);
        before != self.handlers.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler against the event, in registration order, each to
    /// completion. Returns true when any handler claimed the reply.
    pub fn dispatch(
        &mut self,
        source: &PhevMessage,
        connected: bool,
        outbox: &mut Vec<PhevMessage>,
        event: &PhevEvent,
    ) -> bool {
        let mut replied = false;
        for (_, handler) in &mut self.handlers {
            let mut ctx = EventContext::new(source, connected, outbox);
            if handler.handle(&mut ctx, event) == HandlerAction::Replied {
                replied = true;
            }
        }
        replied
    }
}
