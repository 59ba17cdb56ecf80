//! Thin pass-through adapter for realtime/duplex transports.
//!
//! The transport itself is out of scope. On upgrade, the adapter receives
//! the composed per-request context (decorators, derived and resolved
//! values already populated) and an optional response checker; it forwards
//! `open`/`message`/`drain`/`close` events to the handler and validates
//! every outbound send with the checker before the transport sees it.

use serde_json::Value;
use std::sync::Arc;
use weave_core::context::Context;
use weave_core::error::Failure;
use weave_core::schema::Checker;

/// Callbacks a duplex session forwards to.
pub trait DuplexHandler: Send + Sync {
    /// Connection established.
    fn on_open(&self, _ctx: &Context) {}

    /// Inbound message.
    fn on_message(&self, _ctx: &Context, _message: &Value) {}

    /// Transport write buffer drained.
    fn on_drain(&self, _ctx: &Context) {}

    /// Connection closed.
    fn on_close(&self, _ctx: &Context) {}
}

/// The pass-through adapter: lifecycle forwarding plus outbound
/// validation. Nothing else — buffering, backpressure and framing belong
/// to the transport.
pub struct RealtimeAdapter<H: DuplexHandler> {
    handler: H,
    checker: Option<Arc<dyn Checker>>,
}

impl<H: DuplexHandler> RealtimeAdapter<H> {
    /// Adapter without outbound validation.
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            checker: None,
        }
    }

    /// Attach the response checker reused from the route's schema.
    #[must_use]
    pub fn with_checker(mut self, checker: Arc<dyn Checker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Forward the open event.
    pub fn open(&self, ctx: &Context) {
        tracing::debug!(request_id = ctx.request_id(), "duplex connection opened");
        self.handler.on_open(ctx);
    }

    /// Forward an inbound message.
    pub fn message(&self, ctx: &Context, message: &Value) {
        self.handler.on_message(ctx, message);
    }

    /// Forward the drain event.
    pub fn drain(&self, ctx: &Context) {
        self.handler.on_drain(ctx);
    }

    /// Forward the close event.
    pub fn close(&self, ctx: &Context) {
        tracing::debug!(request_id = ctx.request_id(), "duplex connection closed");
        self.handler.on_close(ctx);
    }

    /// Validate an outbound message against the attached checker.
    ///
    /// # Errors
    ///
    /// A VALIDATION [`Failure`] carrying the checker's fault list.
    pub fn validate_outbound(&self, message: &Value) -> Result<(), Failure> {
        if let Some(checker) = &self.checker {
            if !checker.check(message) {
                return Err(Failure::validation("message", checker.errors(message)));
            }
        }
        Ok(())
    }
}
