//! Dispatch of one intercepted message to its registered handlers.
//!
//! Handlers run synchronously, in [`HandlerRegistry::lookup`] order, on the
//! thread that delivered the message. The cancellation flag is threaded
//! through the chain: each handler sees the state left by the previous ones
//! and may only escalate it. A handler that returns an error or panics is
//! logged and skipped without touching the flag.

use std::sync::Arc;

use log::{error, warn};

use crate::{
    event::MessageEvent,
    message::Message,
    panic::catch_panic,
    pipeline::{Decision, StageContext},
    registry::HandlerRegistry,
};

/// Runs registered handlers against intercepted messages.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a frozen registry.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self { Self { registry } }

    /// Run every matching handler against `message`.
    ///
    /// Returns [`Decision::Drop`] if any handler cancelled the message.
    pub fn dispatch(&self, message: &mut dyn Message, ctx: &StageContext<'_>) -> Decision {
        let message_type = message.message_type();
        let name = message.name();
        let mut cancelled = false;

        for entry in self.registry.lookup(message_type) {
            let mut event = MessageEvent::new(&mut *message, *ctx, cancelled);
            match catch_panic(|| entry.call(&mut event)) {
                Ok(Ok(())) => cancelled |= event.is_cancelled(),
                Ok(Err(e)) => {
                    crate::metrics::inc_handler_failures();
                    warn!(
                        "handler failed: handler={}, unit={}, message={name}, direction={}, \
                         connection={}, error={e}",
                        entry.label(),
                        entry.unit(),
                        ctx.direction,
                        ctx.connection,
                    );
                }
                Err(panic) => {
                    crate::metrics::inc_handler_failures();
                    // Emit via both `log` and `tracing` for consumers that capture either.
                    error!(
                        "handler panicked: handler={}, unit={}, message={name}, panic={panic}",
                        entry.label(),
                        entry.unit(),
                    );
                    tracing::error!(
                        handler = entry.label(),
                        unit = entry.unit(),
                        message_type = name,
                        connection = %ctx.connection,
                        panic = %panic,
                        "handler panicked"
                    );
                }
            }
        }

        crate::metrics::inc_dispatched(ctx.direction);
        let decision = Decision::from_cancelled(cancelled);
        if decision == Decision::Drop {
            crate::metrics::inc_dropped(ctx.direction);
        }
        decision
    }
}
