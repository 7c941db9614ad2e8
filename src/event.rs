//! The view of one in-flight message handed to handlers and wait callbacks.

use std::fmt;

use crate::{
    connection::ClientIdentity,
    message::Message,
    pipeline::{Direction, StageContext},
};

/// One in-flight message of type `T`.
///
/// Wildcard handlers see `MessageEvent<'_, dyn Message>`; typed handlers see
/// the concrete message. The payload may be edited in place before it is
/// forwarded. Setting [`cancelled`](Self::set_cancelled) drops the message
/// once every handler has run.
pub struct MessageEvent<'a, T: ?Sized> {
    payload: &'a mut T,
    context: StageContext<'a>,
    cancelled: bool,
}

impl<'a, T: ?Sized> MessageEvent<'a, T> {
    /// Wrap `payload` for delivery on `context`.
    pub fn new(payload: &'a mut T, context: StageContext<'a>, cancelled: bool) -> Self {
        Self {
            payload,
            context,
            cancelled,
        }
    }

    /// The message.
    #[must_use]
    pub fn payload(&self) -> &T { &*self.payload }

    /// The message, for in-place edits.
    pub fn payload_mut(&mut self) -> &mut T { &mut *self.payload }

    /// The client the message is sent to or received from.
    ///
    /// `None` for messages exchanged before the client authenticated.
    #[must_use]
    pub fn client(&self) -> Option<&'a ClientIdentity> { self.context.client }

    /// Direction the message travels in.
    #[must_use]
    pub fn direction(&self) -> Direction { self.context.direction }

    /// Low-level delivery details for advanced handlers.
    #[must_use]
    pub fn context(&self) -> &StageContext<'a> { &self.context }

    /// Returns `true` if the message will be dropped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.cancelled }

    /// Change the cancellation state.
    ///
    /// Within one dispatch cancellation only escalates: clearing the flag
    /// after an earlier handler set it has no effect on the outcome.
    pub fn set_cancelled(&mut self, cancelled: bool) { self.cancelled = cancelled; }

    /// Shorthand for `set_cancelled(true)`.
    pub fn cancel(&mut self) { self.cancelled = true; }
}

impl<'a> MessageEvent<'a, dyn Message> {
    /// Run `f` against a typed view of this event if the payload is a `T`.
    ///
    /// The cancellation state set by `f` is written back to this event.
    /// Returns `None` without calling `f` when the payload has another type.
    pub fn with_typed<T, R>(&mut self, f: impl FnOnce(&mut MessageEvent<'_, T>) -> R) -> Option<R>
    where
        T: Message,
    {
        let payload = self.payload.downcast_mut::<T>()?;
        let mut typed = MessageEvent::new(payload, self.context, self.cancelled);
        let out = f(&mut typed);
        self.cancelled = typed.cancelled;
        Some(out)
    }

    /// Short type name of the payload.
    #[must_use]
    pub fn message_name(&self) -> &'static str { self.payload.name() }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MessageEvent<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("payload", &self.payload)
            .field("connection", &self.context.connection)
            .field("direction", &self.context.direction)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}
