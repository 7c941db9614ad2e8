//! Message abstraction shared by the pipeline, registry and wait primitive.
//!
//! Messages travel through a [`Pipeline`](crate::pipeline::Pipeline) as
//! `&mut dyn Message`. Handlers are keyed by the concrete type's [`TypeId`],
//! so the erased form offers the downcasts needed to recover it.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
};

/// Marker trait for protocol messages carried over a connection.
///
/// Implement it for each message type that handlers should be able to see.
///
/// ```
/// use wiretap::Message;
///
/// #[derive(Debug)]
/// struct Chat {
///     text: String,
/// }
///
/// impl Message for Chat {}
///
/// let mut chat = Chat { text: "hi".into() };
/// let erased: &mut dyn Message = &mut chat;
/// assert!(erased.is::<Chat>());
/// assert_eq!(erased.name(), "Chat");
/// ```
pub trait Message: AsAny + fmt::Debug + Send + 'static {}

/// Type-erasure helpers implemented for every [`Message`].
pub trait AsAny {
    /// Borrow the message as [`Any`].
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow the message as [`Any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Fully qualified type name of the concrete message.
    fn type_name(&self) -> &'static str;
}

impl<T: Message> AsAny for T {
    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn type_name(&self) -> &'static str { type_name::<T>() }
}

impl dyn Message {
    /// [`TypeId`] of the concrete message behind the trait object.
    #[must_use]
    pub fn message_type(&self) -> TypeId { Any::type_id(self.as_any()) }

    /// Short type name, without the module path, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str { short_name(self.type_name()) }

    /// Returns `true` when the concrete message is a `T`.
    #[must_use]
    pub fn is<T: Message>(&self) -> bool { self.as_any().is::<T>() }

    /// Downcast to a shared reference of the concrete message.
    #[must_use]
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> { self.as_any().downcast_ref() }

    /// Downcast to a mutable reference of the concrete message.
    pub fn downcast_mut<T: Message>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Strip the module path from a type name, keeping generic arguments intact.
pub(crate) fn short_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
