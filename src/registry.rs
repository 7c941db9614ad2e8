//! Type-indexed handler registry and handler discovery.
//!
//! Handlers are contributed by [`HandlerUnit`]s through a [`Handlers`]
//! registrar while a [`RegistryBuilder`] is being populated. The message type
//! a handler is interested in comes from its signature: a handler taking
//! `&mut MessageEvent<'_, Chat>` is keyed by [`HandlerKey::Exact`] for `Chat`,
//! and one taking `&mut MessageEvent<'_, dyn Message>` by [`HandlerKey::Any`].
//!
//! Building freezes the registry. A [`HandlerRegistry`] has no mutating API,
//! so sharing it behind an `Arc` with every connection's dispatcher is the
//! barrier between discovery and traffic.
//!
//! ```
//! use wiretap::{HandlerRegistry, Message, MessageEvent, registry::Handlers};
//!
//! #[derive(Debug)]
//! struct Chat {
//!     text: String,
//! }
//!
//! impl Message for Chat {}
//!
//! let mut builder = HandlerRegistry::builder();
//! builder.register(&|handlers: &mut Handlers<'_>| {
//!     handlers.on("block_gg", |event: &mut MessageEvent<'_, Chat>| {
//!         if event.payload().text == "gg" {
//!             event.cancel();
//!         }
//!     });
//! });
//! let registry = builder.build();
//! assert_eq!(registry.len(), 1);
//! ```

use std::{
    any::{TypeId, type_name},
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    error::{DiscoveryError, HandlerResult},
    event::MessageEvent,
    message::{Message, short_name},
};

/// Type-erased handler callback stored by the registry.
pub type ErasedHandler =
    Arc<dyn Fn(&mut MessageEvent<'_, dyn Message>) -> HandlerResult + Send + Sync>;

/// Key a handler is registered under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// Handlers for exactly one message type.
    Exact(TypeId),
    /// Handlers invoked for every message type.
    Any,
}

impl HandlerKey {
    /// Key for messages of type `T`.
    #[must_use]
    pub fn of<T: Message>() -> Self { HandlerKey::Exact(TypeId::of::<T>()) }
}

/// Return values accepted from handlers.
///
/// Infallible handlers return `()`; fallible ones return [`HandlerResult`].
pub trait IntoHandlerResult {
    /// Convert into a [`HandlerResult`].
    ///
    /// # Errors
    ///
    /// Returns the handler's own error unchanged.
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult { Ok(()) }
}

impl IntoHandlerResult for HandlerResult {
    fn into_handler_result(self) -> HandlerResult { self }
}

/// A registered handler.
#[derive(Clone)]
pub struct HandlerEntry {
    label: Arc<str>,
    unit: &'static str,
    message: &'static str,
    callback: ErasedHandler,
}

impl HandlerEntry {
    /// Label the handler was registered with.
    #[must_use]
    pub fn label(&self) -> &str { &self.label }

    /// Name of the unit that registered the handler.
    #[must_use]
    pub fn unit(&self) -> &'static str { self.unit }

    /// Message type the handler was registered for, `*` for wildcards.
    #[must_use]
    pub fn message(&self) -> &'static str { self.message }

    pub(crate) fn call(&self, event: &mut MessageEvent<'_, dyn Message>) -> HandlerResult {
        (self.callback)(event)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("label", &self.label)
            .field("unit", &self.unit)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A source of handlers, registered once before traffic flows.
pub trait HandlerUnit {
    /// Register every handler this unit provides.
    fn register(&self, handlers: &mut Handlers<'_>);

    /// Name used in diagnostics.
    fn name(&self) -> &'static str { short_name(type_name::<Self>()) }
}

impl<F> HandlerUnit for F
where
    F: Fn(&mut Handlers<'_>),
{
    fn register(&self, handlers: &mut Handlers<'_>) { self(handlers); }

    fn name(&self) -> &'static str { "closure" }
}

/// Registrar handed to [`HandlerUnit::register`].
pub struct Handlers<'b> {
    unit: &'static str,
    builder: &'b mut RegistryBuilder,
}

impl Handlers<'_> {
    /// Register `handler` for messages of type `T`.
    ///
    /// A handler whose body always panics needs an explicit return type
    /// (`-> ()` or `-> HandlerResult`); otherwise its return type is inferred
    /// as `!`, which is not an [`IntoHandlerResult`].
    pub fn on<T, F, R>(&mut self, label: &str, handler: F) -> &mut Self
    where
        T: Message,
        F: Fn(&mut MessageEvent<'_, T>) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let callback: ErasedHandler = Arc::new(move |event: &mut MessageEvent<'_, dyn Message>| {
            event
                .with_typed(|typed: &mut MessageEvent<'_, T>| handler(typed).into_handler_result())
                .unwrap_or(Ok(()))
        });
        self.builder.push(
            self.unit,
            HandlerKey::of::<T>(),
            short_name(type_name::<T>()),
            label,
            callback,
        );
        self
    }

    /// Register `handler` for every message type.
    ///
    /// As with [`Handlers::on`], a handler that always panics needs an
    /// explicit return type.
    pub fn on_any<F, R>(&mut self, label: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut MessageEvent<'_, dyn Message>) -> R + Send + Sync + 'static,
        R: IntoHandlerResult,
    {
        let callback: ErasedHandler = Arc::new(move |event: &mut MessageEvent<'_, dyn Message>| {
            handler(event).into_handler_result()
        });
        self.builder
            .push(self.unit, HandlerKey::Any, "*", label, callback);
        self
    }
}

/// Mutable registry used during discovery.
#[derive(Default)]
pub struct RegistryBuilder {
    exact: HashMap<TypeId, Vec<HandlerEntry>>,
    wildcard: Vec<HandlerEntry>,
    seen: HashSet<(&'static str, HandlerKey, Arc<str>)>,
    errors: Vec<DiscoveryError>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register all handlers contributed by `unit`.
    ///
    /// Misconfigured handlers are logged, recorded and skipped; the rest of
    /// the unit is still registered.
    pub fn register<U>(&mut self, unit: &U) -> &mut Self
    where
        U: HandlerUnit + ?Sized,
    {
        let name = unit.name();
        let before = self.handler_count();
        unit.register(&mut Handlers {
            unit: name,
            builder: &mut *self,
        });
        debug!(
            "registered handler unit: unit={name}, handlers={}",
            self.handler_count() - before
        );
        self
    }

    /// Register several units in order.
    pub fn register_all<'u, I>(&mut self, units: I) -> &mut Self
    where
        I: IntoIterator<Item = &'u dyn HandlerUnit>,
    {
        for unit in units {
            self.register(unit);
        }
        self
    }

    /// Configuration errors reported so far.
    #[must_use]
    pub fn errors(&self) -> &[DiscoveryError] { &self.errors }

    /// Freeze the builder into an immutable registry.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            exact: self.exact,
            wildcard: self.wildcard,
        }
    }

    fn handler_count(&self) -> usize {
        self.wildcard.len() + self.exact.values().map(Vec::len).sum::<usize>()
    }

    fn push(
        &mut self,
        unit: &'static str,
        key: HandlerKey,
        message: &'static str,
        label: &str,
        callback: ErasedHandler,
    ) {
        if let Err(error) = self.validate(unit, key, message, label) {
            warn!("skipping misconfigured handler: {error}");
            self.errors.push(error);
            return;
        }
        let entry = HandlerEntry {
            label: Arc::from(label),
            unit,
            message,
            callback,
        };
        match key {
            HandlerKey::Exact(id) => self.exact.entry(id).or_default().push(entry),
            HandlerKey::Any => self.wildcard.push(entry),
        }
    }

    fn validate(
        &mut self,
        unit: &'static str,
        key: HandlerKey,
        message: &'static str,
        label: &str,
    ) -> Result<(), DiscoveryError> {
        if label.trim().is_empty() {
            return Err(DiscoveryError::EmptyLabel { unit });
        }
        if !self.seen.insert((unit, key, Arc::from(label))) {
            return Err(DiscoveryError::DuplicateHandler {
                unit,
                label: label.to_owned(),
                key: message.to_owned(),
            });
        }
        Ok(())
    }
}

/// Immutable map from message type to ordered handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    exact: HashMap<TypeId, Vec<HandlerEntry>>,
    wildcard: Vec<HandlerEntry>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("exact_types", &self.exact.len())
            .field("wildcard", &self.wildcard.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    /// Handlers for `message_type`, in dispatch order.
    ///
    /// Exact-type handlers come first in registration order, followed by
    /// wildcard handlers in registration order.
    pub fn lookup(&self, message_type: TypeId) -> impl Iterator<Item = &HandlerEntry> + '_ {
        self.exact
            .get(&message_type)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
    }

    /// Labels of the handlers [`lookup`](Self::lookup) would return.
    #[must_use]
    pub fn labels_for(&self, message_type: TypeId) -> Vec<&str> {
        self.lookup(message_type).map(HandlerEntry::label).collect()
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wildcard.len() + self.exact.values().map(Vec::len).sum::<usize>()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
