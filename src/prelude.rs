//! Optional convenience imports for writing handler units.
//!
//! Host integration types (pipelines, locators, configuration) are left out;
//! import those from their owning modules.
//!
//! # Examples
//!
//! ```rust
//! use wiretap::prelude::*;
//!
//! #[derive(Debug)]
//! struct Chat;
//!
//! impl Message for Chat {}
//!
//! struct Moderation;
//!
//! impl HandlerUnit for Moderation {
//!     fn register(&self, handlers: &mut Handlers<'_>) {
//!         handlers.on("mute", |event: &mut MessageEvent<'_, Chat>| event.cancel());
//!     }
//! }
//! ```

pub use crate::{
    error::{HandlerError, HandlerResult},
    event::MessageEvent,
    message::Message,
    pipeline::Direction,
    registry::{HandlerUnit, Handlers},
    wait::{Wait, wait_for_message, wait_for_message_async},
};
