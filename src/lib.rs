#![doc(html_root_url = "https://docs.rs/wiretap/latest")]
//! Public API for the `wiretap` library.
//!
//! `wiretap` lets server-side code observe, edit and cancel individual
//! protocol messages on live client connections. A permanent interceptor
//! stage is spliced into each connection's pipeline when the client logs in;
//! it dispatches every message to the handlers registered for its type.
//! Transient wait stages let callers block, or await, until one message of a
//! given type passes through a specific connection.
//!
//! ```
//! use std::{
//!     net::{IpAddr, Ipv4Addr, SocketAddr},
//!     sync::Arc,
//! };
//!
//! use wiretap::{
//!     Connection,
//!     ConnectionId,
//!     ConnectionRegistry,
//!     Decision,
//!     Direction,
//!     HandlerRegistry,
//!     Handlers,
//!     Interceptor,
//!     LoginAttempt,
//!     Message,
//!     MessageEvent,
//!     Pipeline,
//!     StageContext,
//! };
//!
//! #[derive(Debug)]
//! struct Chat {
//!     text: String,
//! }
//!
//! impl Message for Chat {}
//!
//! let mut builder = HandlerRegistry::builder();
//! builder.register(&|h: &mut Handlers<'_>| {
//!     h.on("no_gg", |event: &mut MessageEvent<'_, Chat>| {
//!         if event.payload().text == "gg" {
//!             event.cancel();
//!         }
//!     });
//! });
//!
//! let pipeline = Pipeline::new();
//! pipeline
//!     .add_last(
//!         "packet_handler",
//!         Arc::new(|_: &StageContext<'_>, _: &mut dyn Message| Decision::Forward),
//!     )
//!     .expect("empty pipeline");
//! let address = IpAddr::V4(Ipv4Addr::LOCALHOST);
//! let connection = Arc::new(Connection::new(
//!     ConnectionId::new(1),
//!     SocketAddr::new(address, 40000),
//!     pipeline,
//! ));
//! let connections = Arc::new(ConnectionRegistry::new());
//! connections.insert(&connection);
//!
//! let interceptor = Interceptor::new(Arc::new(builder.build()), connections);
//! interceptor.on_client_login(&LoginAttempt::new("alex", address));
//!
//! let mut chat = Chat { text: "gg".into() };
//! assert_eq!(
//!     connection.deliver(Direction::Inbound, &mut chat),
//!     Decision::Drop
//! );
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod interceptor;
pub mod locator;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod prelude;
pub mod registry;
pub mod wait;

pub use config::InterceptorConfig;
pub use connection::{ClientIdentity, Connection, ConnectionId};
pub use dispatch::Dispatcher;
pub use error::{DiscoveryError, HandlerError, HandlerResult, PipelineError};
pub use event::MessageEvent;
pub use interceptor::{Interceptor, LoginAttempt};
pub use locator::{ConnectionLocator, ConnectionRegistry};
pub use message::Message;
pub use pipeline::{Decision, Direction, Pipeline, Stage, StageContext};
pub use registry::{HandlerEntry, HandlerKey, HandlerRegistry, HandlerUnit, Handlers, RegistryBuilder};
pub use wait::{Wait, spawn_wait_for_message, wait_for_message, wait_for_message_async};
