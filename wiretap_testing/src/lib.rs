//! Test helpers for exercising `wiretap` against an in-memory host.
//!
//! [`TestHost`] plays the part of the server: it owns a
//! [`ConnectionRegistry`](wiretap::ConnectionRegistry), opens connections whose
//! pipelines end in a [`RecordingTerminal`], and reports logins to an
//! [`Interceptor`](wiretap::Interceptor).
//!
//! ```rust
//! use wiretap::{Direction, HandlerRegistry, Message};
//! use wiretap_testing::TestHost;
//!
//! #[derive(Debug)]
//! struct Ping;
//!
//! impl Message for Ping {}
//!
//! let host = TestHost::new();
//! let interceptor = host.interceptor(HandlerRegistry::default());
//! let client = host.connect([10, 0, 0, 1]);
//! host.login(&interceptor, &client, "alex");
//!
//! client.send(Direction::Inbound, Ping);
//! assert_eq!(client.terminal.received(), ["Ping"]);
//! ```

pub mod host;
pub mod logging;

pub use host::{Recorded, RecordingTerminal, TERMINAL_STAGE, TestConnection, TestHost};
pub use logging::{LoggerHandle, logger};
