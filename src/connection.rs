//! Host-owned connections that interceptors splice into.
//!
//! A [`Connection`] pairs a [`Pipeline`] with the identity of the client on
//! the other end. `wiretap` never creates or closes connections itself; the
//! host transport constructs them, delivers messages through
//! [`Connection::deliver`] and lends them out via a
//! [`ConnectionLocator`](crate::locator::ConnectionLocator).

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::OnceLock,
};

use crate::{
    message::Message,
    pipeline::{Decision, Direction, Pipeline, StageContext},
};

/// Identifier assigned to a connection by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Authenticated client on the far side of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    /// Name the client authenticated as.
    pub name: String,
    /// Address the client connected from.
    pub address: IpAddr,
}

impl ClientIdentity {
    /// Create a client identity.
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// One client's live duplex stream.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote: SocketAddr,
    pipeline: Pipeline,
    client: OnceLock<ClientIdentity>,
}

impl Connection {
    /// Wrap a host pipeline for the connection `id` from `remote`.
    #[must_use]
    pub fn new(id: ConnectionId, remote: SocketAddr, pipeline: Pipeline) -> Self {
        Self {
            id,
            remote,
            pipeline,
            client: OnceLock::new(),
        }
    }

    /// Host-assigned identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Remote address of the client.
    #[must_use]
    pub fn remote(&self) -> SocketAddr { self.remote }

    /// The connection's processing pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }

    /// Authenticated client, or `None` before authentication completes.
    #[must_use]
    pub fn client(&self) -> Option<&ClientIdentity> { self.client.get() }

    /// Record the authenticated client.
    ///
    /// Returns `false` if the connection was already authenticated; the first
    /// identity is kept.
    pub fn authenticate(&self, identity: ClientIdentity) -> bool {
        self.client.set(identity).is_ok()
    }

    /// Walk `message` through the pipeline in stage order.
    ///
    /// Returns [`Decision::Drop`] as soon as a stage drops the message and
    /// [`Decision::Forward`] if every stage, including the terminal one,
    /// forwarded it.
    pub fn deliver(&self, direction: Direction, message: &mut dyn Message) -> Decision {
        let stages = self.pipeline.snapshot();
        for named in stages.iter() {
            let ctx = StageContext {
                connection: self.id,
                remote: self.remote,
                direction,
                stage: &named.name,
                client: self.client(),
            };
            if named.stage.handle(&ctx, message) == Decision::Drop {
                return Decision::Drop;
            }
        }
        Decision::Forward
    }
}
