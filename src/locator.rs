//! Registry of live connections and lookup by client address.
//!
//! `ConnectionRegistry` stores non-owning weak references to host
//! [`Connection`]s, so a registered connection is released as soon as the host
//! drops it. Dead entries are pruned opportunistically during lookups.
//!
//! A client identifies itself before its game session exists, so the only
//! link between the login and the connection is the remote IP address. When
//! several connections share an address the newest one (highest
//! [`ConnectionId`]) wins, since it is the one currently logging in.

use std::{
    net::IpAddr,
    sync::{Arc, Weak},
};

use dashmap::DashMap;

use crate::connection::{Connection, ConnectionId};

/// Finds the live connection behind a newly authenticating client.
pub trait ConnectionLocator: Send + Sync {
    /// Return the connection opened from `address`, if it is still alive.
    fn locate(&self, address: IpAddr) -> Option<Arc<Connection>>;
}

/// Concurrent registry of connections keyed by [`ConnectionId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry(DashMap<ConnectionId, Weak<Connection>>);

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Retrieve a connection by id if it is still alive.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let guard = self.0.get(id);
        let conn = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if conn.is_none() {
            self.0.remove_if(id, |_, weak| weak.strong_count() == 0);
        }
        conn
    }

    /// Register a newly accepted connection.
    pub fn insert(&self, connection: &Arc<Connection>) {
        self.0.insert(connection.id(), Arc::downgrade(connection));
    }

    /// Forget a connection, typically on teardown.
    pub fn remove(&self, id: &ConnectionId) { self.0.remove(id); }

    /// Number of entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Returns `true` if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Prune stale entries, then collect the remaining live connections.
    #[must_use]
    pub fn active(&self) -> Vec<Arc<Connection>> {
        let mut live = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(conn) = weak.upgrade() {
                live.push(conn);
                true
            } else {
                false
            }
        });
        live
    }
}

impl ConnectionLocator for ConnectionRegistry {
    fn locate(&self, address: IpAddr) -> Option<Arc<Connection>> {
        self.active()
            .into_iter()
            .filter(|conn| conn.remote().ip() == address)
            .max_by_key(|conn| conn.id())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr, SocketAddr},
        sync::Arc,
    };

    use rstest::{fixture, rstest};

    use super::{ConnectionLocator, ConnectionRegistry};
    use crate::{
        connection::{Connection, ConnectionId},
        pipeline::Pipeline,
    };

    #[allow(
        unused_braces,
        reason = "rustc false positive for single-line rstest fixtures"
    )]
    #[fixture]
    fn registry() -> ConnectionRegistry { ConnectionRegistry::default() }

    fn connection(id: u64, ip: [u8; 4], port: u16) -> Arc<Connection> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port);
        Arc::new(Connection::new(ConnectionId::new(id), addr, Pipeline::new()))
    }

    #[rstest]
    fn get_returns_none_after_drop(registry: ConnectionRegistry) {
        let conn = connection(1, [10, 0, 0, 1], 4000);
        registry.insert(&conn);
        assert!(registry.get(&ConnectionId::new(1)).is_some());

        drop(conn);

        assert!(registry.get(&ConnectionId::new(1)).is_none());
        assert!(registry.is_empty());
    }

    #[rstest]
    fn locate_prefers_newest_connection_from_address(registry: ConnectionRegistry) {
        let old = connection(1, [10, 0, 0, 1], 4000);
        let other = connection(2, [10, 0, 0, 2], 4001);
        let new = connection(3, [10, 0, 0, 1], 4002);
        for conn in [&old, &other, &new] {
            registry.insert(conn);
        }

        let found = registry
            .locate(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
            .expect("connection should be located");
        assert_eq!(found.id(), ConnectionId::new(3));
    }

    #[rstest]
    fn locate_skips_dropped_connections(registry: ConnectionRegistry) {
        let conn = connection(5, [192, 168, 1, 9], 5000);
        registry.insert(&conn);
        drop(conn);

        assert!(registry.locate(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9))).is_none());
        assert_eq!(registry.len(), 0);
    }
}
