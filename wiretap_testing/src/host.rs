//! In-memory host for integration tests.

use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use wiretap::{
    ClientIdentity,
    Connection,
    ConnectionId,
    ConnectionRegistry,
    Decision,
    Direction,
    HandlerRegistry,
    Interceptor,
    LoginAttempt,
    Message,
    Pipeline,
    Stage,
    StageContext,
    config::DEFAULT_WAIT_STAGE_PREFIX,
};

/// Name of the terminal stage installed by [`TestHost::connect`].
pub const TERMINAL_STAGE: &str = wiretap::config::DEFAULT_TERMINAL_STAGE;

/// A message that reached the terminal stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// Direction the message travelled in.
    pub direction: Direction,
    /// Short type name of the message.
    pub name: &'static str,
    /// `Debug` rendering of the message as delivered.
    pub rendered: String,
}

/// Terminal stage remembering every message that reached it.
#[derive(Debug, Default)]
pub struct RecordingTerminal {
    seen: Mutex<Vec<Recorded>>,
}

impl RecordingTerminal {
    /// Every recorded message, oldest first.
    #[must_use]
    pub fn recorded(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Type names of recorded messages, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<&'static str> {
        self.recorded().into_iter().map(|r| r.name).collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) { self.seen.lock().unwrap_or_else(PoisonError::into_inner).clear(); }
}

impl Stage for RecordingTerminal {
    fn handle(&self, ctx: &StageContext<'_>, message: &mut dyn Message) -> Decision {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Recorded {
                direction: ctx.direction,
                name: message.name(),
                rendered: format!("{message:?}"),
            });
        Decision::Forward
    }
}

/// A connection opened by [`TestHost`] together with its terminal stage.
#[derive(Clone, Debug)]
pub struct TestConnection {
    /// The connection as seen by `wiretap`.
    pub connection: Arc<Connection>,
    /// The stage at the end of its pipeline.
    pub terminal: Arc<RecordingTerminal>,
}

impl TestConnection {
    /// Deliver `message` and return the pipeline's decision.
    pub fn send(&self, direction: Direction, mut message: impl Message) -> Decision {
        self.connection.deliver(direction, &mut message)
    }

    /// Deliver `message`, returning it after the pipeline may have edited it.
    pub fn send_and_return<M: Message>(&self, direction: Direction, mut message: M) -> (Decision, M) {
        let decision = self.connection.deliver(direction, &mut message);
        (decision, message)
    }

    /// Returns `true` if a wait stage is installed.
    #[must_use]
    pub fn has_wait_stage(&self) -> bool {
        self.connection
            .pipeline()
            .names()
            .iter()
            .any(|name| name.starts_with(DEFAULT_WAIT_STAGE_PREFIX))
    }

    /// Poll until a wait stage is installed.
    ///
    /// # Panics
    ///
    /// Panics if none appears within five seconds.
    pub fn await_wait_stage(&self) {
        for _ in 0..1000 {
            if self.has_wait_stage() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("no wait stage installed on connection {}", self.connection.id());
    }
}

/// Server stand-in owning a connection registry.
#[derive(Debug, Default)]
pub struct TestHost {
    connections: Arc<ConnectionRegistry>,
    next_id: AtomicU64,
}

impl TestHost {
    /// Create a host with no connections.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Registry resolving client addresses to connections.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionRegistry> { &self.connections }

    /// Build an interceptor over this host's connections.
    #[must_use]
    pub fn interceptor(&self, registry: HandlerRegistry) -> Interceptor {
        Interceptor::new(Arc::new(registry), self.connections.clone())
    }

    /// Open a connection from `address` whose pipeline holds only the
    /// terminal stage.
    ///
    /// # Panics
    ///
    /// Never in practice; the pipeline is empty when the terminal is added.
    pub fn connect(&self, address: impl Into<IpAddr>) -> TestConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let terminal = Arc::new(RecordingTerminal::default());
        let pipeline = Pipeline::new();
        pipeline
            .add_last(TERMINAL_STAGE, terminal.clone())
            .expect("empty pipeline accepts the terminal stage");
        let port = u16::try_from(40_000 + id % 20_000).unwrap_or(40_000);
        let connection = Arc::new(Connection::new(
            ConnectionId::new(id),
            SocketAddr::new(address.into(), port),
            pipeline,
        ));
        self.connections.insert(&connection);
        TestConnection {
            connection,
            terminal,
        }
    }

    /// Complete a login for `client` and report it to `interceptor`.
    ///
    /// Returns `true` if the interceptor found a connection.
    pub fn login(&self, interceptor: &Interceptor, client: &TestConnection, name: &str) -> bool {
        let address = client.connection.remote().ip();
        client
            .connection
            .authenticate(ClientIdentity::new(name, address));
        interceptor
            .on_client_login(&LoginAttempt::new(name, address))
            .is_some()
    }

    /// Close `client`, dropping it from the registry.
    pub fn disconnect(&self, client: TestConnection) {
        self.connections.remove(&client.connection.id());
    }
}
