//! Splicing the permanent interceptor stage into new connections.
//!
//! When the host reports a client login, the [`Interceptor`] looks up the
//! client's connection and inserts a stage immediately before the host's
//! terminal stage. The stage hands every inbound and outbound message to the
//! [`Dispatcher`] and forwards it only when no handler cancelled it.
//!
//! Attaching is idempotent: the stage name is unique within a pipeline, so a
//! second attach is rejected by the pipeline itself rather than by a racy
//! check beforehand.

use std::{net::IpAddr, sync::Arc};

use log::{debug, warn};

use crate::{
    config::InterceptorConfig,
    connection::Connection,
    dispatch::Dispatcher,
    error::PipelineError,
    locator::ConnectionLocator,
    message::Message,
    pipeline::{Decision, Stage, StageContext},
    registry::HandlerRegistry,
    wait::Wait,
};

/// Lifecycle notification sent by the host when a client starts logging in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginAttempt {
    /// Name the client is logging in as.
    pub name: String,
    /// Address the client connected from.
    pub address: IpAddr,
}

impl LoginAttempt {
    /// Create a login notification.
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// The permanent per-connection stage.
struct InterceptorStage {
    dispatcher: Dispatcher,
}

impl Stage for InterceptorStage {
    fn handle(&self, ctx: &StageContext<'_>, message: &mut dyn Message) -> Decision {
        self.dispatcher.dispatch(message, ctx)
    }
}

/// Installs the interceptor stage on connections as clients log in.
pub struct Interceptor {
    dispatcher: Dispatcher,
    locator: Arc<dyn ConnectionLocator>,
    config: InterceptorConfig,
}

impl Interceptor {
    /// Create an interceptor dispatching to `registry` and resolving
    /// connections through `locator`.
    pub fn new(registry: Arc<HandlerRegistry>, locator: Arc<dyn ConnectionLocator>) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry),
            locator,
            config: InterceptorConfig::default(),
        }
    }

    /// Replace the stage naming configuration.
    #[must_use]
    pub fn with_config(mut self, config: InterceptorConfig) -> Self {
        self.config = config;
        self
    }

    /// Stage naming configuration.
    #[must_use]
    pub fn config(&self) -> &InterceptorConfig { &self.config }

    /// Handle a client login reported by the host.
    ///
    /// Resolves the client's connection and attaches the interceptor. A
    /// client that disconnected in the meantime is not an error; the
    /// notification is ignored. Returns the connection if it was found.
    pub fn on_client_login(&self, login: &LoginAttempt) -> Option<Arc<Connection>> {
        let Some(connection) = self.locator.locate(login.address) else {
            debug!(
                "no live connection for login: client={}, address={}",
                login.name, login.address
            );
            return None;
        };
        self.attach(&connection);
        Some(connection)
    }

    /// Insert the interceptor stage into `connection`'s pipeline.
    ///
    /// Returns `true` if the stage was inserted and `false` if it was already
    /// present or the pipeline could not take it.
    pub fn attach(&self, connection: &Connection) -> bool {
        let stage = Arc::new(InterceptorStage {
            dispatcher: self.dispatcher.clone(),
        });
        match connection.pipeline().insert_before(
            &self.config.terminal_stage,
            &self.config.interceptor_stage,
            stage,
        ) {
            Ok(()) => {
                debug!(
                    "interceptor attached: connection={}, remote={}",
                    connection.id(),
                    connection.remote()
                );
                true
            }
            Err(PipelineError::DuplicateStage(_)) => {
                debug!("interceptor already attached: connection={}", connection.id());
                false
            }
            Err(e) => {
                warn!(
                    "failed to attach interceptor: connection={}, remote={}, error={e}",
                    connection.id(),
                    connection.remote()
                );
                false
            }
        }
    }

    /// Returns `true` if the interceptor stage is installed on `connection`.
    #[must_use]
    pub fn is_attached(&self, connection: &Connection) -> bool {
        connection.pipeline().contains(&self.config.interceptor_stage)
    }

    /// Start building a wait for one `T` on `connection`, using this
    /// interceptor's stage names.
    #[must_use]
    pub fn wait<T: Message>(&self, connection: &Arc<Connection>) -> Wait<T> {
        Wait::new(connection).config(&self.config)
    }
}
