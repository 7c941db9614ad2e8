//! Waiting for exactly one message of a given type on a connection.
//!
//! A wait installs a transient stage immediately ahead of the permanent
//! interceptor (or ahead of the terminal stage when no interceptor is
//! attached), so the awaited message reaches the wait callback before any
//! registered handler. When the callback leaves the message uncancelled it is
//! forwarded and the wait resolves as matched; a cancelled message is dropped
//! and the wait keeps listening.
//!
//! The stage state moves from pending to matched or timed out exactly once,
//! under a mutex that is released while the callback runs. Whichever of the
//! matching message and the timeout gets there first decides the outcome; the
//! stage then forwards everything untouched until it is removed. Messages that
//! arrive while the callback is running, including ones the callback delivers
//! itself, are forwarded untouched. Removal is tied to a guard, so it happens
//! exactly once whether the wait matched, expired, or its future was dropped.
//!
//! ```no_run
//! use std::{
//!     sync::{Arc, Mutex},
//!     time::Duration,
//! };
//!
//! use wiretap::{Connection, Message, MessageEvent, wait::wait_for_message};
//!
//! #[derive(Debug)]
//! struct SignUpdate {
//!     lines: [String; 4],
//! }
//!
//! impl Message for SignUpdate {}
//!
//! fn read_sign(connection: &Arc<Connection>) -> Option<[String; 4]> {
//!     let lines = Arc::new(Mutex::new(None));
//!     let sink = Arc::clone(&lines);
//!     wait_for_message(
//!         connection,
//!         Some(Duration::from_secs(30)),
//!         move |event: &mut MessageEvent<'_, SignUpdate>| {
//!             *sink.lock().expect("lock") = Some(event.payload().lines.clone());
//!         },
//!     );
//!     lines.lock().expect("lock").take()
//! }
//! ```

use std::{
    marker::PhantomData,
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, error};
use tokio::{sync::Notify, task::JoinHandle};

use crate::{
    config::InterceptorConfig,
    connection::Connection,
    event::MessageEvent,
    message::Message,
    panic::catch_panic,
    pipeline::{Decision, Direction, Stage, StageContext},
};

static NEXT_WAIT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaitState {
    Pending,
    /// The callback is running on some delivery thread.
    InProgress,
    Matched,
    TimedOut,
    Abandoned,
}

impl WaitState {
    fn is_open(self) -> bool { matches!(self, WaitState::Pending | WaitState::InProgress) }
}

/// Transient stage watching for one `T`.
///
/// The state lock is never held while the callback runs, so a callback may
/// deliver on the same connection and a waiter can always observe expiry.
struct WaitStage<T, F> {
    state: Mutex<WaitState>,
    callback: Mutex<F>,
    resolved: Condvar,
    notify: Notify,
    direction: Option<Direction>,
    _message: PhantomData<fn(&mut T)>,
}

impl<T, F> WaitStage<T, F>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    fn new(callback: F, direction: Option<Direction>) -> Self {
        Self {
            state: Mutex::new(WaitState::Pending),
            callback: Mutex::new(callback),
            resolved: Condvar::new(),
            notify: Notify::new(),
            direction,
            _message: PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close a still-open wait as `outcome` and return the final state.
    fn close(state: &mut WaitState, outcome: WaitState) -> WaitState {
        if state.is_open() {
            *state = outcome;
        }
        *state
    }

    /// Expire a still-open wait and report whether it matched.
    fn expire(&self) -> bool {
        Self::close(&mut self.lock(), WaitState::TimedOut) == WaitState::Matched
    }

    fn block_until_resolved(&self, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        let open = |state: &mut WaitState| state.is_open();
        let mut guard = match timeout {
            Some(limit) => {
                self.resolved
                    .wait_timeout_while(guard, limit, open)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .resolved
                .wait_while(guard, open)
                .unwrap_or_else(PoisonError::into_inner),
        };
        Self::close(&mut guard, WaitState::TimedOut) == WaitState::Matched
    }

    async fn until_resolved(&self, timeout: Option<Duration>) -> bool {
        let notified = self.notify.notified();
        match timeout {
            Some(limit) => {
                // Expiry is decided by `expire`, not by the timeout result.
                let _ = tokio::time::timeout(limit, notified).await;
            }
            None => notified.await,
        }
        self.expire()
    }

    /// Run the callback, returning whether it asked for the message to be
    /// dropped. A panicking callback counts as a match.
    fn run_callback(&self, ctx: &StageContext<'_>, payload: &mut T) -> bool {
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        let mut event = MessageEvent::new(payload, *ctx, false);
        match catch_panic(|| (*callback)(&mut event)) {
            Ok(()) => event.is_cancelled(),
            Err(panic) => {
                error!(
                    "wait callback panicked: stage={}, connection={}, panic={panic}",
                    ctx.stage, ctx.connection
                );
                tracing::error!(stage = ctx.stage, connection = %ctx.connection, panic = %panic, "wait callback panicked");
                false
            }
        }
    }
}

impl<T, F> Stage for WaitStage<T, F>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    fn handle(&self, ctx: &StageContext<'_>, message: &mut dyn Message) -> Decision {
        if self.direction.is_some_and(|d| d != ctx.direction) {
            return Decision::Forward;
        }
        let Some(payload) = message.downcast_mut::<T>() else {
            return Decision::Forward;
        };
        {
            let mut state = self.lock();
            if *state != WaitState::Pending {
                return Decision::Forward;
            }
            *state = WaitState::InProgress;
        }

        let cancelled = self.run_callback(ctx, payload);

        let mut state = self.lock();
        if *state != WaitState::InProgress {
            // Expired or abandoned while the callback ran.
            return Decision::from_cancelled(cancelled);
        }
        if cancelled {
            *state = WaitState::Pending;
            return Decision::Drop;
        }
        *state = WaitState::Matched;
        drop(state);
        self.resolved.notify_all();
        self.notify.notify_one();
        Decision::Forward
    }
}

/// Keeps a wait stage installed; removes it exactly once on drop.
struct Installed<T, F>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    connection: Arc<Connection>,
    name: String,
    stage: Arc<WaitStage<T, F>>,
}

impl<T, F> Drop for Installed<T, F>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    fn drop(&mut self) {
        let outcome = WaitStage::<T, F>::close(&mut self.stage.lock(), WaitState::Abandoned);
        if let Err(e) = self.connection.pipeline().remove(&self.name) {
            debug!("wait stage already gone: stage={}, error={e}", self.name);
        }
        crate::metrics::dec_waits_pending();
        if outcome == WaitState::TimedOut {
            crate::metrics::inc_wait_timeouts();
        }
        debug!(
            "wait stage removed: stage={}, connection={}, outcome={outcome:?}",
            self.name,
            self.connection.id()
        );
    }
}

/// Builder for a wait on one message of type `T`.
#[must_use]
pub struct Wait<T> {
    connection: Arc<Connection>,
    timeout: Option<Duration>,
    direction: Option<Direction>,
    config: InterceptorConfig,
    _message: PhantomData<fn() -> T>,
}

impl<T: Message> Wait<T> {
    /// Wait on `connection` with no timeout, in either direction.
    pub fn new(connection: &Arc<Connection>) -> Self {
        Self {
            connection: Arc::clone(connection),
            timeout: None,
            direction: None,
            config: InterceptorConfig::default(),
            _message: PhantomData,
        }
    }

    /// Give up after `limit`; `None` waits indefinitely.
    pub fn timeout(mut self, limit: impl Into<Option<Duration>>) -> Self {
        self.timeout = limit.into();
        self
    }

    /// Only match messages travelling in `direction`.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Use the stage names from `config`.
    pub fn config(mut self, config: &InterceptorConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Block the calling thread until a message matches or the wait expires.
    ///
    /// Returns `true` if a message matched. Do not call this from an async
    /// task; use [`Wait::run`] there.
    pub fn block<F>(self, callback: F) -> bool
    where
        F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
    {
        let Some(installed) = self.install(callback) else {
            return false;
        };
        installed.stage.block_until_resolved(self.timeout)
    }

    /// Wait asynchronously until a message matches or the wait expires.
    ///
    /// Dropping the future removes the stage.
    pub async fn run<F>(self, callback: F) -> bool
    where
        F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
    {
        let Some(installed) = self.install(callback) else {
            return false;
        };
        installed.stage.until_resolved(self.timeout).await
    }

    /// Run the wait on a new tokio task, calling `on_timeout` if it expires.
    ///
    /// The task's output reports whether a message matched. Must be called
    /// from within a tokio runtime.
    pub fn spawn<F, G>(self, callback: F, on_timeout: G) -> JoinHandle<bool>
    where
        F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            let connection = self.connection.id();
            let matched = self.run(callback).await;
            if !matched {
                if let Err(panic) = catch_panic(on_timeout) {
                    error!("wait timeout callback panicked: connection={connection}, panic={panic}");
                }
            }
            matched
        })
    }

    fn install<F>(&self, callback: F) -> Option<Installed<T, F>>
    where
        F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
    {
        let name = format!(
            "{}{}",
            self.config.wait_stage_prefix,
            NEXT_WAIT_ID.fetch_add(1, Ordering::Relaxed)
        );
        let stage = Arc::new(WaitStage::new(callback, self.direction));
        let pipeline = self.connection.pipeline();
        // An interceptor attached after this check lands between the wait
        // stage and the terminal stage, which keeps the wait ahead of it.
        let anchor = if pipeline.contains(&self.config.interceptor_stage) {
            &self.config.interceptor_stage
        } else {
            &self.config.terminal_stage
        };
        let erased: Arc<dyn Stage> = stage.clone();
        if let Err(e) = pipeline.insert_before(anchor, &name, erased) {
            debug!(
                "cannot install wait stage: connection={}, error={e}",
                self.connection.id()
            );
            return None;
        }
        crate::metrics::inc_waits_pending();
        debug!(
            "wait stage installed: stage={name}, connection={}, anchor={anchor}",
            self.connection.id()
        );
        Some(Installed {
            connection: Arc::clone(&self.connection),
            name,
            stage,
        })
    }
}

/// Block until one `T` passes through `connection`, or `timeout` expires.
///
/// Returns `true` if a message matched. `None` waits indefinitely.
pub fn wait_for_message<T, F>(
    connection: &Arc<Connection>,
    timeout: Option<Duration>,
    callback: F,
) -> bool
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    Wait::new(connection).timeout(timeout).block(callback)
}

/// Wait for one `T` on a separate task, calling `on_timeout` if none arrives
/// within `timeout`.
pub fn wait_for_message_async<T, F, G>(
    connection: &Arc<Connection>,
    timeout: Option<Duration>,
    callback: F,
    on_timeout: G,
) -> JoinHandle<bool>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
    G: FnOnce() + Send + 'static,
{
    Wait::new(connection).timeout(timeout).spawn(callback, on_timeout)
}

/// Wait for one `T` on a separate task with no timeout.
pub fn spawn_wait_for_message<T, F>(connection: &Arc<Connection>, callback: F) -> JoinHandle<bool>
where
    T: Message,
    F: FnMut(&mut MessageEvent<'_, T>) + Send + 'static,
{
    Wait::new(connection).spawn(callback, || {})
}
