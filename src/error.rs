//! Error types for pipeline splicing, handler discovery and handler calls.
//!
//! None of these errors are fatal. Pipeline and discovery errors are logged at
//! the boundary that observes them; handler errors are logged by the
//! [`Dispatcher`](crate::dispatch::Dispatcher) and the message keeps flowing.

use thiserror::Error;

/// Error returned by an application handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by application handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Failure to mutate a connection's [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A stage with this name is already installed.
    #[error("stage `{0}` is already installed")]
    DuplicateStage(String),
    /// No stage with this name is installed.
    #[error("stage `{0}` is not installed")]
    UnknownStage(String),
    /// The stage to insert before is not installed.
    #[error("cannot insert `{stage}`: anchor stage `{anchor}` is not installed")]
    MissingAnchor {
        /// Stage that was being inserted.
        stage: String,
        /// Stage it was meant to precede.
        anchor: String,
    },
}

/// Configuration problem found while registering a handler unit.
///
/// The offending handler is skipped; the rest of the unit is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// A handler was registered with an empty label.
    #[error("handler unit `{unit}` registered a handler without a label")]
    EmptyLabel {
        /// Unit that registered the handler.
        unit: &'static str,
    },
    /// The same label was registered twice for the same key by one unit.
    #[error("handler unit `{unit}` registered `{label}` twice for {key}")]
    DuplicateHandler {
        /// Unit that registered the handler.
        unit: &'static str,
        /// Label of the duplicated handler.
        label: String,
        /// Message type the handler was registered for.
        key: String,
    },
}
