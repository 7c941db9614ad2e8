//! Named, ordered processing stages of a single connection.
//!
//! The pipeline is the capability the host transport exposes for splicing:
//! stages can be inserted before a named anchor and removed by name. Both
//! inbound and outbound messages walk the stages in pipeline order until one
//! drops the message or the last stage (the host's terminal stage) is reached.
//!
//! The stage list is copy-on-write. Mutations are serialised by a mutex and
//! publish a fresh list; deliveries clone the current list and run without
//! holding the lock, so a splice never disturbs a message already in flight.

use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    connection::{ClientIdentity, ConnectionId},
    error::PipelineError,
    message::Message,
};

/// Direction of message travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Messages received from the client.
    Inbound,
    /// Messages sent to the client.
    Outbound,
}

impl Direction {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Outcome of passing a message through a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    /// Hand the message to the next stage.
    Forward,
    /// Stop processing; the message is not delivered.
    Drop,
}

impl Decision {
    /// `Drop` when `cancelled` is set, `Forward` otherwise.
    pub fn from_cancelled(cancelled: bool) -> Self {
        if cancelled { Decision::Drop } else { Decision::Forward }
    }

    /// Returns `true` for [`Decision::Forward`].
    #[must_use]
    pub fn is_forward(self) -> bool { matches!(self, Decision::Forward) }
}

/// Low-level view of the delivery a stage is handling.
#[derive(Clone, Copy, Debug)]
pub struct StageContext<'a> {
    /// Connection the message travels on.
    pub connection: ConnectionId,
    /// Remote address of the connection.
    pub remote: SocketAddr,
    /// Direction of travel.
    pub direction: Direction,
    /// Name of the stage currently handling the message.
    pub stage: &'a str,
    /// Authenticated client, if any.
    pub client: Option<&'a ClientIdentity>,
}

/// A unit of message processing installed in a [`Pipeline`].
pub trait Stage: Send + Sync {
    /// Process `message`, possibly editing it in place.
    fn handle(&self, ctx: &StageContext<'_>, message: &mut dyn Message) -> Decision;
}

impl<F> Stage for F
where
    F: Fn(&StageContext<'_>, &mut dyn Message) -> Decision + Send + Sync,
{
    fn handle(&self, ctx: &StageContext<'_>, message: &mut dyn Message) -> Decision {
        self(ctx, message)
    }
}

#[derive(Clone)]
pub(crate) struct NamedStage {
    pub(crate) name: Arc<str>,
    pub(crate) stage: Arc<dyn Stage>,
}

/// Ordered list of uniquely named stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Mutex<Arc<[NamedStage]>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.names()).finish()
    }
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `stage` at the end of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateStage`] if `name` is taken.
    pub fn add_last(&self, name: &str, stage: Arc<dyn Stage>) -> Result<(), PipelineError> {
        let mut guard = self.lock();
        let position = guard.len();
        Self::insert_at(&mut guard, position, name, stage)
    }

    /// Insert `stage` immediately before the stage named `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateStage`] if `name` is taken, or
    /// [`PipelineError::MissingAnchor`] if `anchor` is not installed.
    pub fn insert_before(
        &self,
        anchor: &str,
        name: &str,
        stage: Arc<dyn Stage>,
    ) -> Result<(), PipelineError> {
        let mut guard = self.lock();
        let position = guard
            .iter()
            .position(|s| &*s.name == anchor)
            .ok_or_else(|| PipelineError::MissingAnchor {
                stage: name.to_owned(),
                anchor: anchor.to_owned(),
            })?;
        Self::insert_at(&mut guard, position, name, stage)
    }

    /// Remove the stage named `name`, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] if no such stage is installed.
    pub fn remove(&self, name: &str) -> Result<Arc<dyn Stage>, PipelineError> {
        let mut guard = self.lock();
        let position = guard
            .iter()
            .position(|s| &*s.name == name)
            .ok_or_else(|| PipelineError::UnknownStage(name.to_owned()))?;
        let mut stages = guard.to_vec();
        let removed = stages.remove(position);
        *guard = stages.into();
        Ok(removed.stage)
    }

    /// Returns `true` if a stage named `name` is installed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.lock().iter().any(|s| &*s.name == name) }

    /// Stage names in pipeline order.
    #[must_use]
    pub fn names(&self) -> Vec<String> { self.lock().iter().map(|s| s.name.to_string()).collect() }

    pub(crate) fn snapshot(&self) -> Arc<[NamedStage]> { Arc::clone(&self.lock()) }

    fn insert_at(
        stages: &mut Arc<[NamedStage]>,
        position: usize,
        name: &str,
        stage: Arc<dyn Stage>,
    ) -> Result<(), PipelineError> {
        if stages.iter().any(|s| &*s.name == name) {
            return Err(PipelineError::DuplicateStage(name.to_owned()));
        }
        let mut next = stages.to_vec();
        next.insert(
            position,
            NamedStage {
                name: Arc::from(name),
                stage,
            },
        );
        *stages = next.into();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Arc<[NamedStage]>> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};

    use super::{Decision, Pipeline, Stage, StageContext};
    use crate::{error::PipelineError, message::Message};

    fn passthrough() -> Arc<dyn Stage> {
        Arc::new(|_: &StageContext<'_>, _: &mut dyn Message| Decision::Forward)
    }

    #[fixture]
    fn pipeline() -> Pipeline {
        let pipeline = Pipeline::new();
        pipeline.add_last("decoder", passthrough()).expect("add decoder");
        pipeline
            .add_last("packet_handler", passthrough())
            .expect("add terminal");
        pipeline
    }

    #[rstest]
    fn insert_before_places_stage_ahead_of_anchor(pipeline: Pipeline) {
        pipeline
            .insert_before("packet_handler", "tap", passthrough())
            .expect("insert tap");
        assert_eq!(pipeline.names(), ["decoder", "tap", "packet_handler"]);
    }

    #[rstest]
    fn duplicate_names_are_rejected(pipeline: Pipeline) {
        let err = pipeline
            .insert_before("packet_handler", "decoder", passthrough())
            .expect_err("duplicate must fail");
        assert_eq!(err, PipelineError::DuplicateStage("decoder".into()));
        assert_eq!(pipeline.names(), ["decoder", "packet_handler"]);
    }

    #[rstest]
    fn missing_anchor_is_reported(pipeline: Pipeline) {
        let err = pipeline
            .insert_before("nope", "tap", passthrough())
            .expect_err("missing anchor must fail");
        assert!(matches!(err, PipelineError::MissingAnchor { .. }));
        assert!(!pipeline.contains("tap"));
    }

    #[rstest]
    fn remove_unknown_stage_fails(pipeline: Pipeline) {
        assert!(pipeline.remove("decoder").is_ok());
        assert_eq!(
            pipeline.remove("decoder").err(),
            Some(PipelineError::UnknownStage("decoder".into()))
        );
    }

    #[rstest]
    fn snapshot_is_unaffected_by_later_mutation(pipeline: Pipeline) {
        let before = pipeline.snapshot();
        pipeline
            .insert_before("packet_handler", "tap", passthrough())
            .expect("insert tap");
        assert_eq!(before.len(), 2);
        assert_eq!(pipeline.snapshot().len(), 3);
    }
}
