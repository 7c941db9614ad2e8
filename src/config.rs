//! Interceptor configuration.
//!
//! Stage names are the only coupling between `wiretap` and the host pipeline,
//! so they are configurable. The defaults match a host whose terminal
//! processing stage is named `packet_handler`.

use serde::Deserialize;

/// Default name of the host's terminal processing stage.
pub const DEFAULT_TERMINAL_STAGE: &str = "packet_handler";
/// Default name of the permanent interceptor stage.
pub const DEFAULT_INTERCEPTOR_STAGE: &str = "wiretap_interceptor";
/// Default prefix of transient wait stage names.
pub const DEFAULT_WAIT_STAGE_PREFIX: &str = "wiretap_wait_";

/// Names used when splicing stages into a connection pipeline.
///
/// Deserialises from any serde format; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Stage the interceptor is inserted before.
    pub terminal_stage: String,
    /// Name of the permanent interceptor stage.
    pub interceptor_stage: String,
    /// Prefix for transient wait stages; a unique suffix is appended.
    pub wait_stage_prefix: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            terminal_stage: DEFAULT_TERMINAL_STAGE.to_owned(),
            interceptor_stage: DEFAULT_INTERCEPTOR_STAGE.to_owned(),
            wait_stage_prefix: DEFAULT_WAIT_STAGE_PREFIX.to_owned(),
        }
    }
}

impl InterceptorConfig {
    /// Override the terminal stage name.
    #[must_use]
    pub fn with_terminal_stage(mut self, name: impl Into<String>) -> Self {
        self.terminal_stage = name.into();
        self
    }

    /// Override the permanent interceptor stage name.
    #[must_use]
    pub fn with_interceptor_stage(mut self, name: impl Into<String>) -> Self {
        self.interceptor_stage = name.into();
        self
    }

    /// Override the wait stage prefix.
    #[must_use]
    pub fn with_wait_stage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.wait_stage_prefix = prefix.into();
        self
    }
}
