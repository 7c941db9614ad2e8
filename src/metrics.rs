//! Metric helpers for `wiretap`.
//!
//! This module defines metric names and small helpers wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::pipeline::Direction;

/// Name of the counter tracking messages passed through the dispatcher.
pub const MESSAGES_DISPATCHED: &str = "wiretap_messages_dispatched_total";
/// Name of the counter tracking messages dropped by handlers.
pub const MESSAGES_DROPPED: &str = "wiretap_messages_dropped_total";
/// Name of the counter tracking failed or panicking handler calls.
pub const HANDLER_FAILURES: &str = "wiretap_handler_failures_total";
/// Name of the counter tracking waits that expired.
///
/// Waits abandoned before resolving, such as an async wait whose future is
/// dropped, are not counted.
pub const WAIT_TIMEOUTS: &str = "wiretap_wait_timeouts_total";
/// Name of the gauge tracking installed wait stages.
pub const WAITS_PENDING: &str = "wiretap_waits_pending";

/// Record a dispatched message for the given direction.
pub fn inc_dispatched(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DISPATCHED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a dropped message for the given direction.
pub fn inc_dropped(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_DROPPED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a handler failure.
pub fn inc_handler_failures() {
    #[cfg(feature = "metrics")]
    counter!(HANDLER_FAILURES).increment(1);
}

/// Record an expired wait.
pub fn inc_wait_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(WAIT_TIMEOUTS).increment(1);
}

/// Increment the pending waits gauge.
pub fn inc_waits_pending() {
    #[cfg(feature = "metrics")]
    gauge!(WAITS_PENDING).increment(1.0);
}

/// Decrement the pending waits gauge.
pub fn dec_waits_pending() {
    #[cfg(feature = "metrics")]
    gauge!(WAITS_PENDING).decrement(1.0);
}
