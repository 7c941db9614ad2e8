//! Containment of panics raised by application callbacks.
//!
//! Handler and wait callbacks run on the host's delivery thread. A panic must
//! not unwind into the host pipeline, so every callback is run through
//! [`catch_panic`] and the payload is formatted for the log.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use wiretap::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Run `f`, converting a panic into a [`PanicMessage`].
///
/// Callbacks only ever borrow per-message state that is discarded after the
/// call, so observing it after an unwind is not a concern.
///
/// # Errors
///
/// Returns the formatted panic payload if `f` panicked.
pub fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, PanicMessage> {
    catch_unwind(AssertUnwindSafe(f)).map_err(format_panic)
}

#[cfg(test)]
mod tests {
    use super::catch_panic;

    #[test]
    fn returns_value_when_no_panic() {
        assert_eq!(catch_panic(|| 7).ok(), Some(7));
    }

    #[test]
    fn captures_string_payload() {
        let err = catch_panic(|| -> u8 { panic!("handler {} failed", 3) })
            .expect_err("panic should be captured");
        assert_eq!(err.to_string(), "handler 3 failed");
    }
}
