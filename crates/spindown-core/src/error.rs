//! Error taxonomy and the observer dispatch shield.
//!
//! Configuration and usage errors are fatal at process start. Everything that
//! happens after the scheduler loop starts is recovered locally: actuation
//! failures are logged by the caller, and observer callbacks are wrapped in
//! [`shielded`] so a panicking observer cannot abort the loop or prevent the
//! remaining observers from being notified.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Startup-time failure. Both variants terminate the process with exit code 1.
#[derive(Debug)]
pub enum Error {
    /// Invalid or missing configuration.
    Configuration(String),
    /// Bad command-line usage.
    Usage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(message) | Self::Usage(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {}

/// Run an observer-facing callback, catching and logging any panic.
///
/// Observers contractually must not fail, but nothing in the pipeline is
/// allowed to propagate a panic into the scheduler's run loop, so every
/// notification call site goes through this wrapper.
pub fn shielded<F: FnOnce()>(context: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::error!("{context} panicked; continuing");
    }
}
