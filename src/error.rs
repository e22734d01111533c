//! Best-effort error policy.
//!
//! Nothing in the capture pipeline is allowed to take the process down.
//! Failures that are swallowed go through [`NonFatal`] so they are at least
//! visible in the log.

use std::fmt::Display;

/// Converts a `Result` into an `Option`, logging the error at warn level.
pub trait NonFatal<T> {
    fn non_fatal(self, tag: &str) -> Option<T>;
}

impl<T, E: Display> NonFatal<T> for Result<T, E> {
    fn non_fatal(self, tag: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("[{}] non-fatal: {}", tag, e);
                None
            }
        }
    }
}
