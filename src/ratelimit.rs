//! Quieting repeated error log lines.
//!
//! A component that can fail over and over (a listener fed garbage, a sink
//! whose backend is down) owns an `ErrorLimiter`. The first few failures are
//! logged in full, then one line says reporting is paused, then nothing until
//! a success comes through.

use std::fmt;

/// Failures logged before reporting pauses.
pub const DEFAULT_THRESHOLD: usize = 3;

/// A per-component error reporter that goes quiet after `threshold`
/// consecutive failures and speaks up again after a success.
#[derive(Debug)]
pub struct ErrorLimiter {
    component: &'static str,
    threshold: usize,
    consecutive: usize,
    suppressed: usize,
}

impl ErrorLimiter {
    /// Create a limiter for `component` with the default threshold.
    pub fn new(component: &'static str) -> ErrorLimiter {
        ErrorLimiter::with_threshold(component, DEFAULT_THRESHOLD)
    }

    /// Create a limiter for `component` that logs `threshold` consecutive
    /// failures before pausing.
    pub fn with_threshold(component: &'static str, threshold: usize) -> ErrorLimiter {
        ErrorLimiter {
            component,
            threshold,
            consecutive: 0,
            suppressed: 0,
        }
    }

    /// Record a failure. Returns true if it was logged.
    pub fn report<E>(&mut self, err: E) -> bool
    where
        E: fmt::Display,
    {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive <= self.threshold {
            error!("[{}] {}", self.component, err);
            if self.consecutive == self.threshold {
                error!(
                    "[{}] error reporting paused until a good message arrives",
                    self.component
                );
            }
            true
        } else {
            self.suppressed = self.suppressed.saturating_add(1);
            false
        }
    }

    /// Record a success, resetting the count.
    pub fn reset(&mut self) {
        if self.suppressed > 0 {
            info!(
                "[{}] error reporting resumed, {} errors were not logged",
                self.component, self.suppressed
            );
        }
        self.consecutive = 0;
        self.suppressed = 0;
    }

    /// Is reporting currently paused?
    pub fn is_paused(&self) -> bool {
        self.consecutive >= self.threshold
    }

    /// Failures swallowed since reporting paused.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}
