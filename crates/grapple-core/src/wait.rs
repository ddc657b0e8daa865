//! Bounded condition polling.
//!
//! Nothing in the core sleeps unconditionally. A wait checks its condition,
//! sleeps one interval, and gives up with [`Error::Timeout`] once the bound
//! is spent. A [`CancelToken`] is honoured at every poll boundary.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default wait bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Shared flag that lets a caller abandon an in-progress wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll-and-sleep wait parameters.
#[derive(Debug, Clone)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
    cancel: Option<CancelToken>,
}

impl Default for Poll {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_INTERVAL)
    }
}

impl Poll {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            cancel: None,
        }
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }

    /// Check once, never sleep.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// The same wait with a different bound. Cancellation is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `check` until it yields `Some`, the bound elapses, or the wait is
    /// cancelled. The condition is always checked at least once.
    pub fn until<T, F>(&self, waited_for: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                debug!("wait for {} cancelled after {} polls", waited_for, polls);
                return Err(Error::Cancelled(waited_for.to_string()));
            }

            polls += 1;
            if let Some(value) = check()? {
                return Ok(value);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                debug!("wait for {} timed out after {} polls", waited_for, polls);
                return Err(Error::Timeout {
                    waited_for: waited_for.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            let remaining = self.timeout - elapsed;
            std::thread::sleep(self.interval.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_as_soon_as_condition_holds() {
        let poll = Poll::from_millis(1000, 1);
        let mut calls = 0;
        let got = poll
            .until("third call", || {
                calls += 1;
                Ok((calls == 3).then_some(calls))
            })
            .unwrap();
        assert_eq!(got, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn immediate_checks_exactly_once() {
        let mut calls = 0;
        let result: Result<()> = Poll::immediate().until("never", || {
            calls += 1;
            Ok(None)
        });
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn timeout_names_the_condition() {
        let err = Poll::from_millis(5, 1)
            .until::<(), _>("suggestions", || Ok(None))
            .unwrap_err();
        assert!(err.to_string().contains("suggestions"));
    }

    #[test]
    fn cancellation_is_seen_at_poll_boundary() {
        let token = CancelToken::new();
        let poll = Poll::from_millis(10_000, 1).with_cancel(token.clone());
        let mut calls = 0;
        let result: Result<()> = poll.until("dialog", || {
            calls += 1;
            if calls == 2 {
                token.cancel();
            }
            Ok(None)
        });
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(calls, 2);
    }

    #[test]
    fn check_errors_propagate() {
        let result: Result<()> = Poll::from_millis(1000, 1).until("x", || Err(Error::NoActiveAlert));
        assert!(matches!(result, Err(Error::NoActiveAlert)));
    }
}
