//! Sliding-window request pacing.
//!
//! The limiter remembers the instants of the most recent grants and makes a
//! caller wait until the oldest of them leaves the rolling window. Calls are
//! only ever delayed, never dropped. Time is read through [`Clock`] so the
//! pacing can be driven deterministically in tests.

use crate::domain::cancel::CancelToken;
use crate::domain::error::Cancelled;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default upstream ceiling: three requests per second.
pub const DEFAULT_REQUESTS_PER_SECOND: usize = 3;

/// Source of time for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block for `duration`, returning early with `Cancelled` if the token
    /// fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled>;
}

/// Wall clock; waits park on the cancel token.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.wait_timeout(duration)
    }
}

/// Clock that only moves when slept on. Sleeping advances it instantly.
///
/// Test support for driving a `RateLimiter` without real waits. Not part
/// of the documented API.
#[doc(hidden)]
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Durations of every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.check()?;
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
        Ok(())
    }
}

/// Allows at most `max_calls` acquisitions in any rolling `period`.
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    clock: Arc<dyn Clock>,
    granted: Mutex<VecDeque<Instant>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_calls", &self.max_calls)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration, clock: Arc<dyn Clock>) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            period,
            clock,
            granted: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// `requests` per second on the wall clock.
    pub fn per_second(requests: usize) -> Self {
        Self::new(requests, Duration::from_secs(1), Arc::new(SystemClock))
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Wait for a slot. Cancellation is checked before every attempt and
    /// interrupts a pending wait.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        loop {
            cancel.check()?;
            let wait = match self.try_acquire() {
                None => return Ok(()),
                Some(wait) => wait,
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            self.clock.sleep(wait, cancel)?;
        }
    }

    /// Grant a slot now, or return how long until one frees up.
    fn try_acquire(&self) -> Option<Duration> {
        let mut granted = self.granted.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        while let Some(&oldest) = granted.front() {
            if now.saturating_duration_since(oldest) >= self.period {
                granted.pop_front();
            } else {
                break;
            }
        }
        match granted.front() {
            Some(&oldest) if granted.len() >= self.max_calls => {
                Some(self.period - now.saturating_duration_since(oldest))
            }
            _ => {
                granted.push_back(now);
                None
            }
        }
    }
}
