use common::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Time source for the limiter, swappable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Trailing window over which calls are counted
    pub window: Duration,
    /// Calls permitted inside one window
    pub max_calls: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_calls: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

/// Sliding-window admission gate for outbound calls.
///
/// Each admitted call records its timestamp; entries older than the window
/// are pruned lazily on the next check. Prune, check and record happen under
/// one lock so concurrent callers cannot over-admit.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            calls: Mutex::new(VecDeque::with_capacity(config.max_calls)),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    pub fn admit(&self) -> Admission {
        let mut calls = self.calls.lock();
        // Read under the lock so recorded timestamps stay in order.
        let now = self.clock.now();
        self.prune(&mut calls, now);

        if calls.len() >= self.config.max_calls {
            let wait = calls
                .front()
                .map(|oldest| self.config.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.config.window);
            let retry_after_secs = ceil_secs(wait).max(1);
            warn!(
                "Rate limit reached ({} calls in {:?}), retry after {}s",
                calls.len(),
                self.config.window,
                retry_after_secs
            );
            return Admission::Rejected { retry_after_secs };
        }

        calls.push_back(now);
        debug!(
            "Admitted outbound call ({}/{})",
            calls.len(),
            self.config.max_calls
        );
        Admission::Allowed
    }

    /// Like [`admit`](Self::admit) but surfaces a rejection as `Error::LocalRateLimited`.
    pub fn check(&self) -> Result<()> {
        match self.admit() {
            Admission::Allowed => Ok(()),
            Admission::Rejected { retry_after_secs } => Err(Error::LocalRateLimited {
                retry_after: retry_after_secs,
            }),
        }
    }

    /// Calls still available in the current window.
    pub fn remaining(&self) -> usize {
        let mut calls = self.calls.lock();
        let now = self.clock.now();
        self.prune(&mut calls, now);
        self.config.max_calls.saturating_sub(calls.len())
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.config.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
