use log::{debug, trace};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum::Display;
use tokio::time::Instant;

use super::config::RateLimitConfig;
use super::window::Window;
use crate::Result;

/// Length of the per-minute windows
const MINUTE: Duration = Duration::from_secs(60);

/// Length of the per-day window
const DAY: Duration = Duration::from_secs(86_400);

/// Applied to the wait when only the token budget is exhausted.
/// Token cost frees up unevenly, so per-entry estimates run short.
const TOKEN_BOUND_FACTOR: f64 = 1.5;

/// Growth of the wait for every re-poll of the same call
const BACKOFF_FACTOR: f64 = 1.1;

/// Upper bound for a single poll interval
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lower bound for a single poll interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One of the three budgets checked before every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Gate {
    /// Calls in the last minute
    #[strum(serialize = "requests/minute")]
    RequestsPerMinute,
    /// Token cost in the last minute
    #[strum(serialize = "tokens/minute")]
    TokensPerMinute,
    /// Calls in the last day
    #[strum(serialize = "requests/day")]
    RequestsPerDay,
}

/// Snapshot of the windowed sums of a [`RateLimiter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateUsage {
    /// Calls admitted in the last minute
    pub requests_last_minute: u64,
    /// Token cost admitted in the last minute
    pub tokens_last_minute: u64,
    /// Calls admitted in the last day
    pub requests_last_day: u64,
}

#[derive(Debug)]
struct Windows {
    requests_per_minute: Window,
    tokens_per_minute: Window,
    requests_per_day: Window,
}

impl Windows {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_minute: Window::new(MINUTE, config.max_requests_per_minute),
            tokens_per_minute: Window::new(MINUTE, config.max_tokens_per_minute),
            requests_per_day: Window::new(DAY, config.max_requests_per_day),
        }
    }

    fn prune(&mut self, now: Instant) {
        self.requests_per_minute.prune(now);
        self.tokens_per_minute.prune(now);
        self.requests_per_day.prune(now);
    }

    /// All gates without headroom for a call of `cost`
    fn blocked(&self, cost: u64) -> Vec<Gate> {
        let mut blocked = Vec::new();
        if !self.requests_per_minute.has_headroom(1) {
            blocked.push(Gate::RequestsPerMinute);
        }
        if !self.tokens_per_minute.has_headroom(cost) {
            blocked.push(Gate::TokensPerMinute);
        }
        if !self.requests_per_day.has_headroom(1) {
            blocked.push(Gate::RequestsPerDay);
        }
        blocked
    }

    const fn window(&self, gate: Gate) -> &Window {
        match gate {
            Gate::RequestsPerMinute => &self.requests_per_minute,
            Gate::TokensPerMinute => &self.tokens_per_minute,
            Gate::RequestsPerDay => &self.requests_per_day,
        }
    }

    fn admit(&mut self, now: Instant, cost: u64) {
        self.requests_per_minute.push(now, 1);
        self.tokens_per_minute.push(now, cost);
        self.requests_per_day.push(now, 1);
    }

    /// Time to sleep before the `attempt`-th re-check of a blocked call
    fn wait_for(&self, blocked: &[Gate], now: Instant, attempt: u32) -> Duration {
        let mut estimate = Duration::ZERO;
        let mut earliest_headroom = Duration::ZERO;
        for gate in blocked {
            let window = self.window(*gate);
            if let Some(wait) = window.per_entry_wait(now) {
                estimate = estimate.max(wait);
            }
            if let Some(wait) = window.until_oldest_expires(now) {
                earliest_headroom = earliest_headroom.max(wait);
            }
        }

        if blocked == [Gate::TokensPerMinute] {
            estimate = estimate.mul_f64(TOKEN_BOUND_FACTOR);
        }

        #[allow(clippy::cast_possible_wrap)]
        let growth = BACKOFF_FACTOR.powi(attempt.min(64) as i32);
        estimate
            .mul_f64(growth)
            .min(MAX_POLL_INTERVAL)
            .min(earliest_headroom)
            .max(MIN_POLL_INTERVAL)
    }

    fn usage(&self) -> RateUsage {
        RateUsage {
            requests_last_minute: self.requests_per_minute.total(),
            tokens_last_minute: self.tokens_per_minute.total(),
            requests_last_day: self.requests_per_day.total(),
        }
    }
}

/// Sliding-window rate limiter for requests/minute, tokens/minute and
/// requests/day.
///
/// All three budgets are checked together and a call is admitted only when
/// every one of them has headroom. Blocked callers sleep for a computed
/// duration instead of a fixed interval and never fail.
///
/// # Examples
///
/// ```
/// use quotaflow_lib::ratelimit::{RateLimitConfig, RateLimiter};
///
/// # #[tokio::main]
/// # async fn main() -> quotaflow_lib::Result<()> {
/// let limiter = RateLimiter::new(RateLimitConfig::new(60, 100_000, 1_000))?;
/// limiter.wait_for_slot(1_200).await;
/// assert_eq!(limiter.usage().requests_last_minute, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    /// Create a new limiter enforcing `config`
    ///
    /// # Errors
    ///
    /// Returns an error if any budget in `config` is zero.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            windows: Mutex::new(Windows::new(&config)),
        })
    }

    /// The budgets enforced by this limiter
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a call with the given estimated token cost may be issued,
    /// then record it.
    ///
    /// A non-positive estimate is treated as a cost of 1.
    pub async fn wait_for_slot(&self, estimated_cost: i64) {
        let cost = clamp_cost(estimated_cost);
        let mut attempt: u32 = 0;

        loop {
            let now = Instant::now();
            let wait = match self.check(cost, now, attempt) {
                Ok(()) => {
                    if attempt > 0 {
                        trace!("Rate gate passed after {attempt} re-checks (cost {cost})");
                    }
                    return;
                }
                Err(wait) => wait,
            };

            attempt = attempt.saturating_add(1);
            tokio::time::sleep_until(now + wait).await;
        }
    }

    /// Record a call if every budget has headroom right now.
    ///
    /// # Errors
    ///
    /// Returns the computed wait if the call would exceed a budget.
    pub fn try_acquire(&self, estimated_cost: i64) -> std::result::Result<(), Duration> {
        self.check(clamp_cost(estimated_cost), Instant::now(), 0)
    }

    /// Current windowed sums
    #[must_use]
    pub fn usage(&self) -> RateUsage {
        let mut windows = self.lock();
        windows.prune(Instant::now());
        windows.usage()
    }

    fn check(&self, cost: u64, now: Instant, attempt: u32) -> std::result::Result<(), Duration> {
        let mut windows = self.lock();
        windows.prune(now);

        let blocked = windows.blocked(cost);
        if blocked.is_empty() {
            windows.admit(now, cost);
            return Ok(());
        }

        let wait = windows.wait_for(&blocked, now, attempt);
        if attempt == 0 {
            let gates: Vec<String> = blocked.iter().map(ToString::to_string).collect();
            debug!(
                "Rate gate closed on {} (cost {cost}), re-checking in {}ms",
                gates.join(", "),
                wait.as_millis()
            );
        }
        Err(wait)
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clamp_cost(estimated_cost: i64) -> u64 {
    u64::try_from(estimated_cost)
        .ok()
        .filter(|cost| *cost > 0)
        .unwrap_or(1)
}
