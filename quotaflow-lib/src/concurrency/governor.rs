use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use super::stats::ConcurrencyStats;
use crate::{ErrorKind, Result};

/// Default global concurrency limit
pub const DEFAULT_GLOBAL_LIMIT: usize = 200;

/// Default upper bound for waiting on in-flight calls during a shrink
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Log a warning on every n-th admission that had to wait
const BLOCKED_WARN_INTERVAL: u64 = 10;

/// Capacity and the calls currently holding one of its slots.
///
/// When the capacity changes the pool is rebuilt from the old one so the
/// held slots carry over. Resetting them would admit more calls than the new
/// capacity allows.
#[derive(Debug)]
struct SlotPool {
    capacity: usize,
    held: HashMap<u64, Option<String>>,
}

impl SlotPool {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            held: HashMap::new(),
        }
    }

    fn rebuild(&mut self, capacity: usize) -> usize {
        let old = std::mem::replace(self, Self::new(capacity));
        self.held = old.held;
        old.capacity
    }

    fn in_flight(&self) -> usize {
        self.held.len()
    }

    fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_flight())
    }
}

#[derive(Debug)]
struct State {
    pool: SlotPool,
    stats: ConcurrencyStats,
    next_id: u64,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    /// Wakes callers waiting for a free slot
    released: Notify,
    /// Wakes callers waiting for in-flight calls to drain
    drained: Notify,
    /// Serializes capacity changes; never taken on the acquire path
    adjust: tokio::sync::Mutex<()>,
    drain_timeout: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the slot held by permit `id`.
    ///
    /// Returns `false` if that permit holds no slot, in which case nothing
    /// is changed.
    fn release(&self, id: u64) -> bool {
        let mut state = self.lock();
        let Some(label) = state.pool.held.remove(&id) else {
            error!("Ignoring release of global slot {id}: no such slot is held");
            return false;
        };
        if !state.stats.record_release() {
            error!("Global slot {id} released while statistics show no active request");
        }
        if let Some(label) = label {
            debug!("Released global slot for {label}");
        }
        drop(state);

        self.released.notify_one();
        self.drained.notify_waiters();
        true
    }
}

/// Process-wide admission gate for calls to the remote service.
///
/// Construct exactly one governor at startup and hand clones of it to every
/// component that issues remote calls. Clones share one capacity.
///
/// A slot is held by a [`GlobalPermit`] and returned when the permit is
/// dropped, on every exit path of the caller.
///
/// # Examples
///
/// ```
/// use quotaflow_lib::concurrency::ConcurrencyGovernor;
///
/// # #[tokio::main]
/// # async fn main() -> quotaflow_lib::Result<()> {
/// let governor = ConcurrencyGovernor::new(2)?;
/// {
///     let _permit = governor.acquire().await;
///     assert_eq!(governor.available(), 1);
/// }
/// assert_eq!(governor.available(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    inner: Arc<Inner>,
}

impl ConcurrencyGovernor {
    /// Create a governor admitting at most `capacity` concurrent calls
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_drain_timeout(capacity, DEFAULT_DRAIN_TIMEOUT)
    }

    /// Create a governor with a custom bound on how long
    /// [`ConcurrencyGovernor::adjust_limit`] waits for in-flight calls
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn with_drain_timeout(capacity: usize, drain_timeout: Duration) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pool: SlotPool::new(capacity),
                    stats: ConcurrencyStats::default(),
                    next_id: 0,
                }),
                released: Notify::new(),
                drained: Notify::new(),
                adjust: tokio::sync::Mutex::new(()),
                drain_timeout,
            }),
        })
    }

    /// Wait for a free slot and take it
    pub async fn acquire(&self) -> GlobalPermit {
        self.admit(None).await
    }

    /// Wait for a free slot and take it on behalf of `label`.
    ///
    /// The label shows up in [`ConcurrencyGovernor::active_requests`] and in
    /// log output while the permit is held.
    pub async fn acquire_labeled(&self, label: impl Into<String>) -> GlobalPermit {
        self.admit(Some(label.into())).await
    }

    async fn admit(&self, mut label: Option<String>) -> GlobalPermit {
        let mut counted_as_blocked = false;

        loop {
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.inner.lock();
                if state.pool.available() > 0 {
                    let id = state.next_id;
                    state.next_id += 1;
                    if let Some(label) = &label {
                        debug!("Acquired global slot for {label}");
                    }
                    state.pool.held.insert(id, label.take());
                    state.stats.record_acquire();
                    return GlobalPermit {
                        inner: Arc::clone(&self.inner),
                        id,
                    };
                }

                if !counted_as_blocked {
                    counted_as_blocked = true;
                    let blocked = state.stats.record_blocked();
                    if blocked % BLOCKED_WARN_INTERVAL == 0 {
                        warn!(
                            "Global concurrency limit reached ({}). {blocked} requests blocked.",
                            state.pool.capacity
                        );
                    }
                }
            }

            notified.await;
        }
    }

    /// Change the capacity.
    ///
    /// The new value applies to new admissions right away. Calls already in
    /// flight are never interrupted, even if there are more of them than the
    /// new capacity. With `wait_for_drain`, this returns once the in-flight
    /// count fits into the new capacity (or the drain timeout passed).
    /// Concurrent adjustments are applied one after another.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_limit` is zero.
    pub async fn adjust_limit(&self, new_limit: usize, wait_for_drain: bool) -> Result<()> {
        check_capacity(new_limit)?;
        let _adjusting = self.inner.adjust.lock().await;

        let (old_limit, in_flight) = {
            let mut state = self.inner.lock();
            if state.pool.capacity == new_limit {
                return Ok(());
            }
            let old_limit = state.pool.rebuild(new_limit);
            (old_limit, state.pool.in_flight())
        };

        info!(
            "Global concurrency limit adjusted from {old_limit} to {new_limit}. Current active: {in_flight}"
        );

        if new_limit > old_limit {
            self.inner.released.notify_waiters();
        }

        if wait_for_drain && in_flight > new_limit {
            info!(
                "New limit {new_limit} is smaller than current active requests ({in_flight}). Waiting for requests to complete..."
            );
            if !self.wait_for_in_flight(new_limit, self.inner.drain_timeout).await {
                warn!(
                    "Timeout waiting for requests to complete. Still {} active requests.",
                    self.in_flight()
                );
            }
        }

        Ok(())
    }

    /// Wait until no call holds a slot, for at most `timeout`.
    ///
    /// Returns `false` if calls were still in flight when the timeout passed.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        self.wait_for_in_flight(0, timeout).await
    }

    async fn wait_for_in_flight(&self, at_most: usize, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() <= at_most {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Current capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().pool.capacity
    }

    /// Number of calls currently holding a slot
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().pool.in_flight()
    }

    /// Number of slots a new call could take right now
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.lock().pool.available()
    }

    /// Snapshot of the admission statistics
    #[must_use]
    pub fn stats(&self) -> ConcurrencyStats {
        self.inner.lock().stats
    }

    /// Start a new statistics period
    pub fn reset_stats(&self) {
        self.inner.lock().stats.reset();
    }

    /// Labels of all labeled calls currently holding a slot, sorted
    #[must_use]
    pub fn active_requests(&self) -> Vec<String> {
        let state = self.inner.lock();
        let mut labels: Vec<String> = state.pool.held.values().flatten().cloned().collect();
        labels.sort();
        labels
    }
}

/// A slot of a [`ConcurrencyGovernor`], returned on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GlobalPermit {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for GlobalPermit {
    fn drop(&mut self) {
        self.inner.release(self.id);
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(ErrorKind::InvalidCapacity {
            what: "global",
            value: capacity,
        });
    }
    Ok(())
}
