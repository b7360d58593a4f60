//! Bounded admission limiter with an optional pacing gate
//!
//! Semantics:
//! - `capacity` caps the number of outstanding permits. It is fixed at construction.
//! - Every acquisition first waits for the pacing gate (if enabled), then checks capacity.
//!   The capacity check itself never waits: `acquire` answers `false` as soon as the limiter
//!   is full.
//! - `acquire_wait` (and its async twin) keeps waiting for a release instead of answering
//!   `false`.
//! - `release` hands one permit back and wakes one blocked thread and one blocked task.
//!
//! Invariants:
//! - `0 <= outstanding <= capacity` at all times; releasing with nothing outstanding is
//!   reported as [`LimiterError::OverRelease`] and changes nothing.
//! - The pacing deadline only moves on an actual grant, and never backwards. A caller that
//!   passes the gate but finds the limiter full does not use up the pacing slot.
//! - Pacing and capacity are decided together under one lock, against the same clock
//!   reading.
//!
//! Clones share state: every handle observes and affects the same counter and deadline.
//!
//! Example
//! ```rust
//! use pacelimit::Limiter;
//! use std::time::Duration;
//!
//! let limiter = Limiter::new(2, Duration::ZERO, None).unwrap();
//! assert!(limiter.acquire());
//! assert!(limiter.acquire());
//! assert!(!limiter.acquire());
//! limiter.release().unwrap();
//! assert!(limiter.acquire());
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, LimiterError};
use crate::pacing::{PacingGate, PauseRange};
use crate::permit::Permit;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

const TARGET: &str = "pacelimit::limiter";

/// Configuration for a [`Limiter`].
///
/// `min_pause` alone gives fixed spacing between grants. Setting `max_pause` above it draws
/// each spacing uniformly from `[min_pause, max_pause]`. An `rng_seed` makes those draws
/// reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimiterConfig {
    capacity: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    min_pause: Duration,
    #[cfg_attr(feature = "serde", serde(default))]
    max_pause: Option<Duration>,
    #[cfg_attr(feature = "serde", serde(default))]
    rng_seed: Option<u64>,
}

impl LimiterConfig {
    /// Config with the given capacity and no pacing.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, min_pause: Duration::ZERO, max_pause: None, rng_seed: None }
    }

    /// Set the minimum spacing between grants.
    pub fn with_min_pause(mut self, pause: Duration) -> Self {
        self.min_pause = pause;
        self
    }

    /// Set the upper bound of the jittered spacing.
    pub fn with_max_pause(mut self, pause: Duration) -> Self {
        self.max_pause = Some(pause);
        self
    }

    /// Take both spacing bounds from `range`.
    pub fn with_pause_range(mut self, range: PauseRange) -> Self {
        self.min_pause = range.min();
        self.max_pause = Some(range.max());
        self
    }

    /// Seed the RNG that draws jittered pauses.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Maximum number of outstanding permits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Minimum spacing between grants.
    pub fn min_pause(&self) -> Duration {
        self.min_pause
    }

    /// Upper bound of the spacing; equals `min_pause` unless a jitter range was set.
    pub fn max_pause(&self) -> Duration {
        self.max_pause.unwrap_or(self.min_pause)
    }

    /// Seed for jittered pauses, if one was set.
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }

    /// Check the values without building a limiter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pause_range().map(|_| ())
    }

    /// Validated spacing range between grants.
    pub fn pause_range(&self) -> Result<PauseRange, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        PauseRange::between(self.min_pause, self.max_pause())
    }
}

/// Builder for [`Limiter`].
pub struct LimiterBuilder {
    config: LimiterConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl LimiterBuilder {
    /// Builder with the given capacity, no pacing and the system clock.
    pub fn new(capacity: usize) -> Self {
        Self { config: LimiterConfig::new(capacity), clock: None }
    }

    /// Minimum spacing between grants. Zero disables pacing.
    pub fn min_pause(mut self, pause: Duration) -> Self {
        self.config = self.config.with_min_pause(pause);
        self
    }

    /// Upper bound of a jittered spacing; must not be below `min_pause`.
    pub fn max_pause(mut self, pause: Duration) -> Self {
        self.config = self.config.with_max_pause(pause);
        self
    }

    /// Set both spacing bounds at once, replacing `min_pause`/`max_pause`.
    pub fn pause_range(mut self, range: PauseRange) -> Self {
        self.config = self.config.with_pause_range(range);
        self
    }

    /// Draw jittered pauses from an RNG seeded with `seed`, for reproducible spacing.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config = self.config.with_rng_seed(seed);
        self
    }

    /// Provide a custom clock implementation.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Build the limiter, validating inputs.
    pub fn build(self) -> Result<Limiter, ConfigError> {
        Limiter::with_config(self.config, self.clock)
    }
}

impl std::fmt::Debug for LimiterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}

#[derive(Debug)]
struct State {
    outstanding: usize,
    pacing: PacingGate,
}

struct Inner {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    freed: Condvar,
    freed_async: Notify,
}

enum Attempt {
    Granted,
    Full,
    Paced(Instant),
}

/// Bounded admission limiter.
#[derive(Clone)]
pub struct Limiter {
    inner: Arc<Inner>,
}

impl Limiter {
    /// Create a limiter with a fixed pause between grants.
    ///
    /// `clock` defaults to [`SystemClock`]. Errors if `capacity` is zero.
    pub fn new(
        capacity: usize,
        min_pause: Duration,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, ConfigError> {
        Self::with_config(LimiterConfig::new(capacity).with_min_pause(min_pause), clock)
    }

    /// Start a builder with the given capacity.
    ///
    /// # Examples
    /// ```
    /// use pacelimit::{Limiter, VirtualClock};
    /// use std::time::Duration;
    /// let limiter = Limiter::builder(4)
    ///     .min_pause(Duration::from_millis(5))
    ///     .max_pause(Duration::from_millis(20))
    ///     .clock(VirtualClock::new())
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(limiter.capacity(), 4);
    /// ```
    pub fn builder(capacity: usize) -> LimiterBuilder {
        LimiterBuilder::new(capacity)
    }

    /// Create a limiter from an explicit config, validating the values.
    pub fn with_config(
        config: LimiterConfig,
        clock: Option<Arc<dyn Clock>>,
    ) -> Result<Self, ConfigError> {
        let range = config.pause_range()?;
        let clock: Arc<dyn Clock> = match clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let pacing = PacingGate::new(range, clock.now(), config.rng_seed);

        debug!(
            target: TARGET,
            capacity = config.capacity,
            min_pause = ?range.min(),
            max_pause = ?range.max(),
            seeded = config.rng_seed.is_some(),
            "limiter built"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(State { outstanding: 0, pacing }),
                freed: Condvar::new(),
                freed_async: Notify::new(),
            }),
        })
    }

    /// Try to take a permit.
    ///
    /// Waits for the pacing gate when pacing is enabled, then returns `true` if a permit was
    /// granted or `false` immediately if the limiter is full.
    pub fn acquire(&self) -> bool {
        let mut state = self.lock();
        loop {
            match self.attempt(&mut state) {
                Attempt::Granted => return true,
                Attempt::Full => return false,
                Attempt::Paced(deadline) => state = self.pause(state, deadline),
            }
        }
    }

    /// Block the calling thread until a permit is granted.
    pub fn acquire_wait(&self) {
        let mut state = self.lock();
        loop {
            match self.attempt(&mut state) {
                Attempt::Granted => return,
                Attempt::Full => {
                    state = self.inner.freed.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Attempt::Paced(deadline) => state = self.pause(state, deadline),
            }
        }
    }

    /// Hand one permit back.
    ///
    /// Errors with [`LimiterError::OverRelease`] when no permit is outstanding; the limiter is
    /// left unchanged in that case.
    pub fn release(&self) -> Result<(), LimiterError> {
        let mut state = self.lock();
        if state.outstanding == 0 {
            drop(state);
            warn!(
                target: TARGET,
                capacity = self.inner.config.capacity,
                "release without an associated acquire"
            );
            return Err(LimiterError::OverRelease);
        }
        state.outstanding -= 1;
        let outstanding = state.outstanding;
        drop(state);

        trace!(
            target: TARGET,
            outstanding,
            capacity = self.inner.config.capacity,
            "permit released"
        );
        self.inner.freed.notify_one();
        self.inner.freed_async.notify_one();
        Ok(())
    }

    /// Like [`acquire`](Self::acquire), returning a guard that releases on drop.
    pub fn try_permit(&self) -> Option<Permit> {
        self.acquire().then(|| Permit::new(self.clone()))
    }

    /// Like [`acquire_wait`](Self::acquire_wait), returning a guard that releases on drop.
    pub fn permit(&self) -> Permit {
        self.acquire_wait();
        Permit::new(self.clone())
    }

    /// Async form of [`acquire`](Self::acquire): the pacing wait suspends the task instead of
    /// the thread.
    pub async fn acquire_async(&self) -> bool {
        loop {
            let attempt = {
                let mut state = self.lock();
                self.attempt(&mut state)
            };
            match attempt {
                Attempt::Granted => return true,
                Attempt::Full => return false,
                Attempt::Paced(deadline) => self.inner.clock.sleep_until_async(deadline).await,
            }
        }
    }

    /// Suspend the calling task until a permit is granted.
    ///
    /// Dropping the future before it completes never leaks a permit.
    pub async fn acquire_wait_async(&self) {
        loop {
            // Arm the notification before looking at the counter so a release that lands in
            // between is not missed.
            let mut freed = pin!(self.inner.freed_async.notified());
            freed.as_mut().enable();

            let attempt = {
                let mut state = self.lock();
                self.attempt(&mut state)
            };
            match attempt {
                Attempt::Granted => return,
                Attempt::Full => freed.await,
                Attempt::Paced(deadline) => self.inner.clock.sleep_until_async(deadline).await,
            }
        }
    }

    /// Async form of [`permit`](Self::permit).
    pub async fn permit_async(&self) -> Permit {
        self.acquire_wait_async().await;
        Permit::new(self.clone())
    }

    /// Run `operation` while holding a permit, waiting for one first.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> T
    where
        Fut: Future<Output = T>,
        Op: FnOnce() -> Fut,
    {
        let permit = self.permit_async().await;
        let output = operation().await;
        drop(permit);
        output
    }

    /// Maximum number of outstanding permits.
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Permits currently held.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Permits that could be granted right now, ignoring pacing.
    pub fn available(&self) -> usize {
        self.capacity() - self.outstanding()
    }

    /// Earliest instant the next grant may happen, or `None` when pacing is disabled.
    pub fn next_allowed(&self) -> Option<Instant> {
        self.lock().pacing.next_allowed()
    }

    /// Configuration the limiter was built with.
    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only integers and instants and is never left half-updated.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attempt(&self, state: &mut State) -> Attempt {
        let now = self.inner.clock.now();
        if let Err(deadline) = state.pacing.check(now) {
            return Attempt::Paced(deadline);
        }

        let capacity = self.inner.config.capacity;
        if state.outstanding >= capacity {
            trace!(target: TARGET, outstanding = state.outstanding, capacity, "limiter full");
            return Attempt::Full;
        }

        state.outstanding += 1;
        state.pacing.record_grant(now);
        trace!(target: TARGET, outstanding = state.outstanding, capacity, "permit granted");
        Attempt::Granted
    }

    fn pause<'a>(
        &'a self,
        state: MutexGuard<'a, State>,
        deadline: Instant,
    ) -> MutexGuard<'a, State> {
        drop(state);
        trace!(target: TARGET, ?deadline, "waiting for pacing gate");
        self.inner.clock.sleep_until(deadline);
        self.lock()
    }
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Limiter")
            .field("config", &self.inner.config)
            .field("outstanding", &state.outstanding)
            .field("next_allowed", &state.pacing.next_allowed())
            .field("clock", &self.inner.clock)
            .finish()
    }
}
