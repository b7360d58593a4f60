//! Clock abstractions used by the pacing gate.
//!
//! A [`Clock`] answers "what time is it" and knows how to park a caller until a given
//! instant, either by blocking the thread or by suspending an async task. Production code
//! uses [`SystemClock`]; tests drive a [`VirtualClock`] by hand so pacing can be checked
//! without real delays.

use futures::future::BoxFuture;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Clock abstraction so pacing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the calling thread until `now() >= deadline`.
    fn sleep_until(&self, deadline: Instant);

    /// Suspend the calling task until `now() >= deadline`.
    ///
    /// Dropping the returned future abandons the wait.
    fn sleep_until_async(&self, deadline: Instant) -> BoxFuture<'_, ()>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Instant) {
        (**self).sleep_until(deadline)
    }

    fn sleep_until_async(&self, deadline: Instant) -> BoxFuture<'_, ()> {
        (**self).sleep_until_async(deadline)
    }
}

/// `base + step`, clamped to the furthest instant the platform can represent.
pub(crate) fn saturating_add(base: Instant, step: Duration) -> Instant {
    if let Some(instant) = base.checked_add(step) {
        return instant;
    }
    // Bisect for the largest step that still fits.
    let (mut fits, mut overflows) = (Duration::ZERO, step);
    while overflows - fits > Duration::from_nanos(1) {
        let mid = fits + (overflows - fits) / 2;
        if base.checked_add(mid).is_some() {
            fits = mid;
        } else {
            overflows = mid;
        }
    }
    base + fits
}

/// Real time backed by `Instant::now()`, `std::thread::sleep` and the tokio timer.
///
/// Notes: the async wait needs a tokio runtime with the time driver enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }

    fn sleep_until_async(&self, deadline: Instant) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)))
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Time starts at the origin instant and only moves when [`advance`](Self::advance) or
/// [`advance_to`](Self::advance_to) is called. Every move wakes all threads and tasks parked
/// in `sleep_until`/`sleep_until_async` so they can re-check their deadline.
///
/// # Example
/// ```
/// use pacelimit::{Clock, VirtualClock};
/// use std::time::Duration;
///
/// let clock = VirtualClock::new();
/// let t0 = clock.now();
/// clock.advance(Duration::from_millis(10));
/// assert_eq!(clock.now(), t0 + Duration::from_millis(10));
/// ```
#[derive(Debug)]
pub struct VirtualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    moved: Condvar,
    watchers: watch::Sender<Duration>,
}

impl VirtualClock {
    /// Frozen clock starting at the current real instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Frozen clock starting at `origin`.
    pub fn starting_at(origin: Instant) -> Self {
        let (watchers, _) = watch::channel(Duration::ZERO);
        Self { origin, elapsed: Mutex::new(Duration::ZERO), moved: Condvar::new(), watchers }
    }

    /// Virtual time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move time forward by `step` and wake every sleeper.
    pub fn advance(&self, step: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed = elapsed.saturating_add(step);
        self.publish(*elapsed);
        drop(elapsed);
        self.moved.notify_all();
    }

    /// Move time forward to `instant`. Instants in the past are ignored.
    pub fn advance_to(&self, instant: Instant) {
        let target = instant.saturating_duration_since(self.origin);
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        if target <= *elapsed {
            return;
        }
        *elapsed = target;
        self.publish(target);
        drop(elapsed);
        self.moved.notify_all();
    }

    fn publish(&self, elapsed: Duration) {
        self.watchers.send_replace(elapsed);
    }

    fn reached(&self, elapsed: Duration, deadline: Instant) -> bool {
        saturating_add(self.origin, elapsed) >= deadline
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        saturating_add(self.origin, self.elapsed())
    }

    fn sleep_until(&self, deadline: Instant) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.reached(*elapsed, deadline) {
            elapsed = self.moved.wait(elapsed).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn sleep_until_async(&self, deadline: Instant) -> BoxFuture<'_, ()> {
        let mut rx = self.watchers.subscribe();
        Box::pin(async move {
            // The sender lives as long as `self`, so the channel cannot close under us.
            let _ = rx.wait_for(|elapsed| self.reached(*elapsed, deadline)).await;
        })
    }
}
