//! Pacing gate: minimum spacing between successive grants
//!
//! The gate holds a single deadline, `next_allowed`. An acquisition may only be granted once
//! the clock has reached it; every successful grant pushes it forward by one pause.
//!
//! Pauses come from a [`PauseRange`]:
//! - `PauseRange::none()`: pacing disabled, the gate is always open.
//! - `PauseRange::fixed(d)`: every grant is followed by exactly `d`.
//! - `PauseRange::between(min, max)`: each pause is drawn uniformly from `[min, max]`, which
//!   keeps a crowd of limiters from granting in lockstep.
//!
//! Notes:
//! - RNG: a limiter draws from `rand`'s thread-local RNG unless it was given a seed
//!   ([`LimiterBuilder::rng_seed`](crate::LimiterBuilder::rng_seed)), in which case the
//!   sequence of pauses is reproducible. `draw_with_rng` replays the same draws by hand.
//! - Precision: nanosecond conversions saturate to `u64::MAX` for very large ranges.
//! - Deadlines saturate at the furthest representable instant instead of overflowing.
//! - The deadline never moves backwards, even if a drawn pause is shorter than the previous one.

use crate::clock::saturating_add;
use crate::error::ConfigError;
use rand::rngs::StdRng;
use rand::{rng, Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Range of pauses enforced between successive grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PauseRange {
    min: Duration,
    max: Duration,
}

impl PauseRange {
    /// No pacing: the gate never delays a caller.
    pub fn none() -> Self {
        Self { min: Duration::ZERO, max: Duration::ZERO }
    }

    /// Fixed spacing between grants. `Duration::ZERO` disables pacing.
    pub fn fixed(pause: Duration) -> Self {
        Self { min: pause, max: pause }
    }

    /// Spacing drawn uniformly from `[min, max]` for each grant.
    pub fn between(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if max < min {
            return Err(ConfigError::InvertedPause { min, max });
        }
        Ok(Self { min, max })
    }

    /// Lower bound of the range.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound of the range.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Whether the gate delays callers at all.
    pub fn is_enabled(&self) -> bool {
        self.max > Duration::ZERO
    }

    /// Draw the next pause.
    pub fn draw(&self) -> Duration {
        let mut rng = rng();
        self.draw_with_rng(&mut rng)
    }

    /// Draw the next pause with a custom RNG (for testing).
    pub fn draw_with_rng<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = Self::as_nanos_saturated(self.min);
        let hi = Self::as_nanos_saturated(self.max);
        Duration::from_nanos(rng.random_range(lo..=hi))
    }

    fn as_nanos_saturated(duration: Duration) -> u64 {
        duration.as_nanos().try_into().unwrap_or(u64::MAX)
    }
}

/// Deadline bookkeeping for the pacing gate. Lives inside the limiter's locked state.
#[derive(Debug)]
pub(crate) struct PacingGate {
    range: PauseRange,
    rng: Option<StdRng>,
    next_allowed: Option<Instant>,
}

impl PacingGate {
    /// Build a gate whose first deadline is one pause after `now`.
    ///
    /// With a seed, pauses come from a `StdRng` seeded with it; otherwise from the
    /// thread-local RNG.
    pub(crate) fn new(range: PauseRange, now: Instant, seed: Option<u64>) -> Self {
        let mut gate = Self { range, rng: seed.map(StdRng::seed_from_u64), next_allowed: None };
        if range.is_enabled() {
            let pause = gate.draw();
            gate.next_allowed = Some(saturating_add(now, pause));
        }
        gate
    }

    /// `Ok` when a grant may happen at `now`, otherwise the instant the gate opens.
    pub(crate) fn check(&self, now: Instant) -> Result<(), Instant> {
        match self.next_allowed {
            Some(deadline) if now < deadline => Err(deadline),
            _ => Ok(()),
        }
    }

    /// Record a grant at `now`, pushing the deadline one pause forward.
    pub(crate) fn record_grant(&mut self, now: Instant) {
        let Some(current) = self.next_allowed else {
            return;
        };
        let candidate = saturating_add(now, self.draw());
        if candidate > current {
            self.next_allowed = Some(candidate);
        }
    }

    pub(crate) fn next_allowed(&self) -> Option<Instant> {
        self.next_allowed
    }

    fn draw(&mut self) -> Duration {
        match self.rng.as_mut() {
            Some(rng) => self.range.draw_with_rng(rng),
            None => self.range.draw(),
        }
    }
}
