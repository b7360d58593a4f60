//! RAII guard for a granted permit

use crate::error::LimiterError;
use crate::limiter::Limiter;
use tracing::warn;

/// One granted unit of capacity. Dropping the guard releases it.
///
/// Obtained from [`Limiter::try_permit`], [`Limiter::permit`] or [`Limiter::permit_async`].
/// The guard owns a handle to the limiter, so it can be moved into spawned threads and tasks.
#[derive(Debug)]
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    limiter: Limiter,
    armed: bool,
}

impl Permit {
    pub(crate) fn new(limiter: Limiter) -> Self {
        Self { limiter, armed: true }
    }

    /// Release the permit now and report the outcome.
    ///
    /// Only fails if the grant was already handed back through [`Limiter::release`].
    pub fn release(mut self) -> Result<(), LimiterError> {
        self.armed = false;
        self.limiter.release()
    }

    /// Keep the grant outstanding without releasing it.
    ///
    /// The caller becomes responsible for a matching [`Limiter::release`].
    pub fn forget(mut self) {
        self.armed = false;
    }

    /// Limiter this permit was granted by.
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.limiter.release() {
            warn!(
                target: "pacelimit::permit",
                error = %err,
                "permit dropped after its grant was already released"
            );
        }
    }
}
