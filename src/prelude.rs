//! Convenient re-exports for common pacelimit types.
pub use crate::{
    clock::{Clock, SystemClock, VirtualClock},
    error::{ConfigError, LimiterError},
    layer::{LimitLayer, LimitService},
    limiter::{Limiter, LimiterBuilder, LimiterConfig},
    pacing::PauseRange,
    permit::Permit,
};
