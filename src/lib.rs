#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # pacelimit
//!
//! A bounded admission limiter: caps how many operations may be outstanding at once and,
//! optionally, how quickly new ones may start.
//!
//! ## Features
//!
//! - **Capacity cap** with a non-blocking `acquire` and a blocking `acquire_wait`
//! - **Over-release detection**: handing back a permit nobody holds is an error, not a clamp
//! - **Pacing gate** enforcing a minimum (optionally jittered) spacing between grants
//! - **Injectable clock** with a manually advanced [`VirtualClock`] for deterministic tests
//! - **Async acquisition** for tokio tasks, sharing state with blocking callers
//! - **RAII permits** and a tower [`LimitLayer`]
//!
//! ## Quick Start
//!
//! ```rust
//! use pacelimit::Limiter;
//! use std::time::Duration;
//!
//! let limiter = Limiter::new(2, Duration::ZERO, None).unwrap();
//!
//! assert!(limiter.acquire());
//! assert!(limiter.acquire());
//! assert!(!limiter.acquire()); // full
//!
//! limiter.release().unwrap();
//! let permit = limiter.try_permit().expect("one slot free");
//! drop(permit); // released again
//! assert_eq!(limiter.outstanding(), 1);
//! ```

pub mod clock;
pub mod error;
pub mod layer;
pub mod limiter;
pub mod pacing;
pub mod permit;
pub mod prelude;

// Re-exports
pub use clock::{Clock, SystemClock, VirtualClock};
pub use error::{ConfigError, LimiterError};
pub use layer::{LimitLayer, LimitService};
pub use limiter::{Limiter, LimiterBuilder, LimiterConfig};
pub use pacing::PauseRange;
pub use permit::Permit;
