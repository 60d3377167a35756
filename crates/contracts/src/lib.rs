//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Throttle decisions use monotonic `Instant`s supplied by a [`Clock`]
//! - Delays are realised by a [`Scheduler`], never by blocking the caller

mod blueprint;
mod call_source;
mod clock;
mod error;
mod scheduler;
mod throttle_config;
mod throttle_key;

pub use blueprint::*;
pub use call_source::{value_change_key, CallSource, LocalCallSource, ValueChange};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::*;
pub use scheduler::{ScheduledTask, Scheduler, SharedScheduler};
pub use throttle_config::*;
pub use throttle_key::ThrottleKey;
