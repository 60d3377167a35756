//! Scheduler trait - deferred execution port
//!
//! The dispatcher realises throttle delays exclusively through this port.

use std::sync::Arc;
use std::time::Duration;

/// One-shot callback handed to a [`Scheduler`]
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Deferred execution port.
///
/// # Contract
///
/// - `schedule` must not block and must not run `task` inline
/// - `task` runs at most once, no earlier than `delay` after the call
/// - no ordering is guaranteed between unrelated tasks
/// - calling `schedule` from inside a running task must not deadlock
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` has elapsed
    fn schedule(&self, task: ScheduledTask, delay: Duration);
}

/// Shared scheduler handle
pub type SharedScheduler = Arc<dyn Scheduler>;

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, task: ScheduledTask, delay: Duration) {
        (**self).schedule(task, delay)
    }
}
