//! TokioScheduler - deferred callbacks on a tokio runtime

use std::time::{Duration, Instant};

use contracts::{Clock, ScheduledTask, Scheduler};
use tokio::runtime::Handle;
use tracing::trace;

use crate::error::DispatcherError;

/// Scheduler that sleeps on a tokio timer, then runs the task.
///
/// Holds a runtime [`Handle`], so `schedule` may be called from any thread,
/// including from inside a running task or a throttled call.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler on the given runtime
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler on the runtime the caller is running in
    pub fn current() -> Result<Self, DispatcherError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| DispatcherError::no_runtime(e.to_string()))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: ScheduledTask, delay: Duration) {
        trace!(delay_ms = delay.as_secs_f64() * 1000.0, "Scheduling deferred task");
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/// Clock that reads tokio's time source.
///
/// Follows `tokio::time::pause()`/`advance()`, keeping throttle decisions
/// consistent with [`TokioScheduler`] timers in paused-time tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    #[inline]
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_current_outside_runtime_fails() {
        let err = TokioScheduler::current().unwrap_err();
        assert!(matches!(err, DispatcherError::NoRuntime { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_fires_after_delay() {
        let scheduler = TokioScheduler::current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(100),
        );

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_paused_time() {
        let clock = TokioClock;
        let t0 = clock.now();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.now() - t0, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_from_inside_task() {
        let scheduler = Arc::new(TokioScheduler::current().unwrap());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Box::new(move || {
                inner_scheduler.schedule(
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                    Duration::from_millis(10),
                );
            }),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
