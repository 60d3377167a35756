//! FrameScheduler - delays counted in host frames
//!
//! Frame-loop hosts (render loops, simulation ticks) cannot sleep; they
//! advance once per frame. Delays are converted to a whole number of
//! frames, rounded up, so a task never fires before its delay elapsed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{ManualClock, ScheduledTask, Scheduler};
use tracing::trace;

use crate::error::DispatcherError;

struct FrameState {
    frame: u64,
    pending: BTreeMap<u64, Vec<ScheduledTask>>,
}

struct FrameInner {
    frame_duration: Duration,
    clock: ManualClock,
    state: Mutex<FrameState>,
}

/// Scheduler driven by explicit frame advances.
///
/// Owns a [`ManualClock`] that moves by exactly one frame duration per
/// [`FrameScheduler::advance_frame`]; hand that clock to the dispatcher so
/// throttle decisions and deferred tasks share one timeline. Clones share
/// state.
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Arc<FrameInner>,
}

impl FrameScheduler {
    /// Create a scheduler running at `fps` frames per second
    pub fn new(fps: f64) -> Result<Self, DispatcherError> {
        Self::with_clock(fps, ManualClock::new())
    }

    /// Create a scheduler that advances an existing clock
    pub fn with_clock(fps: f64, clock: ManualClock) -> Result<Self, DispatcherError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(DispatcherError::InvalidFrameRate { fps });
        }
        let frame_duration = Duration::try_from_secs_f64(1.0 / fps)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(DispatcherError::InvalidFrameRate { fps })?;

        Ok(Self {
            inner: Arc::new(FrameInner {
                frame_duration,
                clock,
                state: Mutex::new(FrameState {
                    frame: 0,
                    pending: BTreeMap::new(),
                }),
            }),
        })
    }

    /// Clock advanced by this scheduler
    pub fn clock(&self) -> ManualClock {
        self.inner.clock.clone()
    }

    /// Duration of one frame
    pub fn frame_duration(&self) -> Duration {
        self.inner.frame_duration
    }

    /// Frames elapsed since creation
    pub fn frame(&self) -> u64 {
        self.lock_state().frame
    }

    /// Number of tasks not yet fired
    pub fn pending(&self) -> usize {
        self.lock_state().pending.values().map(Vec::len).sum()
    }

    /// Whole frames needed to cover `delay` (rounded up)
    pub fn frames_for(&self, delay: Duration) -> u64 {
        let frame_nanos = self.inner.frame_duration.as_nanos();
        let frames = delay.as_nanos().div_ceil(frame_nanos);
        u64::try_from(frames).unwrap_or(u64::MAX)
    }

    /// Advance one frame and run every task that became due.
    ///
    /// Tasks run outside the scheduler lock; tasks they schedule fire on a
    /// later frame. Returns the number of tasks run.
    pub fn advance_frame(&self) -> usize {
        let due = {
            let mut state = self.lock_state();
            state.frame += 1;
            self.inner.clock.advance(self.inner.frame_duration);
            let next = state.frame + 1;
            let later = state.pending.split_off(&next);
            std::mem::replace(&mut state.pending, later)
        };

        let mut fired = 0;
        for task in due.into_values().flatten() {
            task();
            fired += 1;
        }
        fired
    }

    /// Advance `frames` frames; returns the number of tasks run
    pub fn advance_frames(&self, frames: u64) -> usize {
        (0..frames).map(|_| self.advance_frame()).sum()
    }

    /// Advance until no task is pending or `max_frames` frames passed.
    ///
    /// Returns the number of frames advanced.
    pub fn run_until_idle(&self, max_frames: u64) -> u64 {
        let mut advanced = 0;
        while advanced < max_frames && self.pending() > 0 {
            self.advance_frame();
            advanced += 1;
        }
        advanced
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FrameState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for FrameScheduler {
    fn schedule(&self, task: ScheduledTask, delay: Duration) {
        let frames = self.frames_for(delay);
        let mut state = self.lock_state();
        let due = state.frame.saturating_add(frames);
        trace!(frame = state.frame, due_frame = due, "Scheduling task on frame");
        state.pending.entry(due).or_default().push(task);
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("frame_duration", &self.inner.frame_duration)
            .field("frame", &self.frame())
            .field("pending", &self.pending())
            .finish()
    }
}
