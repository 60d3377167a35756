//! Dispatcher - keyed call throttling over bounded per-key queues
//!
//! Each key is an independent lane: a bounded queue plus a drain cycle that
//! executes the lane's calls one at a time, at least `throttle_interval`
//! apart. Waiting is never done on the caller's thread; a throttled lane
//! parks and asks the [`Scheduler`](contracts::Scheduler) for a resume.
//!
//! Lane states:
//!
//! ```text
//!   Idle ──submit──▶ Draining ──throttled──▶ Parked
//!    ▲                 │  ▲                    │
//!    └──queue empty────┘  └──────resume────────┘
//! ```
//!
//! A throttled head call stays in its queue while the lane is parked and
//! is popped only when it executes, so it counts toward both capacity
//! limits and can be evicted or cleared like any other pending call.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use contracts::{
    Clock, OverflowStrategy, Scheduler, SharedClock, SharedScheduler, SystemClock, ThrottleConfig,
    ThrottleKey,
};
use observability::{
    record_call_dropped, record_call_executed, record_call_submitted, record_queue_depth,
    record_throttle_wait_ms,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::queue::{Admission, CallOutcome, CallQueue, PendingCall};
use crate::scheduler::{FrameScheduler, TokioClock, TokioScheduler};
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::throttle::{ThrottleDecision, ThrottlePolicy};

/// Drain-cycle state of one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneState {
    /// No drain cycle; the next accepted call starts one
    #[default]
    Idle,
    /// A drain cycle owns the lane and is executing calls
    Draining,
    /// A drain cycle owns the lane and waits for its scheduled resume
    Parked,
}

impl LaneState {
    /// Whether a drain cycle currently owns the lane
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Default)]
struct Lane {
    queue: CallQueue,
    state: LaneState,
    last_execution: Option<Instant>,
    /// Bumped when a clear cancels a parked cycle; stale resumes compare it
    generation: u64,
}

struct DispatcherState {
    config: ThrottleConfig,
    policy: ThrottlePolicy,
    lanes: HashMap<ThrottleKey, Lane>,
    /// Sum of all queue lengths
    queued: usize,
}

struct DispatcherInner {
    state: Mutex<DispatcherState>,
    stats: DispatchStats,
    scheduler: SharedScheduler,
    clock: SharedClock,
    next_seq: AtomicU64,
}

enum SubmitOutcome {
    Rejected,
    Accepted { start_drain: Option<u64> },
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: ThrottleConfig,
    scheduler: Option<SharedScheduler>,
    clock: Option<SharedClock>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            scheduler: None,
            clock: None,
        }
    }

    /// Use `scheduler` for deferred resumes
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Use an already shared scheduler for deferred resumes
    pub fn shared_scheduler(mut self, scheduler: SharedScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Use `clock` for throttle decisions
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate the configuration and build the dispatcher.
    ///
    /// Without an explicit scheduler the dispatcher runs on the current
    /// tokio runtime (and defaults to tokio's clock); with a scheduler but
    /// no clock it uses the system clock.
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        self.config.validate()?;
        warn_on_inverted_limits(&self.config);

        let (scheduler, clock): (SharedScheduler, SharedClock) = match (self.scheduler, self.clock)
        {
            (Some(scheduler), Some(clock)) => (scheduler, clock),
            (Some(scheduler), None) => (scheduler, Arc::new(SystemClock) as SharedClock),
            (None, clock) => (
                Arc::new(TokioScheduler::current()?),
                clock.unwrap_or_else(|| Arc::new(TokioClock) as SharedClock),
            ),
        };

        info!(
            throttle_interval_ms = self.config.throttle_interval().as_secs_f64() * 1000.0,
            max_per_queue = self.config.max_per_queue,
            strategy = %self.config.strategy,
            global_max = self.config.global_max,
            "Dispatcher created"
        );

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                state: Mutex::new(DispatcherState {
                    policy: ThrottlePolicy::new(self.config.throttle_interval()),
                    config: self.config,
                    lanes: HashMap::new(),
                    queued: 0,
                }),
                stats: DispatchStats::new(),
                scheduler,
                clock,
                next_seq: AtomicU64::new(0),
            }),
        })
    }
}

/// Keyed call-throttling dispatcher.
///
/// Cheap to clone; clones share all lanes and statistics. Resumes handed to
/// the scheduler hold only a weak reference, so dropping the last handle
/// turns outstanding resumes into no-ops.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Start building a dispatcher
    pub fn builder(config: ThrottleConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    /// Create a dispatcher from explicit parts
    pub fn new(
        config: ThrottleConfig,
        scheduler: SharedScheduler,
        clock: SharedClock,
    ) -> Result<Self, DispatcherError> {
        DispatcherBuilder {
            config,
            scheduler: Some(scheduler),
            clock: Some(clock),
        }
        .build()
    }

    /// Create a dispatcher on the current tokio runtime
    pub fn with_tokio(config: ThrottleConfig) -> Result<Self, DispatcherError> {
        DispatcherBuilder::new(config).build()
    }

    /// Create a dispatcher driven by a frame scheduler and its clock
    pub fn with_frame_scheduler(
        config: ThrottleConfig,
        frames: &FrameScheduler,
    ) -> Result<Self, DispatcherError> {
        DispatcherBuilder::new(config)
            .scheduler(frames.clone())
            .clock(frames.clock())
            .build()
    }

    /// Set the minimum interval between two executions of one key
    pub fn configure(&self, throttle_interval: Duration) {
        let mut state = self.inner.lock_state();
        state.config.throttle_interval_secs = throttle_interval.as_secs_f64();
        state.policy = ThrottlePolicy::new(throttle_interval);
        info!(
            throttle_interval_ms = throttle_interval.as_secs_f64() * 1000.0,
            "Throttle interval configured"
        );
    }

    /// Set the throttle interval in seconds; rejects negative or non-finite values
    pub fn configure_secs(&self, throttle_interval_secs: f64) -> Result<(), DispatcherError> {
        let candidate = ThrottleConfig {
            throttle_interval_secs,
            ..self.config()
        };
        candidate.validate()?;
        self.configure(candidate.throttle_interval());
        Ok(())
    }

    /// Set capacity limits and overflow strategy; rejects zero capacities
    pub fn configure_limits(
        &self,
        max_per_queue: usize,
        strategy: OverflowStrategy,
        global_max: usize,
    ) -> Result<(), DispatcherError> {
        let mut state = self.inner.lock_state();
        let candidate = state
            .config
            .clone()
            .with_limits(max_per_queue, strategy, global_max);
        candidate.validate()?;
        warn_on_inverted_limits(&candidate);
        state.config = candidate;
        info!(max_per_queue, strategy = %strategy, global_max, "Queue limits configured");
        Ok(())
    }

    /// Replace the whole configuration
    pub fn reconfigure(&self, config: ThrottleConfig) -> Result<(), DispatcherError> {
        config.validate()?;
        warn_on_inverted_limits(&config);
        let mut state = self.inner.lock_state();
        state.policy = ThrottlePolicy::new(config.throttle_interval());
        state.config = config;
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> ThrottleConfig {
        self.inner.lock_state().config.clone()
    }

    /// Submit a call on the lane named `key`.
    ///
    /// Returns `false` if admission control rejected the call (global limit,
    /// or a full queue under `skip_new`). Returns `true` if it was queued,
    /// possibly evicting an older call. Never waits for the throttle: if the
    /// lane is idle and eligible, a call runs synchronously before this
    /// returns, otherwise the delay is handed to the scheduler.
    pub fn submit<K, F>(&self, key: K, call: F) -> bool
    where
        K: Into<ThrottleKey>,
        F: FnOnce() -> CallOutcome + Send + 'static,
    {
        self.inner.submit(key.into(), Box::new(call))
    }

    /// Submit `callable(args)` on the lane named `key`
    pub fn submit_with_args<K, A, F>(&self, key: K, callable: F, args: A) -> bool
    where
        K: Into<ThrottleKey>,
        A: Send + 'static,
        F: FnOnce(A) -> CallOutcome + Send + 'static,
    {
        self.submit(key, move || callable(args))
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.snapshot()
    }

    /// Drop all pending calls of `key`, or of every key when `None`.
    ///
    /// Returns the number of calls discarded; they count as dropped. A
    /// parked drain cycle is cancelled and its lane returns to `Idle`. A
    /// cycle that is executing a call right now finishes that call, finds
    /// its queue empty and goes `Idle` on its own. Each lane keeps its last
    /// execution time, so the throttle still applies after a clear.
    pub fn clear(&self, key: Option<&str>) -> usize {
        self.inner.clear(key)
    }

    /// Drop every pending call on every lane
    pub fn clear_all(&self) -> usize {
        let dropped = self.clear(None);
        warn!(dropped, "Emergency clear of all queues");
        dropped
    }

    /// Pending calls on `key`
    pub fn queue_len(&self, key: &str) -> usize {
        self.inner
            .lock_state()
            .lanes
            .get(key)
            .map_or(0, |lane| lane.queue.len())
    }

    /// Sequence numbers of the pending calls on `key`, oldest first.
    ///
    /// Sequence numbers are assigned per dispatcher in submission order,
    /// starting at 0, including for rejected submissions.
    pub fn pending_seqs(&self, key: &str) -> Vec<u64> {
        self.inner
            .lock_state()
            .lanes
            .get(key)
            .map(|lane| lane.queue.seqs())
            .unwrap_or_default()
    }

    /// Drain state of `key` (`Idle` for unknown keys)
    pub fn lane_state(&self, key: &str) -> LaneState {
        self.inner
            .lock_state()
            .lanes
            .get(key)
            .map_or(LaneState::Idle, |lane| lane.state)
    }

    /// When `key` last executed a call, successfully or not
    pub fn last_execution(&self, key: &str) -> Option<Instant> {
        self.inner
            .lock_state()
            .lanes
            .get(key)
            .and_then(|lane| lane.last_execution)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("Dispatcher")
            .field("config", &state.config)
            .field("lanes", &state.lanes.len())
            .field("queued", &state.queued)
            .finish()
    }
}

impl DispatcherInner {
    fn lock_state(&self) -> MutexGuard<'_, DispatcherState> {
        // Callables never run under this lock, so a poisoned guard still
        // protects consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(self: &Arc<Self>, key: ThrottleKey, call: crate::queue::BoxedCall) -> bool {
        let mut discarded = Vec::new();
        let outcome = {
            let mut state = self.lock_state();
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let call = PendingCall::new(seq, call, self.clock.now());
            self.admit(&mut state, &key, call, &mut discarded)
        };
        // Released after unlocking: captured values may re-enter the dispatcher on drop.
        drop(discarded);

        match outcome {
            SubmitOutcome::Rejected => false,
            SubmitOutcome::Accepted { start_drain } => {
                if let Some(generation) = start_drain {
                    self.drain(&key, generation);
                }
                true
            }
        }
    }

    /// Admission control. Runs under the state lock.
    fn admit(
        &self,
        state: &mut DispatcherState,
        key: &ThrottleKey,
        call: PendingCall,
        discarded: &mut Vec<PendingCall>,
    ) -> SubmitOutcome {
        self.stats.inc_total_calls();
        record_call_submitted(key);

        if state.queued >= state.config.global_max {
            self.stats.add_dropped_calls(1);
            record_call_dropped(key, "global_limit", 1);
            warn!(
                key = %key,
                queued = state.queued,
                global_max = state.config.global_max,
                "Global queue limit reached, dropping call"
            );
            discarded.push(call);
            return SubmitOutcome::Rejected;
        }

        let DispatcherState {
            config,
            lanes,
            queued,
            ..
        } = state;
        let lane = lanes.entry(key.clone()).or_default();

        match lane.queue.admit(call, config.max_per_queue, config.strategy) {
            Admission::Rejected(call) => {
                self.stats.add_dropped_calls(1);
                record_call_dropped(key, "skip_new", 1);
                warn!(
                    key = %key,
                    queue_len = lane.queue.len(),
                    "Queue limit reached, skipping new call"
                );
                discarded.push(call);
                return SubmitOutcome::Rejected;
            }
            Admission::Enqueued { evicted } => {
                if !evicted.is_empty() {
                    let reason = match config.strategy {
                        OverflowStrategy::DropNewest => "drop_newest",
                        _ => "drop_oldest",
                    };
                    self.stats.add_dropped_calls(evicted.len() as u64);
                    record_call_dropped(key, reason, evicted.len() as u64);
                    for victim in &evicted {
                        warn!(
                            key = %key,
                            seq = victim.seq(),
                            strategy = %config.strategy,
                            queue_len = lane.queue.len(),
                            "Queue limit reached, evicted pending call"
                        );
                    }
                    *queued -= evicted.len();
                    discarded.extend(evicted);
                }
                *queued += 1;
            }
        }
        record_queue_depth(key, lane.queue.len());

        if lane.state == LaneState::Idle {
            lane.state = LaneState::Draining;
            SubmitOutcome::Accepted {
                start_drain: Some(lane.generation),
            }
        } else {
            SubmitOutcome::Accepted { start_drain: None }
        }
    }

    /// Drive one lane's drain cycle until it empties or parks.
    ///
    /// Iterative: backlog depth never grows the call stack.
    fn drain(self: &Arc<Self>, key: &ThrottleKey, generation: u64) {
        loop {
            let call = {
                let mut state = self.lock_state();
                let policy = state.policy;
                let DispatcherState { lanes, queued, .. } = &mut *state;
                let Some(lane) = lanes.get_mut(key) else {
                    return;
                };
                if lane.generation != generation {
                    debug!(key = %key, "Drain cycle cancelled by clear");
                    return;
                }
                if lane.queue.is_empty() {
                    lane.state = LaneState::Idle;
                    return;
                }

                match policy.decide(self.clock.now(), lane.last_execution) {
                    ThrottleDecision::Ready => {
                        let Some(call) = lane.queue.pop_front() else {
                            lane.state = LaneState::Idle;
                            return;
                        };
                        lane.state = LaneState::Draining;
                        *queued -= 1;
                        record_queue_depth(key, lane.queue.len());
                        call
                    }
                    ThrottleDecision::Wait(delay) => {
                        lane.state = LaneState::Parked;
                        drop(state);
                        self.park(key, generation, delay);
                        return;
                    }
                }
            };

            self.execute(key, call);

            if let Some(lane) = self.lock_state().lanes.get_mut(key) {
                lane.last_execution = Some(self.clock.now());
            }
        }
    }

    fn park(self: &Arc<Self>, key: &ThrottleKey, generation: u64, delay: Duration) {
        self.stats.inc_deferred_resumes();
        let wait_ms = delay.as_secs_f64() * 1000.0;
        record_throttle_wait_ms(wait_ms);
        debug!(key = %key, wait_ms, "Lane throttled, resume scheduled");

        let weak: Weak<Self> = Arc::downgrade(self);
        let key = key.clone();
        self.scheduler.schedule(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.resume(&key, generation);
                }
            }),
            delay,
        );
    }

    fn resume(self: &Arc<Self>, key: &ThrottleKey, generation: u64) {
        let parked = self
            .lock_state()
            .lanes
            .get(key)
            .is_some_and(|lane| lane.generation == generation && lane.state == LaneState::Parked);
        if !parked {
            debug!(key = %key, generation, "Ignoring stale resume");
            return;
        }
        self.drain(key, generation);
    }

    /// Run one call. Failures and panics are logged and counted, never propagated.
    fn execute(&self, key: &ThrottleKey, call: PendingCall) {
        let seq = call.seq();
        let queued_ms = self
            .clock
            .now()
            .saturating_duration_since(call.enqueued_at())
            .as_secs_f64()
            * 1000.0;

        let result = panic::catch_unwind(AssertUnwindSafe(|| call.run()));
        self.stats.inc_executed_calls();

        match result {
            Ok(Ok(())) => {
                record_call_executed(key, true);
                debug!(key = %key, seq, queued_ms, "Throttled call executed");
            }
            Ok(Err(e)) => {
                self.stats.inc_failed_calls();
                record_call_executed(key, false);
                error!(key = %key, seq, error = %e, details = ?e, "Throttled call failed");
            }
            Err(payload) => {
                self.stats.inc_failed_calls();
                record_call_executed(key, false);
                error!(
                    key = %key,
                    seq,
                    panic = panic_message(payload.as_ref()),
                    "Throttled call panicked"
                );
            }
        }
    }

    fn clear(&self, key: Option<&str>) -> usize {
        let mut discarded = Vec::new();
        {
            let mut state = self.lock_state();
            let DispatcherState { lanes, queued, .. } = &mut *state;
            match key {
                Some(key) => {
                    if let Some(lane) = lanes.get_mut(key) {
                        clear_lane(key, lane, &mut discarded);
                    }
                }
                None => {
                    for (key, lane) in lanes.iter_mut() {
                        clear_lane(key, lane, &mut discarded);
                    }
                }
            }
            *queued -= discarded.len();
            self.stats.add_dropped_calls(discarded.len() as u64);
        }

        let cleared = discarded.len();
        drop(discarded);
        cleared
    }

    fn snapshot(&self) -> StatsSnapshot {
        let state = self.lock_state();
        let queue_details: BTreeMap<String, usize> = state
            .lanes
            .iter()
            .filter(|(_, lane)| !lane.queue.is_empty())
            .map(|(key, lane)| (key.to_string(), lane.queue.len()))
            .collect();
        StatsSnapshot::from_counters(&self.stats, queue_details)
    }
}

fn clear_lane(key: &str, lane: &mut Lane, discarded: &mut Vec<PendingCall>) {
    let taken = lane.queue.take_all();
    if lane.state == LaneState::Parked {
        lane.generation += 1;
        lane.state = LaneState::Idle;
    }
    if !taken.is_empty() {
        record_call_dropped(key, "cleared", taken.len() as u64);
        record_queue_depth(key, 0);
        warn!(key = %key, dropped = taken.len(), "Cleared pending calls");
    }
    discarded.extend(taken);
}

fn warn_on_inverted_limits(config: &ThrottleConfig) {
    if config.global_below_per_queue() {
        warn!(
            max_per_queue = config.max_per_queue,
            global_max = config.global_max,
            "global_max is below max_per_queue; the global limit will cap every queue"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
