//! Simulation orchestrator - coordinates sources, dispatcher and scheduler.
//!
//! Each configured channel gets its own [`SineSource`] task; every value
//! change is submitted on the channel's key. The dispatcher runs on the
//! scheduler named in the blueprint: tokio timers, or a frame scheduler
//! ticked at the configured frame rate.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::{CallSource, SchedulerKind, ThrottlerBlueprint, ValueChange};
use dispatcher::{CallOutcome, Dispatcher, FrameScheduler, StatsSnapshot};
use observability::{MetricsSummary, ThrottleMetricsAggregator};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::{RunStats, SineSource};
use crate::error::CliError;

/// How long queued calls may keep draining once every source is exhausted
const DRAIN_GRACE: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);
const MIN_STATS_INTERVAL: Duration = Duration::from_millis(100);

type SharedAggregator = Arc<Mutex<ThrottleMetricsAggregator>>;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// The throttler blueprint
    pub blueprint: ThrottlerBlueprint,

    /// Run duration (None = until shutdown or exhaustion)
    pub duration: Option<Duration>,

    /// Samples per channel (None = unlimited)
    pub max_samples: Option<u64>,

    /// Interval between statistics log lines
    pub stats_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main simulation orchestrator
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    /// Create a new simulation with the given configuration
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, the duration elapses, or every source
    /// is exhausted. Pending calls are cleared on the way out.
    pub async fn run<F>(self, shutdown: F) -> Result<RunStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (dispatcher, frame_driver) = self.build_dispatcher()?;

        let aggregator = SharedAggregator::default();
        let changes = Arc::new(AtomicU64::new(0));
        let accepted = Arc::new(AtomicU64::new(0));

        let channels = &self.config.blueprint.channels;
        if channels.is_empty() {
            warn!("No channels configured - nothing will be submitted");
        }

        let mut sources = JoinSet::new();
        for channel in channels {
            let mut source = SineSource::new(channel.clone());
            if let Some(max) = self.config.max_samples {
                source = source.with_max_samples(max);
            }
            sources.spawn(feed(
                source,
                dispatcher.clone(),
                Arc::clone(&aggregator),
                Arc::clone(&changes),
                Arc::clone(&accepted),
            ));
        }
        info!(channels = channels.len(), "Value-change sources started");

        let exhausted = self.supervise(&dispatcher, &mut sources, shutdown).await;
        sources.abort_all();

        if exhausted {
            wait_for_drain(&dispatcher).await;
        }

        // Emergency clear of whatever is still queued
        let cleared = if dispatcher.stats().total_queued_items > 0 {
            dispatcher.clear_all()
        } else {
            0
        };

        if let Some(driver) = frame_driver {
            driver.abort();
        }

        let dispatch = dispatcher.stats();
        let executions = execution_summary(&aggregator, &dispatch);

        let stats = RunStats {
            duration: start_time.elapsed(),
            changes_emitted: changes.load(Ordering::Relaxed),
            calls_accepted: accepted.load(Ordering::Relaxed),
            cleared_on_shutdown: cleared,
            dispatch,
            executions: Some(executions),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            executed = stats.dispatch.executed_calls,
            dropped = stats.dispatch.dropped_calls,
            cleared,
            "Simulation shutdown complete"
        );

        Ok(stats)
    }

    fn build_dispatcher(&self) -> Result<(Dispatcher, Option<JoinHandle<()>>), CliError> {
        let blueprint = &self.config.blueprint;
        let throttle = blueprint.throttle.clone();

        match blueprint.scheduler.kind {
            SchedulerKind::Tokio => {
                info!("Using tokio timer scheduler");
                Ok((Dispatcher::with_tokio(throttle)?, None))
            }
            SchedulerKind::Frame => {
                let frames = FrameScheduler::new(blueprint.scheduler.fps)?;
                let dispatcher = Dispatcher::with_frame_scheduler(throttle, &frames)?;
                info!(
                    fps = blueprint.scheduler.fps,
                    frame_ms = frames.frame_duration().as_secs_f64() * 1000.0,
                    "Using frame scheduler"
                );
                Ok((dispatcher, Some(tokio::spawn(drive_frames(frames)))))
            }
        }
    }

    /// Returns `true` if every source ran out, `false` on shutdown or timeout.
    async fn supervise<F>(
        &self,
        dispatcher: &Dispatcher,
        sources: &mut JoinSet<()>,
        shutdown: F,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        let duration = self.config.duration;
        let deadline = async move {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline, shutdown);

        let mut stats_ticker = interval(self.config.stats_interval.max(MIN_STATS_INTERVAL));
        stats_ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping sources...");
                    return false;
                }
                _ = &mut deadline => {
                    info!("Run duration reached");
                    return false;
                }
                _ = stats_ticker.tick() => log_stats(&dispatcher.stats()),
                joined = sources.join_next() => match joined {
                    None => {
                        info!("All sources exhausted");
                        return true;
                    }
                    Some(Err(e)) if !e.is_cancelled() => {
                        warn!(error = %e, "Source task failed");
                    }
                    Some(_) => {}
                },
            }
        }
    }
}

/// Pump one source into the dispatcher
async fn feed<S>(
    mut source: S,
    dispatcher: Dispatcher,
    aggregator: SharedAggregator,
    changes: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
) where
    S: CallSource + 'static,
{
    debug!(source = source.name(), "Source started");

    while let Some(change) = source.next_change().await {
        changes.fetch_add(1, Ordering::Relaxed);
        let key = change.throttle_key();
        if dispatcher.submit(key, throttled_handler(change, Arc::clone(&aggregator))) {
            accepted.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!(source = source.name(), "Source exhausted");
}

/// Callable executed by the dispatcher for one value change
fn throttled_handler(
    change: ValueChange,
    aggregator: SharedAggregator,
) -> impl FnOnce() -> CallOutcome + Send + 'static {
    let observed_at = Instant::now();
    move || {
        let latency_ms = observed_at.elapsed().as_secs_f64() * 1000.0;
        info!(
            channel = %change.channel,
            value = format!("{:.4}", change.value),
            previous = format!("{:.4}", change.previous),
            frame = change.frame,
            latency_ms = format!("{latency_ms:.1}"),
            "Throttled call executed"
        );
        aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_execution(&change.throttle_key(), latency_ms, true);
        Ok(())
    }
}

/// Handler executions merged with the dispatcher's failure count.
///
/// A handler never observes its own error or panic; the dispatcher catches
/// those, so failures come from its counters.
fn execution_summary(aggregator: &SharedAggregator, dispatch: &StatsSnapshot) -> MetricsSummary {
    let mut aggregator = aggregator.lock().unwrap_or_else(PoisonError::into_inner);
    aggregator.failed = dispatch.failed_calls;
    aggregator.executed = aggregator.executed.max(dispatch.executed_calls);
    aggregator.summary()
}

/// Advance the frame scheduler once per frame, like a host render loop
async fn drive_frames(frames: FrameScheduler) {
    let mut ticker = interval(frames.frame_duration());
    loop {
        ticker.tick().await;
        frames.advance_frame();
    }
}

async fn wait_for_drain(dispatcher: &Dispatcher) {
    let drained = tokio::time::timeout(DRAIN_GRACE, async {
        while dispatcher.stats().total_queued_items > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            grace_secs = DRAIN_GRACE.as_secs(),
            "Calls still queued after grace period"
        );
    }
}

fn log_stats(stats: &StatsSnapshot) {
    info!(
        total_calls = stats.total_calls,
        executed = stats.executed_calls,
        dropped = stats.dropped_calls,
        queued = stats.total_queued_items,
        active_queues = stats.active_queues,
        drop_rate = format!("{:.2}%", stats.drop_rate * 100.0),
        "Throttler stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ChannelConfig, OverflowStrategy, ThrottleConfig};

    fn blueprint(kind: SchedulerKind) -> ThrottlerBlueprint {
        let mut blueprint = ThrottlerBlueprint {
            version: Default::default(),
            throttle: ThrottleConfig::default()
                .with_throttle_interval(Duration::from_millis(100)),
            scheduler: Default::default(),
            channels: vec![ChannelConfig::new("chan1"), ChannelConfig::new("chan2")],
        };
        blueprint.scheduler.kind = kind;
        blueprint
    }

    fn config(blueprint: ThrottlerBlueprint) -> SimulationConfig {
        SimulationConfig {
            blueprint,
            duration: None,
            max_samples: Some(10),
            stats_interval: Duration::from_secs(1),
            metrics_port: None,
        }
    }

    fn assert_accounted(stats: &RunStats) {
        let d = &stats.dispatch;
        assert_eq!(d.total_queued_items, 0);
        assert_eq!(d.total_calls, stats.changes_emitted);
        assert_eq!(d.executed_calls + d.dropped_calls, d.total_calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_sources_drain_before_exit() {
        let simulation = Simulation::new(config(blueprint(SchedulerKind::Tokio)));
        let stats = simulation.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.changes_emitted, 20);
        assert_eq!(stats.calls_accepted, 20);
        assert_eq!(stats.dispatch.executed_calls, 20);
        assert_eq!(stats.cleared_on_shutdown, 0);
        assert_accounted(&stats);

        let executions = stats.executions.unwrap();
        assert_eq!(executions.executed, 20);
        assert_eq!(executions.per_key["value_change_chan1"], 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_scheduler_run() {
        let simulation = Simulation::new(config(blueprint(SchedulerKind::Frame)));
        let stats = simulation.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.dispatch.executed_calls, 20);
        assert_accounted(&stats);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_stops_unbounded_sources() {
        let mut bp = blueprint(SchedulerKind::Tokio);
        bp.throttle = bp
            .throttle
            .with_throttle_interval(Duration::from_millis(250))
            .with_limits(3, OverflowStrategy::DropOldest, 100);

        let mut cfg = config(bp);
        cfg.max_samples = None;
        cfg.duration = Some(Duration::from_secs(2));

        let stats = Simulation::new(cfg).run(std::future::pending()).await.unwrap();

        assert!(stats.changes_emitted > 100);
        assert!(stats.dispatch.dropped_calls > 0);
        assert_accounted(&stats);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_run() {
        let mut cfg = config(blueprint(SchedulerKind::Tokio));
        cfg.max_samples = None;

        let stats = Simulation::new(cfg).run(async {}).await.unwrap();

        assert_accounted(&stats);
    }

    #[test]
    fn test_execution_summary_takes_failures_from_dispatcher() {
        let aggregator = SharedAggregator::default();
        for _ in 0..3 {
            aggregator
                .lock()
                .unwrap()
                .record_execution("value_change_chan1", 2.0, true);
        }
        let dispatch = StatsSnapshot {
            total_calls: 4,
            executed_calls: 4,
            failed_calls: 1,
            ..Default::default()
        };

        let summary = execution_summary(&aggregator, &dispatch);

        assert_eq!(summary.executed, 4);
        assert_eq!(summary.failed, 1);
        assert!((summary.failure_rate - 25.0).abs() < 1e-9);
        assert_eq!(summary.per_key["value_change_chan1"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_fps_fails() {
        let mut bp = blueprint(SchedulerKind::Frame);
        bp.scheduler.fps = 0.0;

        let result = Simulation::new(config(bp)).run(std::future::pending()).await;
        assert!(result.is_err());
    }
}
