//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置文件 -> Dispatcher -> 调度器 的端到端测试
//! - 典型突发负载场景

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_default_blueprint_is_valid() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            "",
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(blueprint.throttle, contracts::ThrottleConfig::default());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::ConfigLoader;
    use contracts::{CallSource, OverflowStrategy, SchedulerKind, ThrottlerBlueprint, ValueChange};
    use dispatcher::{Dispatcher, FrameScheduler, LaneState};

    /// Replays a fixed list of changes
    struct ScriptedSource {
        changes: VecDeque<ValueChange>,
    }

    impl ScriptedSource {
        fn burst(channel: &str, count: u64) -> Self {
            let changes = (1..=count)
                .map(|frame| ValueChange {
                    channel: channel.to_string(),
                    sample_index: 0,
                    value: frame as f64,
                    previous: (frame - 1) as f64,
                    frame,
                })
                .collect();
            Self { changes }
        }
    }

    impl CallSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn next_change(&mut self) -> Option<ValueChange> {
            self.changes.pop_front()
        }
    }

    type Executed = Arc<Mutex<Vec<u64>>>;

    /// Submit every change of `source`; returns how many were accepted
    async fn pump<S: CallSource>(source: &mut S, dispatcher: &Dispatcher, executed: &Executed) -> u64 {
        let mut accepted = 0;
        while let Some(change) = source.next_change().await {
            let log = Arc::clone(executed);
            let frame = change.frame;
            if dispatcher.submit(change.throttle_key(), move || {
                log.lock().unwrap().push(frame);
                Ok(())
            }) {
                accepted += 1;
            }
        }
        accepted
    }

    fn write_config(dir: &Path, name: &str, content: &str) -> ThrottlerBlueprint {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        ConfigLoader::load_from_path(&path).unwrap()
    }

    /// End-to-end: TOML file -> ConfigLoader -> Dispatcher on a frame scheduler
    ///
    /// A burst of 50 changes on one channel under 20 / drop_oldest / 100:
    /// the first runs at once, the queue keeps the newest 20 and the rest
    /// are dropped; the survivors drain one interval apart.
    #[tokio::test]
    async fn test_e2e_frame_scheduled_burst() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = write_config(
            dir.path(),
            "throttler.toml",
            r#"
[throttle]
throttle_interval_secs = 0.25
max_per_queue = 20
strategy = "drop_oldest"
global_max = 100

[scheduler]
kind = "frame"
fps = 64.0

[[channels]]
name = "chan1"
"#,
        );
        assert_eq!(blueprint.scheduler.kind, SchedulerKind::Frame);

        let frames = FrameScheduler::new(blueprint.scheduler.fps).unwrap();
        let dispatcher = Dispatcher::with_frame_scheduler(blueprint.throttle.clone(), &frames).unwrap();
        let executed = Executed::default();

        let mut source = ScriptedSource::burst("chan1", 50);
        let accepted = pump(&mut source, &dispatcher, &executed).await;
        assert_eq!(accepted, 50);

        let stats = dispatcher.stats();
        assert_eq!(stats.total_calls, 50);
        assert_eq!(stats.dropped_calls, 29);
        assert_eq!(stats.queue_details["value_change_chan1"], 20);
        assert_eq!(*executed.lock().unwrap(), vec![1]);

        // 16 frames per interval at 64 fps
        frames.run_until_idle(10_000);
        assert_eq!(frames.frame(), 20 * 16);

        let expected: Vec<u64> = std::iter::once(1).chain(31..=50).collect();
        assert_eq!(*executed.lock().unwrap(), expected);
        assert_eq!(dispatcher.stats().executed_calls, 21);
        assert_eq!(dispatcher.lane_state("value_change_chan1"), LaneState::Idle);
    }

    /// Three channels under a global budget of 3: each holds one waiting
    /// call and a fourth channel is rejected outright.
    #[tokio::test(start_paused = true)]
    async fn test_e2e_global_budget_with_tokio_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = write_config(
            dir.path(),
            "throttler.json",
            r#"{
                "throttle": {
                    "throttle_interval_secs": 0.1,
                    "max_per_queue": 10,
                    "strategy": "drop_oldest",
                    "global_max": 3
                }
            }"#,
        );

        let dispatcher = Dispatcher::with_tokio(blueprint.throttle).unwrap();
        let executed = Executed::default();

        for channel in ["a", "b", "c"] {
            let mut source = ScriptedSource::burst(channel, 2);
            assert_eq!(pump(&mut source, &dispatcher, &executed).await, 2);
        }
        assert_eq!(dispatcher.stats().total_queued_items, 3);

        let mut late = ScriptedSource::burst("d", 1);
        assert_eq!(pump(&mut late, &dispatcher, &executed).await, 0);
        assert_eq!(dispatcher.stats().dropped_calls, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let stats = dispatcher.stats();
        assert_eq!(stats.total_queued_items, 0);
        assert_eq!(stats.executed_calls, 6);
        assert_eq!(stats.deferred_resumes, 3);
    }

    /// An emergency clear cancels every parked lane; nothing runs afterwards.
    #[tokio::test(start_paused = true)]
    async fn test_e2e_emergency_clear() {
        let config = contracts::ThrottleConfig::default()
            .with_throttle_interval(Duration::from_millis(100))
            .with_limits(5, OverflowStrategy::SkipNew, 100);
        let dispatcher = Dispatcher::with_tokio(config).unwrap();
        let executed = Executed::default();

        let mut source = ScriptedSource::burst("chan1", 10);
        assert_eq!(pump(&mut source, &dispatcher, &executed).await, 6);
        assert_eq!(dispatcher.stats().dropped_calls, 4);

        assert_eq!(dispatcher.clear_all(), 5);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(*executed.lock().unwrap(), vec![1]);
        let stats = dispatcher.stats();
        assert_eq!(stats.dropped_calls, 9);
        assert_eq!(stats.total_queued_items, 0);
        assert_eq!(stats.executed_calls + stats.dropped_calls, stats.total_calls);
    }

    /// Execution metrics aggregate per key across lanes
    #[test]
    fn test_metrics_aggregator_per_key() {
        let mut aggregator = observability::ThrottleMetricsAggregator::default();
        aggregator.record_execution("value_change_a", 2.0, true);
        aggregator.record_execution("value_change_a", 4.0, false);
        aggregator.record_execution("value_change_b", 6.0, true);

        let summary = aggregator.summary();
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.per_key["value_change_a"], 2);
        assert!((summary.latency_ms.mean - 4.0).abs() < 1e-9);
    }
}
