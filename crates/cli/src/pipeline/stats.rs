//! Run statistics.

use std::time::Duration;

use dispatcher::StatsSnapshot;
use observability::MetricsSummary;
use serde::Serialize;

/// Statistics from a simulation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,

    /// Value changes produced by all sources
    pub changes_emitted: u64,

    /// Submissions accepted by the dispatcher
    pub calls_accepted: u64,

    /// Pending calls discarded by the shutdown clear
    pub cleared_on_shutdown: usize,

    /// Dispatcher statistics after shutdown
    pub dispatch: StatsSnapshot,

    /// Executions observed by the handlers
    #[serde(skip)]
    pub executions: Option<MetricsSummary>,
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration.as_secs_f64())
}

impl RunStats {
    /// Executed calls per second
    pub fn execution_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.dispatch.executed_calls as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Throttler Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Value changes: {}", self.changes_emitted);
        println!("   ├─ Accepted calls: {}", self.calls_accepted);
        println!("   ├─ Executions/s: {:.2}", self.execution_rate());
        println!("   └─ Cleared on shutdown: {}", self.cleared_on_shutdown);

        let d = &self.dispatch;
        println!("\n📈 Dispatcher");
        println!("   ├─ Total calls: {}", d.total_calls);
        println!("   ├─ Executed: {}", d.executed_calls);
        println!("   ├─ Failed: {}", d.failed_calls);
        println!(
            "   ├─ Dropped: {} ({:.2}%)",
            d.dropped_calls,
            d.drop_rate * 100.0
        );
        println!("   ├─ Deferred resumes: {}", d.deferred_resumes);
        println!("   └─ Still queued: {}", d.total_queued_items);

        if let Some(executions) = &self.executions {
            println!("\n{executions}");
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_rate() {
        let mut stats = RunStats {
            duration: Duration::from_secs(4),
            ..Default::default()
        };
        stats.dispatch.executed_calls = 10;
        assert!((stats.execution_rate() - 2.5).abs() < f64::EPSILON);

        stats.duration = Duration::ZERO;
        assert_eq!(stats.execution_rate(), 0.0);
    }

    #[test]
    fn test_serializes_duration_as_secs() {
        let stats = RunStats {
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["duration"], 1.5);
        assert!(json.get("executions").is_none());
    }
}
