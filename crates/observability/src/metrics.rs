//! 节流调度指标收集模块
//!
//! 通过 `metrics` facade 记录调度器运行指标；未安装 recorder 时均为空操作。

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// 记录一次提交 (无论是否被接受)
pub fn record_call_submitted(key: &str) {
    counter!("throttler_calls_submitted_total", "key" => key.to_string()).increment(1);
}

/// 记录丢弃的调用数
///
/// `reason`: `global_limit` | `skip_new` | `drop_oldest` | `drop_newest` | `cleared`
pub fn record_call_dropped(key: &str, reason: &'static str, count: u64) {
    counter!(
        "throttler_calls_dropped_total",
        "key" => key.to_string(),
        "reason" => reason
    )
    .increment(count);
}

/// 记录一次执行结果
pub fn record_call_executed(key: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "throttler_calls_executed_total",
        "key" => key.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录队列深度
pub fn record_queue_depth(key: &str, depth: usize) {
    gauge!("throttler_queue_depth", "key" => key.to_string()).set(depth as f64);
}

/// 记录节流等待时长 (毫秒)
pub fn record_throttle_wait_ms(wait_ms: f64) {
    histogram!("throttler_throttle_wait_ms").record(wait_ms);
}

/// 节流执行指标聚合器
///
/// 在内存中聚合执行结果与端到端延迟 (事件产生 -> 实际执行)，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ThrottleMetricsAggregator {
    /// 执行总数
    pub executed: u64,

    /// 执行失败数
    pub failed: u64,

    /// 端到端延迟统计 (毫秒)
    pub latency_ms: RunningStats,

    /// 各 key 执行次数
    pub per_key: BTreeMap<String, u64>,
}

impl ThrottleMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次执行
    pub fn record_execution(&mut self, key: &str, latency_ms: f64, success: bool) {
        self.executed += 1;
        if !success {
            self.failed += 1;
        }
        self.latency_ms.push(latency_ms);
        *self.per_key.entry(key.to_string()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            executed: self.executed,
            failed: self.failed,
            failure_rate: if self.executed > 0 {
                self.failed as f64 / self.executed as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_ms),
            per_key: self.per_key.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub executed: u64,
    pub failed: u64,
    pub failure_rate: f64,
    pub latency_ms: StatsSummary,
    pub per_key: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Execution Summary ===")?;
        writeln!(f, "Executed calls: {}", self.executed)?;
        writeln!(
            f,
            "Failed calls: {} ({:.2}%)",
            self.failed, self.failure_rate
        )?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.per_key.is_empty() {
            writeln!(f, "Executions per key:")?;
            for (key, count) in &self.per_key {
                writeln!(f, "  {}: {}", key, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
