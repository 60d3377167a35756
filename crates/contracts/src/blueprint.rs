//! ThrottlerBlueprint - Config Loader 输出
//!
//! 描述完整的运行配置：节流参数、调度器选择、模拟调用源。

use serde::{Deserialize, Serialize};

use crate::ThrottleConfig;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的运行配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlerBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 节流与容量配置
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// 延迟调度器配置
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// 值变化通道 (调用源)
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// 调度器类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// tokio 定时器
    #[default]
    Tokio,
    /// 按帧推进 (延迟换算为帧数)
    Frame,
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 调度器类型
    #[serde(default)]
    pub kind: SchedulerKind,

    /// 帧率 (Hz)，frame 调度器使用，必须 > 0
    #[serde(default = "default_fps")]
    pub fps: f64,
}

fn default_fps() -> f64 {
    60.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::default(),
            fps: default_fps(),
        }
    }
}

/// 值变化通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 通道名称 (唯一)
    pub name: String,

    /// 采样频率 (Hz)，必须 > 0
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: f64,

    /// 波形幅度
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
}

fn default_sample_rate_hz() -> f64 {
    30.0
}

fn default_amplitude() -> f64 {
    1.0
}

impl ChannelConfig {
    /// 使用默认采样参数创建通道
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sample_rate_hz: default_sample_rate_hz(),
            amplitude: default_amplitude(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OverflowStrategy;

    #[test]
    fn test_empty_blueprint_uses_defaults() {
        let bp: ThrottlerBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.throttle, ThrottleConfig::default());
        assert_eq!(bp.scheduler.kind, SchedulerKind::Tokio);
        assert_eq!(bp.scheduler.fps, 60.0);
        assert!(bp.channels.is_empty());
    }

    #[test]
    fn test_blueprint_json() {
        let bp: ThrottlerBlueprint = serde_json::from_str(
            r#"{
                "throttle": { "throttle_interval_secs": 0.25, "max_per_queue": 20, "strategy": "skip_new" },
                "scheduler": { "kind": "frame", "fps": 30.0 },
                "channels": [{ "name": "chan1" }]
            }"#,
        )
        .unwrap();
        assert_eq!(bp.throttle.strategy, OverflowStrategy::SkipNew);
        assert_eq!(bp.throttle.max_per_queue, 20);
        assert_eq!(bp.scheduler.kind, SchedulerKind::Frame);
        assert_eq!(bp.channels[0].sample_rate_hz, 30.0);
        assert_eq!(bp.channels[0].amplitude, 1.0);
    }
}
