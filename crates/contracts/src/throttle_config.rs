//! Throttle configuration contracts shared by the dispatcher and the config loader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ContractError;

/// Policy applied when a per-key queue is full and a new call arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Evict the oldest queued call, then enqueue the new one
    #[default]
    DropOldest,
    /// Evict the most recently queued *existing* call, then enqueue the new one.
    ///
    /// The incoming call is never the one dropped under this strategy.
    DropNewest,
    /// Refuse the incoming call; the queue is left untouched
    SkipNew,
}

impl OverflowStrategy {
    /// Wire/config name of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
            Self::SkipNew => "skip_new",
        }
    }
}

impl fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowStrategy {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_newest" => Ok(Self::DropNewest),
            "skip_new" => Ok(Self::SkipNew),
            other => Err(ContractError::config_validation(
                "throttle.strategy",
                format!("unknown overflow strategy '{other}' (expected drop_oldest | drop_newest | skip_new)"),
            )),
        }
    }
}

/// Dispatcher throttling and capacity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum time between two executions sharing a key (seconds, >= 0)
    #[serde(default = "default_throttle_interval_secs")]
    pub throttle_interval_secs: f64,

    /// Maximum pending calls per key (>= 1)
    #[serde(default = "default_max_per_queue")]
    pub max_per_queue: usize,

    /// Overflow policy for a full per-key queue
    #[serde(default)]
    pub strategy: OverflowStrategy,

    /// Maximum pending calls summed across all keys (>= 1)
    #[serde(default = "default_global_max")]
    pub global_max: usize,
}

fn default_throttle_interval_secs() -> f64 {
    0.1
}

fn default_max_per_queue() -> usize {
    10
}

fn default_global_max() -> usize {
    100
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            throttle_interval_secs: default_throttle_interval_secs(),
            max_per_queue: default_max_per_queue(),
            strategy: OverflowStrategy::default(),
            global_max: default_global_max(),
        }
    }
}

impl ThrottleConfig {
    /// Conservative limits for hosts that cannot afford deep backlogs:
    /// 5 calls per key, 50 overall, oldest calls evicted first.
    pub fn conservative() -> Self {
        Self {
            max_per_queue: 5,
            strategy: OverflowStrategy::DropOldest,
            global_max: 50,
            ..Self::default()
        }
    }

    /// Throttle interval as a `Duration`.
    ///
    /// Out-of-range values (negative, NaN, infinite, too large for a
    /// `Duration`) map to zero; call [`ThrottleConfig::validate`] first to
    /// reject them instead.
    pub fn throttle_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.throttle_interval_secs).unwrap_or(Duration::ZERO)
    }

    /// Set the throttle interval from a `Duration`
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval_secs = interval.as_secs_f64();
        self
    }

    /// Set capacity limits and overflow strategy
    pub fn with_limits(
        mut self,
        max_per_queue: usize,
        strategy: OverflowStrategy,
        global_max: usize,
    ) -> Self {
        self.max_per_queue = max_per_queue;
        self.strategy = strategy;
        self.global_max = global_max;
        self
    }

    /// Check value ranges.
    ///
    /// `global_max < max_per_queue` is legal (the global cap simply wins);
    /// callers that care can test [`ThrottleConfig::global_below_per_queue`].
    pub fn validate(&self) -> Result<(), ContractError> {
        let secs = self.throttle_interval_secs;
        if !secs.is_finite() || secs < 0.0 {
            return Err(ContractError::config_validation(
                "throttle.throttle_interval_secs",
                format!("throttle interval must be a finite number >= 0, got {secs}"),
            ));
        }
        if Duration::try_from_secs_f64(secs).is_err() {
            return Err(ContractError::config_validation(
                "throttle.throttle_interval_secs",
                format!("throttle interval {secs}s does not fit in a Duration"),
            ));
        }
        if self.max_per_queue == 0 {
            return Err(ContractError::config_validation(
                "throttle.max_per_queue",
                "max_per_queue must be >= 1",
            ));
        }
        if self.global_max == 0 {
            return Err(ContractError::config_validation(
                "throttle.global_max",
                "global_max must be >= 1",
            ));
        }
        Ok(())
    }

    /// True when the global cap is smaller than a single lane's cap
    pub fn global_below_per_queue(&self) -> bool {
        self.global_max < self.max_per_queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ThrottleConfig::default();
        assert_eq!(config.throttle_interval(), Duration::from_millis(100));
        assert_eq!(config.max_per_queue, 10);
        assert_eq!(config.strategy, OverflowStrategy::DropOldest);
        assert_eq!(config.global_max, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conservative() {
        let config = ThrottleConfig::conservative();
        assert_eq!(config.max_per_queue, 5);
        assert_eq!(config.global_max, 50);
    }

    #[test]
    fn test_strategy_serde_snake_case() {
        let json = serde_json::to_string(&OverflowStrategy::DropNewest).unwrap();
        assert_eq!(json, "\"drop_newest\"");
        let parsed: OverflowStrategy = serde_json::from_str("\"skip_new\"").unwrap();
        assert_eq!(parsed, OverflowStrategy::SkipNew);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "drop_oldest".parse::<OverflowStrategy>().unwrap(),
            OverflowStrategy::DropOldest
        );
        assert!("drop_random".parse::<OverflowStrategy>().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_interval() {
        let config = ThrottleConfig {
            throttle_interval_secs: -0.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("throttle_interval_secs"));
    }

    #[test]
    fn test_validate_rejects_nan_interval() {
        let config = ThrottleConfig {
            throttle_interval_secs: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_interval_beyond_duration_range() {
        let config = ThrottleConfig {
            throttle_interval_secs: 1e20,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_validate_accepts_zero_interval() {
        let config = ThrottleConfig::default().with_throttle_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
        assert_eq!(config.throttle_interval(), Duration::ZERO);
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        let per_queue = ThrottleConfig::default().with_limits(0, OverflowStrategy::SkipNew, 10);
        assert!(per_queue.validate().is_err());

        let global = ThrottleConfig::default().with_limits(1, OverflowStrategy::SkipNew, 0);
        assert!(global.validate().is_err());
    }

    #[test]
    fn test_global_below_per_queue_is_allowed() {
        let config = ThrottleConfig::default().with_limits(20, OverflowStrategy::DropOldest, 5);
        assert!(config.validate().is_ok());
        assert!(config.global_below_per_queue());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ThrottleConfig =
            serde_json::from_str(r#"{ "throttle_interval_secs": 0.25 }"#).unwrap();
        assert_eq!(config.throttle_interval(), Duration::from_millis(250));
        assert_eq!(config.max_per_queue, 10);
        assert_eq!(config.global_max, 100);
    }
}
