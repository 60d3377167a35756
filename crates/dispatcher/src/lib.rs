//! # Dispatcher
//!
//! 按键节流的调用分发模块。
//!
//! 负责：
//! - 每个 key 一条独立的有界队列 (lane)
//! - 同一 key 的两次执行间隔不少于 `throttle_interval`
//! - 队列满时按溢出策略丢弃，并受全局容量约束
//! - 节流等待交给 [`Scheduler`](contracts::Scheduler)，从不阻塞调用方

pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod throttle;

pub use contracts::{OverflowStrategy, ThrottleConfig, ThrottleKey};
pub use dispatcher::{Dispatcher, DispatcherBuilder, LaneState};
pub use error::DispatcherError;
pub use queue::{BoxError, CallOutcome};
pub use scheduler::{FrameScheduler, TokioClock, TokioScheduler};
pub use stats::{DispatchStats, StatsSnapshot};
pub use throttle::{ThrottleDecision, ThrottlePolicy};
