//! Scheduler port implementations
//!
//! Contains the tokio timer scheduler and the frame-stepped scheduler.

mod frame;
mod timer;

pub use self::frame::FrameScheduler;
pub use self::timer::{TokioClock, TokioScheduler};
