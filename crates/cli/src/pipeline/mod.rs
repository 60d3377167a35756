//! Simulation pipeline: value-change sources feeding the dispatcher.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{Simulation, SimulationConfig};
pub use source::SineSource;
pub use stats::RunStats;
