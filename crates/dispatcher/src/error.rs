//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Rejected configuration (interval, capacities)
    #[error("invalid dispatcher configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// Frame scheduler needs a positive, finite frame rate
    #[error("invalid frame rate {fps}: must be a finite number > 0")]
    InvalidFrameRate { fps: f64 },

    /// Tokio scheduler created outside of a runtime
    #[error("no tokio runtime available: {message}")]
    NoRuntime { message: String },
}

impl DispatcherError {
    /// Create a no-runtime error
    pub fn no_runtime(message: impl Into<String>) -> Self {
        Self::NoRuntime {
            message: message.into(),
        }
    }
}
