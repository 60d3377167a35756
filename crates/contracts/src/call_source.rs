//! CallSource trait - producers of throttled calls
//!
//! Abstracts event producers (sample/value-change notifications, timers,
//! external triggers) that feed the dispatcher. The dispatcher itself never
//! depends on this trait; it only sees keys and callables.

use serde::{Deserialize, Serialize};

/// A sample value changed on a named channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    /// Channel that changed
    pub channel: String,
    /// Index of the changed sample within the channel
    pub sample_index: usize,
    /// New sample value
    pub value: f64,
    /// Previous sample value
    pub previous: f64,
    /// Host frame number at which the change was observed
    pub frame: u64,
}

impl ValueChange {
    /// Throttle key conventionally used for this change: one lane per channel
    pub fn throttle_key(&self) -> String {
        value_change_key(&self.channel)
    }
}

/// Throttle key for value changes on `channel`
pub fn value_change_key(channel: &str) -> String {
    format!("value_change_{channel}")
}

/// Source of value-change events.
///
/// `next_change` resolves to `None` once the source is exhausted or stopped.
#[trait_variant::make(CallSource: Send)]
pub trait LocalCallSource {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Wait for the next change
    async fn next_change(&mut self) -> Option<ValueChange>;
}
