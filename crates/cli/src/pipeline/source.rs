//! Simulated value-change channel.
//!
//! Samples a sine wave at the channel's sample rate and reports every
//! change, the way a host would notify on a changed channel sample.

use std::f64::consts::TAU;
use std::time::Duration;

use contracts::{CallSource, ChannelConfig, ValueChange};
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Frequency of the simulated signal
const SIGNAL_HZ: f64 = 0.5;

/// Smallest sampling period; guards against absurd sample rates
const MIN_PERIOD: Duration = Duration::from_micros(100);

/// Sine-wave value-change source for one channel
pub struct SineSource {
    channel: ChannelConfig,
    ticker: Interval,
    frame: u64,
    previous: f64,
    max_samples: Option<u64>,
}

impl SineSource {
    /// Create a source sampling `channel` at its configured rate.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(channel: ChannelConfig) -> Self {
        let period = Duration::try_from_secs_f64(1.0 / channel.sample_rate_hz)
            .unwrap_or(Duration::from_secs(1))
            .max(MIN_PERIOD);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            channel,
            ticker,
            frame: 0,
            previous: 0.0,
            max_samples: None,
        }
    }

    /// Stop after `samples` samples
    pub fn with_max_samples(mut self, samples: u64) -> Self {
        self.max_samples = Some(samples);
        self
    }

    fn sample(&self, frame: u64) -> f64 {
        let t = frame as f64 / self.channel.sample_rate_hz;
        self.channel.amplitude * (TAU * SIGNAL_HZ * t).sin()
    }
}

impl CallSource for SineSource {
    fn name(&self) -> &str {
        &self.channel.name
    }

    async fn next_change(&mut self) -> Option<ValueChange> {
        loop {
            if self.max_samples.is_some_and(|max| self.frame >= max) {
                return None;
            }
            self.ticker.tick().await;
            self.frame += 1;

            let value = self.sample(self.frame);
            let previous = std::mem::replace(&mut self.previous, value);
            if value != previous {
                return Some(ValueChange {
                    channel: self.channel.name.clone(),
                    sample_index: 0,
                    value,
                    previous,
                    frame: self.frame,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_emits_changes_until_limit() {
        let mut source = SineSource::new(ChannelConfig::new("chan1")).with_max_samples(3);

        let mut frames = Vec::new();
        while let Some(change) = source.next_change().await {
            assert_eq!(change.channel, "chan1");
            assert_eq!(change.throttle_key(), "value_change_chan1");
            frames.push(change.frame);
        }
        assert_eq!(frames, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_tracks_last_value() {
        let mut source = SineSource::new(ChannelConfig::new("chan1")).with_max_samples(2);

        let first = source.next_change().await.unwrap();
        let second = source.next_change().await.unwrap();
        assert_eq!(first.previous, 0.0);
        assert_eq!(second.previous, first.value);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_amplitude_never_changes() {
        let mut channel = ChannelConfig::new("flat");
        channel.amplitude = 0.0;
        let mut source = SineSource::new(channel).with_max_samples(10);

        assert!(source.next_change().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_stay_within_amplitude() {
        let mut channel = ChannelConfig::new("chan1");
        channel.amplitude = 2.0;
        let mut source = SineSource::new(channel).with_max_samples(90);

        while let Some(change) = source.next_change().await {
            assert!(change.value.abs() <= 2.0);
        }
    }
}
