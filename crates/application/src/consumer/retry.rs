use std::time::Duration;

use infrastructure::config::ConsumerConfig;

/// Exponential backoff for consumer-level redelivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier: multiplier.max(1.0),
            max_delay,
        }
    }

    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            config.backoff_multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// `min(initial * multiplier^retry_count, max)`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_millis = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}
