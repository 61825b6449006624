use rand::Rng;
use std::time::Duration;

use crate::datalayer::db_ops::constants::ConnectionConfig;

/// Exponential backoff with bounded jitter calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_fraction: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
            jitter_fraction: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Default::default()
    }

    /// Backoff matching the retry policy of a connection config
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base_delay_ms: config.retry_base_delay.as_millis() as u64,
            max_delay_ms: config.retry_max_delay.as_millis() as u64,
            jitter_fraction: config.jitter_fraction.clamp(0.0, 1.0),
        }
    }

    pub fn set_base_delay_ms(&mut self, base_delay_ms: u64) -> &mut Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn set_max_delay_ms(&mut self, max_delay_ms: u64) -> &mut Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn set_jitter_fraction(&mut self, jitter_fraction: f64) -> &mut Self {
        self.jitter_fraction = jitter_fraction.clamp(0.0, 1.0);
        self
    }

    /// Calculates the delay before the next attempt, after `attempt` failed.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that just failed (1-indexed)
    ///
    /// # Algorithm
    ///
    /// `delay = min(base * 2^(attempt-1) * (1 + jitter_fraction * r), max_delay)`
    /// with `r` drawn uniformly from `[0, 1)`.
    ///
    /// Jitter only ever lengthens the delay.
    ///
    /// # Example
    ///
    /// ```
    /// use reputation_shield_backend::datalayer::helper::backoff::ExponentialBackoff;
    ///
    /// let mut backoff = ExponentialBackoff::new();
    /// backoff.set_base_delay_ms(100).set_jitter_fraction(0.1);
    ///
    /// let delay = backoff.delay_for(3);
    /// // Third failure: between 400ms and 440ms
    /// assert!(delay.as_millis() >= 400 && delay.as_millis() <= 440);
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with_sample(attempt, sample)
    }

    /// Deterministic form of [`delay_for`](Self::delay_for) with the random
    /// sample supplied by the caller.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        // 2^62 ms is already far past any sane cap
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let exponential = self.base_delay_ms as f64 * 2f64.powi(exponent);
        let jittered = exponential * (1.0 + self.jitter_fraction * sample.clamp(0.0, 1.0));
        let capped = jittered.min(self.max_delay_ms as f64);

        Duration::from_millis(capped.round() as u64)
    }

    /// Smallest delay `delay_for(attempt)` can return
    pub fn lower_bound(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, 0.0)
    }

    /// Largest delay `delay_for(attempt)` can return
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, 1.0)
    }
}
