//! Randomized inter-request delay
//!
//! Both modes draw from the same uniform `[min, max]` seconds distribution.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use crate::config::ScrapingConfig;

/// Randomized delay before outbound requests
#[derive(Debug, Clone, Copy)]
pub struct Throttler {
    min_secs: f64,
    max_secs: f64,
}

impl Throttler {
    /// Create a throttler drawing from `[min_secs, max_secs]`
    ///
    /// Inverted bounds are swapped; negative bounds are clamped to zero.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let (lo, hi) = if min_secs <= max_secs {
            (min_secs, max_secs)
        } else {
            (max_secs, min_secs)
        };
        Self {
            min_secs: lo.max(0.0),
            max_secs: hi.max(0.0),
        }
    }

    pub fn from_config(config: &ScrapingConfig) -> Self {
        Self::new(config.delay_range[0], config.delay_range[1])
    }

    /// Throttler that never waits
    pub fn disabled() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Configured bounds in seconds
    pub fn bounds(&self) -> (f64, f64) {
        (self.min_secs, self.max_secs)
    }

    /// Draw one delay from the distribution
    pub fn sample(&self) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs);
        }
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs_f64(secs)
    }

    /// Suspend the calling task for a random delay
    pub async fn delay(&self) -> Duration {
        let wait = self.sample();
        debug!(delay_secs = wait.as_secs_f64(), "Throttling");
        tokio::time::sleep(wait).await;
        wait
    }

    /// Block the calling thread for a random delay
    ///
    /// For blocking job bodies only; never call this from an async task.
    pub fn delay_blocking(&self) -> Duration {
        let wait = self.sample();
        debug!(delay_secs = wait.as_secs_f64(), "Throttling (blocking)");
        std::thread::sleep(wait);
        wait
    }
}
