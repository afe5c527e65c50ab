//! Pacing for publish retries.
//!
//! A publish the bus rejects is retried under a fresh job id after a
//! pause. Pauses grow geometrically from `initial_delay` and never exceed
//! `max_delay`.

use std::time::Duration;

/// Pauses between attempts to publish one job.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Pause before the second attempt.
    pub initial_delay: Duration,
    /// Longest pause between two attempts.
    pub max_delay: Duration,
    /// Growth of the pause after each rejected attempt.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Pause before each retry, in order. The sequence never ends; a
    /// publisher takes one per retry it is allowed.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |pause| Some(self.grow(*pause)))
    }

    /// A multiplier that overflows, or is negative or NaN, pins the pause
    /// at `max_delay`.
    fn grow(&self, pause: Duration) -> Duration {
        Duration::try_from_secs_f64(pause.as_secs_f64() * self.multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}
