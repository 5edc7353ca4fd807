use std::time::Duration;

/// A bounded retry schedule where the wait between two attempts doubles every time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// The number of retries allowed after the first attempt.
    pub max_retries: u32,
    /// The wait duration before the first retry.
    pub initial_delay: Duration,
}

impl ExponentialBackoff {
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// A schedule which never retries.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// The total number of attempts this schedule permits, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The delay to wait before the given retry, where retry `0` is the first retry.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.checked_pow(retry).unwrap_or(u32::MAX))
    }

    /// Iterates over the delays of all the retries in the schedule.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|retry| self.delay_before_retry(retry))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}
