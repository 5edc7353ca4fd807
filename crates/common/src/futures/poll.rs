use std::{
    fmt::Display,
    ops::ControlFlow,
    time::{Duration, Instant},
};

const EXPONENTIAL_BACKOFF_MAX_WAIT_DURATION: Duration = Duration::from_secs(60);

/// Polls a future factory until it yields a [`ControlFlow::Break`] or until the polling duration
/// is exhausted.
///
/// The future is always polled at least once. Between two attempts the function sleeps according
/// to the [`PollingWaitBehavior`], and the sleep is clamped so that the total time spent never
/// exceeds `polling_duration` by more than the duration of a single attempt.
///
/// Unlike a retry loop this function has no notion of a failed attempt: the future itself decides
/// whether what it observed means "keep waiting" ([`ControlFlow::Continue`]) or "done"
/// ([`ControlFlow::Break`]).
pub async fn poll<F, O>(
    polling_duration: Duration,
    polling_wait_behavior: PollingWaitBehavior,
    mut future: impl FnMut() -> F,
) -> Result<O, PollingTimeout>
where
    F: Future<Output = ControlFlow<O, ()>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let ControlFlow::Break(output) = future().await {
            return Ok(output);
        }

        let elapsed = start.elapsed();
        if elapsed >= polling_duration {
            return Err(PollingTimeout { attempts, elapsed });
        }

        let next_wait_duration = polling_wait_behavior
            .wait_duration(attempts - 1)
            .min(polling_duration - elapsed);
        tokio::time::sleep(next_wait_duration).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PollingWaitBehavior {
    Constant(Duration),
    #[default]
    ExponentialBackoff,
}

impl PollingWaitBehavior {
    fn wait_duration(&self, retries: u32) -> Duration {
        match self {
            Self::Constant(duration) => *duration,
            Self::ExponentialBackoff => 2u64
                .checked_pow(retries)
                .map(Duration::from_secs)
                .unwrap_or(EXPONENTIAL_BACKOFF_MAX_WAIT_DURATION)
                .min(EXPONENTIAL_BACKOFF_MAX_WAIT_DURATION),
        }
    }
}

/// Returned by [`poll`] when the polled future never broke out of the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingTimeout {
    pub attempts: u32,
    pub elapsed: Duration,
}

impl Display for PollingTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "polling gave up after {} attempts and {:?}",
            self.attempts, self.elapsed
        )
    }
}

impl std::error::Error for PollingTimeout {}
