use log::debug;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times [`retry`] attempts an operation and how long it waits between attempts.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. An operation is always attempted at least once, so a `max_attempts` of
    /// zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The total time spent waiting between attempts when every attempt fails. Saturates at
    /// [`Duration::MAX`].
    pub fn max_wait(&self) -> Duration {
        self.delay
            .checked_mul(self.max_attempts - 1)
            .unwrap_or(Duration::MAX)
    }
}

/// Calls `operation` until it succeeds or `policy.max_attempts()` attempts have been made,
/// sleeping for `policy.delay()` between attempts. When every attempt fails, the error of the last
/// attempt is returned and the earlier errors are dropped.
pub async fn retry<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts => {
                debug!(
                    "Attempt {} of {} failed, giving up: {}",
                    attempt, policy.max_attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                debug!(
                    "Attempt {} of {} failed, retrying in {:?}: {}",
                    attempt, policy.max_attempts, policy.delay, e
                );
            }
        }
        sleep(policy.delay).await;
        attempt += 1;
    }
}
