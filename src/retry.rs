use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry policy with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before each retry
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Preset for the reviews loader: 2 retries, 1s apart.
    pub fn reviews_loader() -> Self {
        Self::new(2, Duration::from_secs(1))
    }

    /// A single attempt with no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay to wait before `attempt` (0-indexed), or `None` once the
    /// policy is exhausted.
    ///
    /// The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        match attempt {
            0 => Some(Duration::ZERO),
            n if n <= self.max_retries => Some(self.delay),
            _ => None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reviews_loader()
    }
}

/// Execute an async operation under `policy`
///
/// # Returns
/// The first successful result, or the last error once the policy is exhausted
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        policy.max_attempts()
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                attempt += 1;
                let Some(delay) = policy.delay_before(attempt) else {
                    warn!(
                        "{}: All {} attempts failed. Last error: {}",
                        operation_name,
                        policy.max_attempts(),
                        e
                    );
                    return Err(e);
                };

                warn!(
                    "{}: Attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name,
                    attempt,
                    policy.max_attempts(),
                    e,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}
