use crate::prelude::*;
use chrono::prelude::*;
use retry_policies::{RetryDecision, RetryPolicy};
use std::future::Future;
use std::time::Duration;

/// Waits the same `delay` between attempts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedDelay {
    /// Total number of attempts including the first one.
    pub(crate) attempts: u32,
    pub(crate) delay: Duration,
}

/// Waits `attempt * delay` after the failed attempt number `attempt`
/// (counting from 1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct LinearBackoff {
    /// Total number of attempts including the first one.
    pub(crate) attempts: u32,
    pub(crate) delay: Duration,
}

impl RetryPolicy for FixedDelay {
    fn should_retry(&self, n_past_retries: u32) -> RetryDecision {
        retry_after(self.attempts, n_past_retries, self.delay)
    }
}

impl RetryPolicy for LinearBackoff {
    fn should_retry(&self, n_past_retries: u32) -> RetryDecision {
        retry_after(self.attempts, n_past_retries, self.delay * (n_past_retries + 1))
    }
}

fn retry_after(attempts: u32, n_past_retries: u32, delay: Duration) -> RetryDecision {
    if n_past_retries + 1 >= attempts {
        return RetryDecision::DoNotRetry;
    }
    let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    RetryDecision::Retry {
        execute_after: Utc::now() + delay,
    }
}

/// Runs `f` until it succeeds, returns a non-retryable error, or the `policy`
/// gives up. The last error is returned in the latter case.
pub(crate) async fn retry<T, E, Fut>(
    policy: &impl RetryPolicy,
    mut f: impl FnMut() -> Fut,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(output) => {
                if attempt > 0 {
                    warn!(%attempt, "Operation succeeded after a retry");
                }
                return Ok(output);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            if attempt > 0 {
                warn!(%attempt, "Operation failed with a non-retryable error after a retry");
            }
            return Err(err);
        }

        let execute_after = match policy.should_retry(attempt) {
            RetryDecision::Retry { execute_after } => execute_after,
            RetryDecision::DoNotRetry => {
                warn!(%attempt, err = tracing_err(&err), "Giving up retrying the operation");
                return Err(err);
            }
        };

        let duration = (execute_after.signed_duration_since(Utc::now()))
            .to_std()
            .unwrap_or(Duration::ZERO);

        warn!(
            %attempt,
            err = tracing_err(&err),
            duration = tracing_duration(duration),
            "Sleeping before the next attempt",
        );

        tokio::time::sleep(duration).await;

        attempt += 1;
    }
}
