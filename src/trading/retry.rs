//! Bounded retry combinator
//!
//! Retry policy is plain data; the combinator asks the operation for an
//! explicit [`Attempt`] outcome instead of guessing from the error type.
//! Delays come from the `backoff` crate's schedules with jitter disabled so
//! the schedule is deterministic.

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::{BackoffKind, SubmissionConfig};
use crate::error::{Error, Result};

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Transient failure, try again if attempts remain
    Retry(Error),
    /// Stop now and surface this error unchanged
    Fatal(Error),
}

impl<T> Attempt<T> {
    /// Classify a result with [`Error::is_retryable`]
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(e) if e.is_retryable() => Attempt::Retry(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms.max(config.backoff_base_ms)),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffKind::Fixed,
            base_delay: delay,
            max_delay: delay,
        }
    }

    fn schedule(&self) -> Box<dyn Backoff + Send> {
        match self.backoff {
            BackoffKind::Fixed => Box::new(Constant::new(self.base_delay)),
            BackoffKind::Exponential => Box::new(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(self.base_delay)
                    .with_max_interval(self.max_delay)
                    .with_multiplier(2.0)
                    .with_randomization_factor(0.0)
                    .with_max_elapsed_time(None)
                    .build(),
            ),
        }
    }

    /// Delays between consecutive attempts
    pub fn delays(&self) -> Vec<Duration> {
        let mut schedule = self.schedule();
        (1..self.max_attempts)
            .map(|_| schedule.next_backoff().unwrap_or(self.max_delay))
            .collect()
    }
}

/// Run `op` until it succeeds, fails fatally, or attempts run out
///
/// `op` receives the 1-based attempt number. After the last retryable failure
/// the error is [`Error::RetriesExhausted`] carrying that failure.
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut schedule = policy.schedule();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(e) => return Err(e),
            Attempt::Retry(e) => {
                if attempt >= policy.max_attempts {
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = schedule.next_backoff().unwrap_or(policy.max_delay);
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
