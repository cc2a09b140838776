//! Bounded retry with backoff for external stage calls.
//!
//! Wraps a single [`StageClient`](crate::clients::StageClient) call:
//! transient failures are retried up to the attempt ceiling with backoff and
//! jitter, permanent failures propagate immediately, and exhausting the
//! ceiling converts the failure to permanent. Each retry is surfaced to the
//! progress reporter as a non-terminal event.

use crate::config::RetryConfig;
use crate::errors::StageFailure;
use crate::job::{JobId, Stage};
use crate::progress::{ProgressEvent, ProgressSink};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant(Duration),
    /// Linear increase: delay * attempt.
    Linear(Duration),
    /// Exponential: delay * 2^attempt.
    Exponential(Duration),
}

impl BackoffStrategy {
    /// Calculates the delay for a given attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant(d) => *d,
            Self::Linear(d) => *d * attempt,
            Self::Exponential(d) => *d * 2u32.pow(attempt.saturating_sub(1)),
        }
    }
}

/// Jitter strategy for adding randomness to delays.
#[derive(Debug, Clone, Copy)]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Full jitter: [0, delay].
    Full,
    /// Equal jitter: [delay/2, delay].
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();

        match self {
            Self::None => delay,
            Self::Full => {
                let millis = delay.as_millis() as u64;
                Duration::from_millis(rng.gen_range(0..=millis))
            }
            Self::Equal => {
                let millis = delay.as_millis() as u64;
                let half = millis / 2;
                Duration::from_millis(half + rng.gen_range(0..=half))
            }
        }
    }
}

/// Retry policy wrapping one external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffStrategy,
    jitter: JitterStrategy,
    max_delay: Duration,
    call_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Default cap on a single backoff delay.
    const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Creates a new retry policy.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: BackoffStrategy, jitter: JitterStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            jitter,
            max_delay: Self::DEFAULT_MAX_DELAY,
            call_timeout: None,
        }
    }

    /// Creates a simple policy with constant delay and no jitter.
    #[must_use]
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, BackoffStrategy::Constant(delay), JitterStrategy::None)
    }

    /// Creates an exponential backoff policy with full jitter.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(
            max_attempts,
            BackoffStrategy::Exponential(base_delay),
            JitterStrategy::Full,
        )
    }

    /// Builds the policy described by a [`RetryConfig`].
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::exponential(config.max_attempts, config.base_delay())
            .with_max_delay(config.max_delay())
            .with_call_timeout(config.call_timeout())
    }

    /// Caps a single backoff delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the per-attempt timeout; a timed-out attempt counts as a
    /// transient failure.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// The attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculates the (capped, jittered) delay before the next attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.delay(attempt).min(self.max_delay);
        self.jitter.apply(base)
    }

    /// Runs one stage call under this policy.
    ///
    /// `operation` is invoked once per attempt and must be restartable.
    pub async fn run<T, F, Fut>(
        &self,
        job_id: JobId,
        stage: Stage,
        sink: &dyn ProgressSink,
        mut operation: F,
    ) -> Result<T, StageFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageFailure>> + Send,
    {
        let mut attempt: u32 = 1;
        loop {
            let outcome = match self.call_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(StageFailure::transient(format!(
                        "call timed out after {:.0}s",
                        timeout.as_secs_f64()
                    ))),
                },
                None => operation().await,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(failure) if failure.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        job_id = %job_id,
                        stage = %stage,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.message,
                        "transient failure, retrying"
                    );
                    sink.try_notify(ProgressEvent::retrying(
                        job_id,
                        stage,
                        attempt,
                        self.max_attempts,
                        &failure.message,
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) if failure.is_transient() => {
                    debug!(job_id = %job_id, stage = %stage, "retry ceiling exhausted");
                    return Err(failure.exhausted(self.max_attempts));
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureKind;
    use crate::progress::{CollectingProgressSink, NoOpProgressSink, ProgressStatus};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_constant_backoff() {
        let strategy = BackoffStrategy::Constant(Duration::from_secs(1));
        assert_eq!(strategy.delay(1), Duration::from_secs(1));
        assert_eq!(strategy.delay(5), Duration::from_secs(1));
    }

    #[test]
    fn test_linear_backoff() {
        let strategy = BackoffStrategy::Linear(Duration::from_secs(1));
        assert_eq!(strategy.delay(1), Duration::from_secs(1));
        assert_eq!(strategy.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = BackoffStrategy::Exponential(Duration::from_secs(1));
        assert_eq!(strategy.delay(1), Duration::from_secs(1));
        assert_eq!(strategy.delay(2), Duration::from_secs(2));
        assert_eq!(strategy.delay(3), Duration::from_secs(4));
        assert_eq!(strategy.delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_no_jitter() {
        let jitter = JitterStrategy::None;
        let delay = Duration::from_secs(10);
        assert_eq!(jitter.apply(delay), delay);
    }

    #[test]
    fn test_full_jitter_bounds() {
        let jitter = JitterStrategy::Full;
        let delay = Duration::from_secs(10);

        for _ in 0..100 {
            let result = jitter.apply(delay);
            assert!(result <= delay);
        }
    }

    type BoxedAttempt =
        std::pin::Pin<Box<dyn Future<Output = Result<u32, StageFailure>> + Send>>;

    fn counting_op(
        failures_before_success: usize,
    ) -> (Arc<Mutex<usize>>, impl FnMut() -> BoxedAttempt) {
        let calls = Arc::new(Mutex::new(0usize));
        let calls_clone = Arc::clone(&calls);
        let op = move || {
            let calls = Arc::clone(&calls_clone);
            let attempt: BoxedAttempt = Box::pin(async move {
                let n = {
                    let mut guard = calls.lock();
                    *guard += 1;
                    *guard
                };
                if n <= failures_before_success {
                    Err(StageFailure::transient("flaky"))
                } else {
                    Ok(n as u32)
                }
            });
            attempt
        };
        (calls, op)
    }

    #[tokio::test]
    async fn test_run_succeeds_first_attempt() {
        let policy = RetryPolicy::constant(3, Duration::from_millis(1));
        let (calls, op) = counting_op(0);

        let result = policy
            .run(JobId::new(), Stage::Scripting, &NoOpProgressSink, op)
            .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_run_retries_transient_until_success() {
        let policy = RetryPolicy::constant(3, Duration::from_millis(1));
        let (calls, op) = counting_op(2);

        let result = policy
            .run(JobId::new(), Stage::Scripting, &NoOpProgressSink, op)
            .await;

        assert!(result.is_ok());
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_run_exhaustion_converts_to_permanent() {
        let policy = RetryPolicy::constant(3, Duration::from_millis(1));
        let (calls, op) = counting_op(10);

        let failure = policy
            .run(JobId::new(), Stage::Scripting, &NoOpProgressSink, op)
            .await
            .unwrap_err();

        assert_eq!(*calls.lock(), 3);
        assert_eq!(failure.kind, FailureKind::Permanent);
        assert!(failure.message.contains("exhausted"));
    }

    #[tokio::test]
    async fn test_run_permanent_no_retry() {
        let policy = RetryPolicy::constant(5, Duration::from_millis(1));
        let calls = Arc::new(Mutex::new(0usize));
        let calls_clone = Arc::clone(&calls);

        let failure = policy
            .run(JobId::new(), Stage::Scripting, &NoOpProgressSink, move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    *calls.lock() += 1;
                    Err::<(), _>(StageFailure::permanent("invalid topic"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(*calls.lock(), 1);
        assert_eq!(failure.kind, FailureKind::Permanent);
    }

    #[tokio::test]
    async fn test_run_emits_retry_events() {
        let policy = RetryPolicy::constant(3, Duration::from_millis(1));
        let sink = CollectingProgressSink::new();
        let job_id = JobId::new();
        let (_calls, op) = counting_op(2);

        policy
            .run(job_id, Stage::UploadingPrimary, &sink, op)
            .await
            .unwrap();

        let retries: Vec<_> = sink
            .events_for(job_id)
            .into_iter()
            .filter(|e| e.status == ProgressStatus::Retrying)
            .collect();
        assert_eq!(retries.len(), 2);
        assert!(retries[0]
            .message
            .as_deref()
            .unwrap()
            .contains("attempt 1 of 3"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let policy = RetryPolicy::constant(2, Duration::from_millis(1))
            .with_call_timeout(Duration::from_millis(20));

        let failure = policy
            .run(JobId::new(), Stage::Assembling, &NoOpProgressSink, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), _>(())
            })
            .await
            .unwrap_err();

        // Both attempts timed out; exhaustion makes it permanent.
        assert_eq!(failure.kind, FailureKind::Permanent);
        assert!(failure.message.contains("timed out"));
    }
}
