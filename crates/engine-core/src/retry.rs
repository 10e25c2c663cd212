use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal(E),
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded(E),
    /// Cancellation was requested while waiting between attempts.
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

/// Bounded exponential backoff for one-shot store calls (catalog lookups,
/// table creation). Batch writes use the circuit breaker instead, since
/// they keep retrying for as long as progress is being made.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// No waiting between attempts. Handy for tests.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation, backing off between retryable failures.
    /// Gives up early with [`RetryError::Cancelled`] if `cancel` fires while
    /// sleeping.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        classify: Classifier,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => match classify(&err) {
                    RetryDisposition::Stop => return Err(RetryError::Fatal(err)),
                    RetryDisposition::Retry => {
                        if attempt + 1 >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded(err));
                        }

                        let delay = self.backoff_delay(attempt);
                        warn!(error = %err, attempt = attempt + 1, ?delay, "Retrying after transient failure");
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                            _ = sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                },
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u128 << attempt.min(6);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    fn classify(e: &Flaky) -> RetryDisposition {
        if e.0 {
            RetryDisposition::Retry
        } else {
            RetryDisposition::Stop
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy::immediate(5);
        let result = policy
            .run(
                &CancellationToken::new(),
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Flaky(true))
                    } else {
                        Ok(42)
                    }
                },
                classify,
            )
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = RetryPolicy::immediate(5)
            .run(
                &CancellationToken::new(),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Flaky(false))
                },
                classify,
            )
            .await;
        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run(&CancellationToken::new(), || async { Err(Flaky(true)) }, classify)
            .await;
        assert!(matches!(result, Err(RetryError::AttemptsExceeded(_))));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(10, Duration::from_secs(60), Duration::from_secs(60));
        let result: Result<(), _> = policy
            .run(&cancel, || async { Err(Flaky(true)) }, classify)
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(500));
    }
}
