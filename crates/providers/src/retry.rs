use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Bounded retry with exponential backoff and a per-attempt timeout.
///
/// Every collaborator call goes through this; a call that exhausts its
/// retries degrades that unit of work (one node, one batch) to empty
/// output at the call site rather than failing the run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        call_timeout_secs: u64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }

    /// Retry a future with exponential backoff. Each attempt is bounded
    /// by the call timeout.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let outcome = match timeout(self.call_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "{} timed out after {:?}",
                    operation_name,
                    self.call_timeout
                )),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 100, 2000, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, 1, 5, 10);
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = policy
            .retry("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(anyhow!("transient"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, 1, 5, 10);
        let calls = AtomicUsize::new(0);

        let result: Result<u32> = policy
            .retry("broken", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("permanent")) }
            })
            .await;

        assert!(result.is_err());
        // initial attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
