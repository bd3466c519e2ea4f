use crate::error::{ErrorKind, Result};
use rvs_config::MetadataSettings;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Exponential backoff for transient commit failures.
///
/// Only [`ErrorKind::Transient`] is retried. Retrying stops once the next
/// sleep would overrun `timeout`, measured from the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            timeout: Duration::from_secs(rvs_config::DEFAULT_COMMIT_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(settings: &MetadataSettings) -> Self {
        Self { timeout: Duration::from_secs(settings.commit_timeout_secs), ..Self::default() }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self { timeout: Duration::ZERO, ..Self::default() }
    }

    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut delay = self.initial_delay;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if *err != ErrorKind::Transient => return Err(err),
                Err(err) => err,
            };
            if started.elapsed() + delay > self.timeout {
                return Err(err.raise(ErrorKind::RetriesExhausted { attempts }));
            }
            tracing::warn!(attempts, ?delay, error = %*err, "Transient commit failure, retrying");
            sleep(delay).await;
            delay = delay.mul_f64(self.multiplier).min(self.max_delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(timeout_secs: u64) -> RetryPolicy {
        RetryPolicy { timeout: Duration::from_secs(timeout_secs), ..RetryPolicy::default() }
    }

    async fn failing_times(calls: &AtomicU32, failures: u32, kind: ErrorKind) -> Result<u32> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            exn::bail!(kind);
        }
        Ok(call)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = policy(3600).run(|| failing_times(&calls, 3, ErrorKind::Transient)).await.unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(3600).run(|| failing_times(&calls, 3, ErrorKind::Database)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_within_timeout() {
        let calls = AtomicU32::new(0);
        // Sleeps of 1s, 2s and 4s fit in 10s; the next 8s would not.
        let err = policy(10).run(|| failing_times(&calls, u32::MAX, ErrorKind::Transient)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::RetriesExhausted { attempts: 4 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_none_never_retries() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::none().run(|| failing_times(&calls, 1, ErrorKind::Transient)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::RetriesExhausted { attempts: 1 });
    }

    #[test]
    fn test_from_config() {
        let settings = MetadataSettings { commit_timeout_secs: 30, ..Default::default() };
        assert_eq!(RetryPolicy::from_config(&settings).timeout, Duration::from_secs(30));
    }
}
