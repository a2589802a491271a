use log::{info, warn};
use std::future::Future;
use std::time::Duration;

/// Whole-operation retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once_after(Duration::from_secs(600))
    }
}

/// A successful result and the attempt (1-based) that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempt: u32,
}

impl<T> Attempted<T> {
    /// True when an earlier attempt failed.
    pub fn recovered(&self) -> bool {
        self.attempt > 1
    }
}

impl RetryPolicy {
    /// A single retry after `delay`.
    pub fn once_after(delay: Duration) -> Self {
        Self {
            max_attempts: 2,
            delay,
        }
    }

    /// Runs `operation` until it succeeds or the attempts run out, sleeping
    /// `delay` before every retry. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<Attempted<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(Attempted { value, attempt });
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Attempt {} of {} failed, retrying in {}s: {}",
                        attempt,
                        max_attempts,
                        self.delay.as_secs(),
                        e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Operation failed after {} attempt(s): {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_on_second_attempt() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::once_after(Duration::from_secs(600));
        let started = tokio::time::Instant::now();

        let counter = attempt_count.clone();
        let result = policy
            .run(|_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(anyhow::anyhow!("Temporary failure"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, "success");
        assert!(result.recovered());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_does_not_sleep() {
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let result = policy
            .run(|attempt| async move { Ok::<_, anyhow::Error>(attempt) })
            .await
            .unwrap();

        assert_eq!(result.value, 1);
        assert!(!result.recovered());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::once_after(Duration::from_secs(10));

        let counter = attempt_count.clone();
        let result: Result<Attempted<()>, anyhow::Error> = policy
            .run(|attempt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("failure {}", attempt))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "failure 2");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }
}
