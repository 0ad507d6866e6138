//! Bounded retry for transient filesystem errors, and log throttling for
//! housekeeping that fails on every tick.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff with a retry bound and a delay cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    label: &'static str,
    /// Retries after the first attempt.
    pub retries: u32,
    /// First delay; doubles after each failed retry.
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(label: &'static str, retries: u32, base: Duration) -> Self {
        Self {
            label,
            retries,
            base,
            cap: Duration::from_secs(2),
        }
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(retry)).min(self.cap)
    }
}

/// Every attempt failed; `error` is the last one.
#[derive(Debug, PartialEq)]
pub struct GaveUp<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `attempt` until it succeeds or the backoff's retries are spent.
pub async fn retry_async<F, Fut, T, E>(backoff: &Backoff, mut attempt: F) -> Result<T, GaveUp<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut retry = 0u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) if retry >= backoff.retries => {
                return Err(GaveUp {
                    error,
                    attempts: retry + 1,
                })
            }
            Err(error) => {
                let delay = backoff.delay(retry);
                retry += 1;
                debug!(
                    "{} failed (attempt {}), retrying in {:?}: {}",
                    backoff.label, retry, delay, error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Logs the first `limit` consecutive failures of a periodic task, then goes
/// quiet until the task succeeds again.
#[derive(Debug)]
pub struct LogThrottle {
    label: &'static str,
    limit: u32,
    streak: u32,
}

impl LogThrottle {
    pub fn new(label: &'static str, limit: u32) -> Self {
        Self { label, limit, streak: 0 }
    }

    pub fn succeeded(&mut self) {
        if self.streak > self.limit {
            debug!("{} recovered after {} failures", self.label, self.streak);
        }
        self.streak = 0;
    }

    /// Whether this failure should be logged.
    pub fn failed(&mut self) -> bool {
        self.streak = self.streak.saturating_add(1);
        if self.streak == self.limit + 1 {
            warn!("{} keeps failing, muting further errors", self.label);
        }
        self.streak <= self.limit
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = Backoff::new("test", 3, Duration::from_millis(100)).with_cap(Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(40), Duration::from_secs(1));
    }

    #[test]
    fn test_log_throttle() {
        let mut throttle = LogThrottle::new("snapshot", 2);
        assert!(throttle.failed());
        assert!(throttle.failed());
        assert!(!throttle.failed());
        assert!(!throttle.failed());

        throttle.succeeded();
        assert_eq!(throttle.streak(), 0);
        assert!(throttle.failed());
    }

    #[tokio::test]
    async fn test_transient_error_recovers() {
        let backoff = Backoff::new("test", 3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = retry_async(&backoff, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("busy")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let backoff = Backoff::new("test", 2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_async(&backoff, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("permission denied") }
        })
        .await;

        assert_eq!(
            result,
            Err(GaveUp {
                error: "permission denied",
                attempts: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
