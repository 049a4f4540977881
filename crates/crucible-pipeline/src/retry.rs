//! Retry logic with configurable backoff policies for pipeline stages.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// The same delay after every failed attempt.
    Fixed(Duration),
    /// Retry immediately.
    None,
}

impl BackoffPolicy {
    pub fn delay(&self) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    pub attempts: usize,
    pub last_error: E,
}

/// Call `f` until it succeeds or `max_attempts` calls have failed.
///
/// `f` receives the 1-based attempt number. Every error counts as a failed
/// attempt; there is no early exit for permanent errors. On success the
/// value is returned with the number of attempts it took.
pub async fn retry_attempts<T, E, F, Fut>(
    mut f: F,
    max_attempts: usize,
    policy: &BackoffPolicy,
    label: &str,
) -> Result<(T, usize), RetriesExhausted<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay();
                tracing::warn!(stage = %label, attempt, delay_ms = %delay.as_millis(), error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(stage = %label, attempt, error = %e, "Final attempt failed");
                return Err(RetriesExhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn success_on_first_try() {
        let result: Result<(&str, usize), RetriesExhausted<String>> =
            retry_attempts(|_| async { Ok("done") }, 3, &BackoffPolicy::None, "generate").await;
        let (value, attempts) = result.unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn recovers_on_second_attempt() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result = retry_attempts(
            move |attempt| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    if attempt == 1 {
                        Err("malformed".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            },
            3,
            &BackoffPolicy::None,
            "generate",
        )
        .await;

        assert_eq!(result.unwrap(), (2, 2));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_exactly_max_attempts() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();

        let result: Result<((), usize), _> = retry_attempts(
            move |attempt| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {attempt}"))
                }
            },
            3,
            &BackoffPolicy::None,
            "generate",
        )
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error, "failure 3");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fixed_delay_is_slept_between_attempts() {
        let start = std::time::Instant::now();
        let result: Result<((), usize), _> = retry_attempts(
            |_| async { Err("nope") },
            3,
            &BackoffPolicy::Fixed(Duration::from_millis(10)),
            "generate",
        )
        .await;
        assert!(result.is_err());
        // Two sleeps: none after the final attempt.
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn backoff_delays() {
        assert_eq!(BackoffPolicy::Fixed(Duration::from_millis(200)).delay(), Duration::from_millis(200));
        assert_eq!(BackoffPolicy::None.delay(), Duration::ZERO);
    }
}
