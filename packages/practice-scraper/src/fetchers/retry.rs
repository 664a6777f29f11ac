//! Retry policy with exponential backoff.
//!
//! The policy is a plain value: a ceiling, a backoff curve and a classifier
//! deciding which errors are worth another attempt. [`RetryPolicy::run`]
//! drives an operation under it and records every attempt.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::types::config::RetryConfig;

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    HttpError(u16),
    Blocked,
    NetworkError,
}

impl AttemptOutcome {
    fn from_error(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout { .. } => AttemptOutcome::Timeout,
            FetchError::Http { status, .. } => AttemptOutcome::HttpError(*status),
            FetchError::Blocked { .. } => AttemptOutcome::Blocked,
            FetchError::Network { .. }
            | FetchError::Render { .. }
            | FetchError::RenderUnavailable
            | FetchError::Cancelled => AttemptOutcome::NetworkError,
        }
    }
}

/// One attempt at fetching a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchAttempt {
    pub url: Url,

    /// 1-based
    pub attempt: u32,

    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

/// Final result plus the attempts that led to it.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: FetchResult<T>,
    pub attempts: Vec<FetchAttempt>,
}

/// Retry ceiling, backoff curve and transient-error classifier.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    classifier: fn(&FetchError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: if config.multiplier.is_finite() && config.multiplier >= 1.0 {
                config.multiplier
            } else {
                1.0
            },
            classifier: FetchError::is_transient,
        }
    }

    /// Replace the transient-error classifier.
    pub fn with_classifier(mut self, classifier: fn(&FetchError) -> bool) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given (1-based) failed attempt.
    ///
    /// `base * multiplier^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether a failure on the given attempt gets another try.
    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.classifier)(error)
    }

    /// Run `operation` until it succeeds, fails permanently, or the ceiling is hit.
    ///
    /// A 429 that is still failing at the ceiling is reported as
    /// `FetchError::Blocked`. Cancellation is checked before every attempt and
    /// raced against every backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return RetryOutcome {
                    result: Err(FetchError::Cancelled),
                    attempts,
                };
            }

            let error = match operation(attempt).await {
                Ok(value) => {
                    attempts.push(record(url, attempt, AttemptOutcome::Success));
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(FetchError::Cancelled) => {
                    return RetryOutcome {
                        result: Err(FetchError::Cancelled),
                        attempts,
                    };
                }
                Err(error) => error,
            };

            attempts.push(record(url, attempt, AttemptOutcome::from_error(&error)));

            if !self.should_retry(&error, attempt) {
                let error = match error {
                    FetchError::Http { url, status: 429 } => {
                        warn!(url = %url, attempts = attempt, "Still rate limited at retry ceiling");
                        FetchError::Blocked { url, status: 429 }
                    }
                    other => other,
                };
                debug!(url = %url, attempts = attempt, error = %error, "Giving up");
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                };
            }

            let delay = self.delay_for(attempt);
            warn!(
                url = %url,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient fetch failure, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(FetchError::Cancelled),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn record(url: &Url, attempt: u32, outcome: AttemptOutcome) -> FetchAttempt {
    FetchAttempt {
        url: url.clone(),
        attempt,
        outcome,
        at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn url() -> Url {
        Url::parse("https://example.com/anxiety").unwrap()
    }

    fn http(status: u16) -> FetchError {
        FetchError::Http {
            url: url().to_string(),
            status,
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 3000,
            multiplier: 2.0,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&http(503), 1));
        assert!(!policy.should_retry(&http(503), 3));
        assert!(!policy.should_retry(&http(404), 1));
        assert!(!policy.should_retry(
            &FetchError::Blocked {
                url: url().to_string(),
                status: 403
            },
            1
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let outcome = policy
            .run(&url(), &CancellationToken::new(), |_| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(http(503))
                    } else {
                        Ok("page")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "page");
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::HttpError(503));
        assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_ceiling() {
        let policy = RetryPolicy::default();
        let outcome: RetryOutcome<()> = policy
            .run(&url(), &CancellationToken::new(), |_| async { Err(http(503)) })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Http { status: 503, .. })));
        assert_eq!(outcome.attempts.len(), 3);
        let numbers: Vec<u32> = outcome.attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_not_retried() {
        let policy = RetryPolicy::default();
        let outcome: RetryOutcome<()> = policy
            .run(&url(), &CancellationToken::new(), |_| async { Err(http(404)) })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Http { status: 404, .. })));
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_exhaustion_becomes_blocked() {
        let policy = RetryPolicy::default();
        let outcome: RetryOutcome<()> = policy
            .run(&url(), &CancellationToken::new(), |_| async { Err(http(429)) })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Blocked { status: 429, .. })));
        assert_eq!(outcome.attempts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
            ..RetryConfig::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome: RetryOutcome<()> = policy
            .run(&url(), &cancel, |_| async { Err(http(503)) })
            .await;

        assert!(matches!(outcome.result, Err(FetchError::Cancelled)));
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let policy = RetryPolicy::default().with_classifier(|_| false);
        let outcome: RetryOutcome<()> = policy
            .run(&url(), &CancellationToken::new(), |_| async { Err(http(503)) })
            .await;
        assert_eq!(outcome.attempts.len(), 1);
    }
}
