//! Bounded retry with exponential backoff for source reads.

use crate::config::RetryConfig;
use crate::error::{PipelineError, Result};
use crate::logging::{Logger, messages};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::from(&RetryConfig::default())
        }
    }

    /// Retries without sleeping in between.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before the retry following `attempt` (0-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64) as u64;
        if self.jitter && capped > 0 {
            // Up to 25% on top of the capped delay.
            capped + rand::thread_rng().gen_range(0..=capped / 4)
        } else {
            capped
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

/// Run `operation`, retrying retryable failures up to `policy.max_retries`
/// times. Each retryable failure is logged as a warning before sleeping.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, logger: &Logger, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }
                if attempt >= policy.max_retries {
                    return Err(exhausted(e, attempt + 1));
                }
                let backoff_ms = policy.backoff_ms(attempt);
                logger.warn(messages::retrying(
                    attempt + 1,
                    policy.max_retries + 1,
                    backoff_ms,
                    &e,
                ));
                tracing::debug!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

fn exhausted(err: PipelineError, attempts: u32) -> PipelineError {
    match err {
        PipelineError::SourceUnreachable {
            kind,
            location,
            message,
            transient,
        } if attempts > 1 => PipelineError::SourceUnreachable {
            kind,
            location,
            message: format!("{message} (after {attempts} attempts)"),
            transient,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Language, LogLevel};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn logger() -> (Logger, crate::logging::MemorySink) {
        Logger::new("test", LogLevel::Debug, Language::Pt).with_memory_sink()
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 4_000);
        assert_eq!(policy.backoff_ms(1), 8_000);
        assert_eq!(policy.backoff_ms(2), 10_000);
        assert_eq!(policy.backoff_ms(30), 10_000);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let ms = policy.backoff_ms(0);
            assert!((4_000..=5_000).contains(&ms));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let (logger, sink) = logger();
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), &logger, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(PipelineError::transient("api", "http://x", "timeout"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.records().len(), 2);
        assert!(sink.contains(LogLevel::Warn, "Attempt 1/4"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (logger, _sink) = logger();
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::immediate(2), &logger, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(PipelineError::transient("s3", "bucket/key", "503"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let (logger, sink) = logger();
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::immediate(5), &logger, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(PipelineError::unreachable("api", "http://x", "404"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!err.is_retryable());
        assert!(sink.records().is_empty());
    }
}
