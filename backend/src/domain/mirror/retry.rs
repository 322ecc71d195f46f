//! Bounded retry ladder for mirror transport calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::CivilClock;
use crate::domain::ports::MirrorTransportError;

/// Retry configuration for transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRetryConfig {
    /// Attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound for a single transport call.
    pub call_timeout: Duration,
}

impl Default for MirrorRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Async sleeping abstraction so tests can skip real delays.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Tokio-based sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic jitter of up to a quarter of the base delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptJitter;

impl BackoffJitter for AttemptJitter {
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_extra = (base_ms / 4).max(1);
        let seed = u64::from(now.timestamp_subsec_nanos()) ^ u64::from(attempt);
        let extra = seed % (max_extra.saturating_add(1));
        Duration::from_millis(base_ms.saturating_add(extra))
    }
}

/// Call that gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: MirrorTransportError,
}

/// Runs transport calls under the timeout and backoff ladder.
#[derive(Clone)]
pub struct RetryRunner {
    config: MirrorRetryConfig,
    clock: CivilClock,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
}

impl RetryRunner {
    pub fn new(
        config: MirrorRetryConfig,
        clock: CivilClock,
        sleeper: Arc<dyn RetrySleeper>,
        jitter: Arc<dyn BackoffJitter>,
    ) -> Self {
        Self {
            config,
            clock,
            sleeper,
            jitter,
        }
    }

    /// Run `call` until it succeeds, fails permanently, or the attempts run
    /// out. Timeouts count as transient failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MirrorTransportError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(MirrorTransportError::transient(format!(
                    "{operation} timed out after {:?}",
                    self.config.call_timeout
                ))),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.jitter.jittered_delay(
                        self.base_delay(attempt),
                        attempt,
                        self.clock.now(),
                    );
                    debug!(operation, attempt, ?delay, %error, "retrying mirror call");
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::test_support::{NoJitter, RecordingSleeper, fixed_clock};

    #[fixture]
    fn sleeper() -> Arc<RecordingSleeper> {
        Arc::new(RecordingSleeper::default())
    }

    fn delays(sleeper: &RecordingSleeper) -> Vec<Duration> {
        sleeper.0.lock().expect("delays mutex").clone()
    }

    fn runner(sleeper: Arc<RecordingSleeper>, max_attempts: u32) -> RetryRunner {
        RetryRunner::new(
            MirrorRetryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(300),
                call_timeout: Duration::from_secs(1),
            },
            fixed_clock("2026-03-02T09:00:00Z"),
            sleeper,
            Arc::new(NoJitter),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn transient_failures_back_off_exponentially(sleeper: Arc<RecordingSleeper>) {
        let calls = AtomicU32::new(0);
        let result = runner(Arc::clone(&sleeper), 4)
            .run("edit", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(MirrorTransportError::transient("429"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(
            delays(&sleeper),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn permanent_failures_stop_immediately(sleeper: Arc<RecordingSleeper>) {
        let result: Result<(), _> = runner(Arc::clone(&sleeper), 4)
            .run("publish", || async {
                Err(MirrorTransportError::permanent("chat not found"))
            })
            .await;

        let exhausted = result.expect_err("permanent failure");
        assert_eq!(exhausted.attempts, 1);
        assert!(delays(&sleeper).is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn attempts_are_bounded(sleeper: Arc<RecordingSleeper>) {
        let result: Result<(), _> = runner(Arc::clone(&sleeper), 2)
            .run("edit", || async { Err(MirrorTransportError::transient("502")) })
            .await;

        let exhausted = result.expect_err("exhausted");
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_error, MirrorTransportError::transient("502"));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient(sleeper: Arc<RecordingSleeper>) {
        let result: Result<(), _> = runner(Arc::clone(&sleeper), 1)
            .run("edit", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let exhausted = result.expect_err("timed out");
        assert!(exhausted.last_error.is_retryable());
    }

    #[rstest]
    fn jitter_stays_within_a_quarter_of_base() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
            .single()
            .expect("valid time");
        let delay = AttemptJitter.jittered_delay(Duration::from_millis(400), 3, now);
        assert!(delay >= Duration::from_millis(400));
        assert!(delay <= Duration::from_millis(500));
    }
}
