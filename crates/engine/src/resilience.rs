//! Resilience primitives: retry with exponential backoff plus bounded
//! jitter, and a circuit breaker for persistence I/O.
//!
//! The circuit breaker has three states:
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: failing, all requests rejected immediately
//! - **HalfOpen**: testing recovery, limited requests allowed

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;

/// Backoff policy for a retrier.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Jitter band as a percentage of the base delay
    pub jitter_percent: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_percent: 10,
        }
    }
}

impl RetryPolicy {
    /// Base delay before attempt `attempt` (0-based retry count),
    /// exponential and capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let base = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(base).min(self.max_delay)
    }

    /// Jittered delay: `base * (1 + jitter * roll)` with `roll` in
    /// [-1, 1], never exceeding `max_delay`.
    pub fn jittered_delay(&self, attempt: u32, roll: f64) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let jitter = base * (self.jitter_percent as f64 / 100.0) * roll.clamp(-1.0, 1.0);
        Duration::from_secs_f64((base + jitter).max(0.0)).min(self.max_delay)
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let roll: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        self.jittered_delay(attempt, roll)
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("operation failed with a non-retryable error: {0}")]
    NotRetryable(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::NotRetryable(e) => e,
        }
    }
}

/// Run `op` under the policy, sleeping between attempts. Only errors for
/// which `is_retryable` returns true are retried. Cancellation is the
/// caller's: wrap the returned future in `tokio::time::timeout` (or a
/// select against a shutdown signal) and the in-flight sleep aborts with
/// it.
pub async fn retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<E> = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.next_delay(attempt - 1)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) => {
                tracing::warn!(attempt = attempt + 1, error = %err, "retryable failure");
                last_err = Some(err);
            }
            Err(err) => return Err(RetryError::NotRetryable(err)),
        }
    }
    Err(RetryError::Exhausted {
        attempts,
        last: last_err.expect("at least one attempt ran"),
    })
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing recovery
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Current state of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error returned when the circuit rejects a request
#[derive(Debug, Clone, Error)]
#[error("circuit breaker is open, retry after {retry_after:?}")]
pub struct CircuitOpenError {
    pub retry_after: Duration,
}

struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
}

/// Thread-safe circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    open_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
            }),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            open_count: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // a poisoned breaker lock means a panic mid-transition; the state
        // itself is still coherent
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Current state, transitioning open -> half-open when the open
    /// duration has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker transitioning to half-open");
                }
            }
        }
        inner.state
    }

    /// Check whether a request may proceed.
    pub fn allow(&self) -> Result<(), CircuitOpenError> {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let inner = self.lock();
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or_default();
                Err(CircuitOpenError {
                    retry_after: self.config.open_duration.saturating_sub(elapsed),
                })
            }
        }
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(from = %inner.state, "circuit breaker closing");
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
        }
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.lock();
        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            tracing::warn!(failures, "circuit breaker opening");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            self.open_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_backoff_progression_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
        // 1600ms capped to 1s
        assert_eq!(policy.base_delay(4), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_band_and_under_cap() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let base = policy.base_delay(attempt).as_secs_f64();
            for roll in [-1.0, -0.5, 0.0, 0.5, 1.0] {
                let delay = policy.jittered_delay(attempt, roll).as_secs_f64();
                assert!(delay >= base * 0.9 - 1e-9, "below band: {delay} vs {base}");
                assert!(delay <= base * 1.1 + 1e-9, "above band: {delay} vs {base}");
                assert!(delay <= policy.max_delay.as_secs_f64() + 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let calls = AtomicUsize::new(0);
        let result: Result<u32, RetryError<String>> = retry(
            &policy,
            |_| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.expect("succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let calls = AtomicUsize::new(0);
        let result: Result<(), RetryError<String>> = retry(
            &policy,
            |_| true,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still broken".to_string()) }
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let policy = RetryPolicy::default();
        let calls = AtomicUsize::new(0);
        let result: Result<(), RetryError<String>> = retry(
            &policy,
            |err: &String| err.contains("transient"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
        )
        .await;
        assert!(matches!(result, Err(RetryError::NotRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            open_duration: Duration::from_secs(60),
        });
        assert!(breaker.allow().is_ok());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow().is_err());
        assert_eq!(breaker.open_count(), 1);
    }

    #[test]
    fn test_breaker_half_open_then_closes_on_success() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_millis(0),
        });
        breaker.record_failure();
        // zero open duration: next state check lands in half-open
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow().is_ok());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breaker_reopens_from_half_open_failure() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            open_duration: Duration::from_millis(0),
        });
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        // a single half-open failure re-opens regardless of threshold
        assert!(matches!(
            breaker.state(),
            CircuitState::Open | CircuitState::HalfOpen
        ));
        assert_eq!(breaker.open_count(), 2);
    }
}
