//! Timeout and retry policy.
//!
//! Pure decision logic for one logical request:
//!
//! - [`RetryPolicy::timeout_for`]: escalating per-attempt deadline
//!   (3s, 5s, 8s by default; later attempts reuse the last budget).
//! - [`RetryPolicy::delay_before_retry`]: capped exponential backoff with
//!   symmetric jitter: `min(base ± base * randomization, max_delay)` where
//!   `base = delay_factor * 2^(attempt-1)`.
//! - [`is_retryable`]: timeouts, connection failures, and 5xx are retried;
//!   4xx never are.
//!
//! ```text
//! ATTEMPTING(n) ──ok──────────────────────────▶ SUCCESS
//!      │
//!      ├──retryable && n < max_attempts──▶ ATTEMPTING(n+1)
//!      │
//!      └──otherwise───────────────────────▶ FAILED(last error)
//! ```

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::transport::TransportError;

/// Decide whether a transport failure is worth another attempt.
///
/// This is the only place retry eligibility is decided.
pub fn is_retryable(err: &TransportError) -> bool {
    match err {
        TransportError::Timeout { .. } => true,
        TransportError::Connect(_) => true,
        TransportError::Network(_) => true,
        TransportError::Status { status, .. } => *status >= 500,
    }
}

/// Process-wide retry configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    timeouts: Vec<Duration>,
    max_attempts: u32,
    delay_factor: Duration,
    randomization_factor: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeouts: vec![
                Duration::from_secs(3),
                Duration::from_secs(5),
                Duration::from_secs(8),
            ],
            max_attempts: 3,
            delay_factor: Duration::from_millis(250),
            randomization_factor: 0.5,
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// # Panics
    ///
    /// Panics if `timeouts` is empty or `max_attempts` is zero; the config
    /// loader rejects both before a policy is built.
    pub fn new(
        timeouts: Vec<Duration>,
        max_attempts: u32,
        delay_factor: Duration,
        randomization_factor: f64,
        max_delay: Duration,
    ) -> Self {
        assert!(!timeouts.is_empty(), "timeout progression must not be empty");
        assert!(max_attempts >= 1, "max_attempts must be >= 1");
        Self {
            timeouts,
            max_attempts,
            delay_factor,
            randomization_factor: finite_or_zero(randomization_factor).clamp(0.0, 1.0),
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config
                .timeouts_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            config.max_attempts,
            Duration::from_millis(config.delay_factor_ms),
            config.randomization_factor,
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Deadline for the given 1-based attempt.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;
        self.timeouts[idx.min(self.timeouts.len() - 1)]
    }

    /// Un-jittered backoff for the given 1-based attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = (attempt.max(1) - 1).min(31);
        self.delay_factor.saturating_mul(1u32 << exp)
    }

    /// Backoff to sleep after a failed attempt, with random jitter.
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_unit(attempt, unit)
    }

    /// Deterministic core of [`delay_before_retry`](Self::delay_before_retry);
    /// `unit` is the jitter sample in `[-1, 1]`.
    pub fn delay_with_unit(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let jitter = base * self.randomization_factor * finite_or_zero(unit).clamp(-1.0, 1.0);
        let delay = (base + jitter).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(delay)
    }

    /// Whether a request whose `attempt` just failed with `err` gets another
    /// attempt.
    pub fn should_retry(&self, attempt: u32, err: &TransportError) -> bool {
        is_retryable(err) && attempt < self.max_attempts
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Bookkeeping for one logical request's retry loop.
#[derive(Debug)]
pub struct RetryState {
    /// Current attempt, 1-based.
    pub attempt: u32,
    pub last_error: Option<TransportError>,
    started: Instant,
}

impl RetryState {
    pub fn start() -> Self {
        Self {
            attempt: 1,
            last_error: None,
            started: Instant::now(),
        }
    }

    pub fn record_failure(&mut self, err: TransportError) {
        self.last_error = Some(err);
    }

    pub fn advance(&mut self) {
        self.attempt += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
