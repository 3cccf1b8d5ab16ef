//! Bounded retry with backoff.
//!
//! [`RetryController`] invokes an operation up to `max_attempts` times. Each
//! failure is handed to a [`Classifier`]; non-retryable failures surface at once,
//! retryable ones are followed by a sleep chosen by a [`DelayPolicy`] (evaluated
//! per attempt) until the budget runs out. A [`CancellationToken`] aborts the loop
//! before the next attempt, and an optional deadline stops it once the clock
//! reaches that instant. Sleeps never extend past the deadline.
//!
//! The controller does not make operations idempotent. Retrying a create call
//! against a non-idempotent endpoint can create duplicate remote state; only hand
//! it operations that are safe to repeat.
//!
//! ```
//! use ironlro::retry::{ConstantDelay, RetryController};
//! use ironlro::clock::ManualClock;
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let controller = RetryController::new(3, ConstantDelay(Duration::from_secs(1)))
//!     .with_clock(clock.clone().into_shared());
//!
//! let mut calls = 0;
//! let result: Result<u32, _> = controller.run(
//!     || {
//!         calls += 1;
//!         if calls < 3 { Err("busy") } else { Ok(calls) }
//!     },
//!     &|_: &&str| true,
//! );
//! assert_eq!(result.unwrap(), 3);
//! assert_eq!(clock.elapsed(), Duration::from_secs(2));
//! ```

use crate::clock::{Clock, system_clock};
use crate::rpc::RpcError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Delay Policies
// ============================================================================

/// Chooses how long to wait after a failed attempt.
///
/// `attempt` is the 1-based index of the attempt that just failed.
pub trait DelayPolicy {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> DelayPolicy for F
where
    F: Fn(u32) -> Duration,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// Same wait after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantDelay(pub Duration);

impl DelayPolicy for ConstantDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Wait grows by `step` after every failure: `base + step * (attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearDelay {
    pub base: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl DelayPolicy for LinearDelay {
    fn delay(&self, attempt: u32) -> Duration {
        self.step
            .saturating_mul(attempt.saturating_sub(1))
            .saturating_add(self.base)
            .min(self.max)
    }
}

/// Exponential backoff configuration and attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl DelayPolicy for RetryPolicy {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay_ms as f64 * factor;
        let capped = if millis.is_finite() {
            millis.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Decides whether a failure may be retried.
pub trait Classifier<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E, F> Classifier<E> for F
where
    F: Fn(&E) -> bool,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// Retries transport failures, throttling and temporary unavailability only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientOnly;

impl Classifier<RpcError> for TransientOnly {
    fn is_retryable(&self, error: &RpcError) -> bool {
        error.is_transient()
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag checked by the controller before every attempt.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Attempts and Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

/// One invocation cycle of a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based.
    pub index: u32,
    /// Time slept before this attempt.
    pub waited: Duration,
    pub outcome: AttemptOutcome,
}

/// Callback receiving every [`RetryAttempt`] as it completes.
pub type AttemptObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Why a retried operation did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("non-retryable failure on attempt {attempts}: {error}")]
    Fatal { error: E, attempts: u32 },

    #[error("retries exhausted after {attempts} attempts: {error}")]
    Exhausted { error: E, attempts: u32 },

    #[error("cancelled after {attempts} attempts")]
    Cancelled { last_error: Option<E>, attempts: u32 },

    /// The deadline passed before the next attempt could start.
    #[error("deadline reached after {attempts} attempts")]
    DeadlineExceeded { last_error: Option<E>, attempts: u32 },
}

impl<E> RetryError<E> {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The error of the last attempt, if one ran.
    #[must_use]
    pub const fn last_error(&self) -> Option<&E> {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::Cancelled { last_error, .. } | Self::DeadlineExceeded { last_error, .. } => {
                last_error.as_ref()
            }
        }
    }

    #[must_use]
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::Cancelled { last_error, .. } | Self::DeadlineExceeded { last_error, .. } => last_error,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    #[must_use]
    pub const fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Executes an operation with a bounded attempt budget.
#[derive(Clone)]
pub struct RetryController<D = RetryPolicy> {
    max_attempts: u32,
    delay: D,
    clock: Arc<dyn Clock>,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
    observer: Option<AttemptObserver>,
}

impl RetryController<RetryPolicy> {
    #[must_use]
    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.max_attempts, policy)
    }
}

impl<D: DelayPolicy> RetryController<D> {
    /// `max_attempts` counts attempts, not retries; 0 is treated as 1.
    pub fn new(max_attempts: u32, delay: D) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            clock: system_clock(),
            cancel: None,
            deadline: None,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Start no attempt once the clock reaches `deadline`, and clip sleeps to it.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: AttemptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails fatally, runs out of attempts or is cancelled.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Fatal`] when `classifier` rejects a failure
    /// - [`RetryError::Exhausted`] with the last attempt's error when the budget is spent
    /// - [`RetryError::Cancelled`] when the cancellation token is set before an attempt
    /// - [`RetryError::DeadlineExceeded`] when the deadline is reached before an attempt
    pub fn run<T, E, F, C>(&self, mut operation: F, classifier: &C) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        C: Classifier<E> + ?Sized,
        E: fmt::Display,
    {
        let mut attempt: u32 = 0;
        let mut waited = Duration::ZERO;
        let mut last_error: Option<E> = None;

        loop {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!(attempts = attempt, "retry loop cancelled");
                return Err(RetryError::Cancelled {
                    last_error,
                    attempts: attempt,
                });
            }
            if self.deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                debug!(attempts = attempt, "retry deadline reached");
                return Err(RetryError::DeadlineExceeded {
                    last_error,
                    attempts: attempt,
                });
            }

            attempt += 1;
            match operation() {
                Ok(value) => {
                    self.observe(attempt, waited, AttemptOutcome::Success);
                    debug!(attempt, "attempt succeeded");
                    return Ok(value);
                }
                Err(error) if !classifier.is_retryable(&error) => {
                    self.observe(attempt, waited, AttemptOutcome::FatalFailure);
                    debug!(attempt, %error, "non-retryable failure");
                    return Err(RetryError::Fatal {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    self.observe(attempt, waited, AttemptOutcome::RetryableFailure);
                    if attempt >= self.max_attempts {
                        warn!(attempt, %error, "retry budget exhausted");
                        return Err(RetryError::Exhausted {
                            error,
                            attempts: attempt,
                        });
                    }
                    waited = self.delay.delay(attempt);
                    if let Some(deadline) = self.deadline {
                        waited = waited.min(deadline.saturating_duration_since(self.clock.now()));
                    }
                    warn!(attempt, delay = ?waited, %error, "retryable failure");
                    last_error = Some(error);
                    self.clock.sleep(waited);
                }
            }
        }
    }

    fn observe(&self, index: u32, waited: Duration, outcome: AttemptOutcome) {
        if let Some(observer) = &self.observer {
            observer(&RetryAttempt {
                index,
                waited,
                outcome,
            });
        }
    }
}

impl<D: fmt::Debug> fmt::Debug for RetryController<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("cancellable", &self.cancel.is_some())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Free Functions
// ============================================================================

/// Retry `operation` on the system clock.
///
/// # Errors
///
/// See [`RetryController::run`]
pub fn retry<T, E, F, D, C>(
    operation: F,
    max_attempts: u32,
    delay_policy: D,
    is_retryable: C,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    D: DelayPolicy,
    C: Classifier<E>,
    E: fmt::Display,
{
    RetryController::new(max_attempts, delay_policy).run(operation, &is_retryable)
}

/// Retry a remote call with exponential backoff, retrying transient failures only.
///
/// # Errors
///
/// Returns an error if the call fails with a non-transient error or keeps failing
/// until `policy.max_attempts` is reached
pub fn retry_with_backoff<F, T>(policy: &RetryPolicy, operation: F) -> Result<T, RetryError<RpcError>>
where
    F: FnMut() -> Result<T, RpcError>,
{
    RetryController::from_policy(*policy).run(operation, &TransientOnly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rpc::ErrorKind;

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
        };
        let delays: Vec<u64> = (1..=6)
            .map(|a| u64::try_from(policy.delay(a).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_multiplier_below_one_is_constant() {
        let policy = RetryPolicy {
            backoff_multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(4), Duration::from_millis(100));
    }

    #[test]
    fn test_huge_attempt_index_saturates_at_max_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_zero_max_attempts_means_one() {
        let controller = RetryController::new(0, ConstantDelay(Duration::ZERO));
        assert_eq!(controller.max_attempts(), 1);
    }

    #[test]
    fn test_transient_only_classifier() {
        assert!(TransientOnly.is_retryable(&RpcError::new(ErrorKind::RateLimited, "slow down")));
        assert!(!TransientOnly.is_retryable(&RpcError::new(ErrorKind::NotFound, "gone")));
    }

    #[test]
    fn test_observer_sees_each_attempt() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let clock = ManualClock::new();
        let controller = RetryController::new(3, ConstantDelay(Duration::from_millis(10)))
            .with_clock(clock.into_shared())
            .with_observer(Arc::new(move |a: &RetryAttempt| {
                sink.lock().unwrap().push(*a);
            }));

        let mut n = 0;
        let _ = controller.run(
            || {
                n += 1;
                if n == 1 { Err("flaky") } else { Ok(()) }
            },
            &|_: &&str| true,
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].outcome, AttemptOutcome::RetryableFailure);
        assert_eq!(seen[0].waited, Duration::ZERO);
        assert_eq!(seen[1].index, 2);
        assert_eq!(seen[1].waited, Duration::from_millis(10));
        assert_eq!(seen[1].outcome, AttemptOutcome::Success);
    }
}
