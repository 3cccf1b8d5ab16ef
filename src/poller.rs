//! Polling of long-running operations.
//!
//! A submit call against an asynchronous API returns an [`OperationHandle`]. The
//! [`OperationPoller`] drives it through
//!
//! ```text
//! Submitted -> Polling -> { DoneSuccess | DoneError | TimedOut }
//! ```
//!
//! sleeping `interval` between polls on the injected clock. The deadline is
//! measured from the moment the handle was received; once it has passed no
//! further poll is issued. The remote operation is left running when the poller
//! gives up.
//!
//! Poll-RPC failures are returned as [`PollError::Transport`] without any retry.
//! Wrap the poll closure in a [`RetryController`](crate::retry::RetryController)
//! to retry them, which keeps polling cadence and failure backoff independent.

use crate::clock::{Clock, system_clock};
use crate::rpc::{OperationHandle, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Polling cadence and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_interval_ms: u64,
    /// Growth factor applied to the interval after each pending poll; 1.0 keeps it fixed.
    pub multiplier: f64,
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_interval_ms: 10_000,
            multiplier: 1.0,
            timeout_ms: 600_000,
        }
    }
}

impl PollConfig {
    #[must_use]
    pub const fn fixed(interval: Duration, timeout: Duration) -> Self {
        let interval_ms = duration_ms(interval);
        Self {
            interval_ms,
            max_interval_ms: interval_ms,
            multiplier: 1.0,
            timeout_ms: duration_ms(timeout),
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn next_interval(&self, current: Duration) -> Duration {
        let grown = current.as_millis() as f64 * self.multiplier.max(1.0);
        let capped = grown.min(self.max_interval_ms.max(self.interval_ms) as f64);
        Duration::from_millis(capped as u64)
    }
}

const fn duration_ms(d: Duration) -> u64 {
    let ms = d.as_millis();
    if ms > u64::MAX as u128 { u64::MAX } else { ms as u64 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling,
    DoneSuccess,
    DoneError,
    TimedOut,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::DoneSuccess => "done-success",
            Self::DoneError => "done-error",
            Self::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Successful completion of a polled operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<T> {
    pub value: T,
    pub operation: String,
    pub polls: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The poll RPC itself failed.
    #[error("polling {operation} failed after {polls} polls: {error}")]
    Transport {
        operation: String,
        polls: u32,
        error: E,
    },

    /// The remote operation finished with an error.
    #[error("operation {operation} failed: {error}")]
    Failed {
        operation: String,
        polls: u32,
        error: RpcError,
    },

    /// The deadline passed before the operation finished.
    #[error("gave up waiting for {operation} after {elapsed:?} ({polls} polls, deadline {deadline:?})")]
    TimedOut {
        operation: String,
        polls: u32,
        elapsed: Duration,
        deadline: Duration,
    },
}

impl<E> PollError<E> {
    #[must_use]
    pub const fn polls(&self) -> u32 {
        match self {
            Self::Transport { polls, .. }
            | Self::Failed { polls, .. }
            | Self::TimedOut { polls, .. } => *polls,
        }
    }

    /// Terminal state, or `None` when polling stopped on a transport failure.
    #[must_use]
    pub const fn state(&self) -> Option<PollState> {
        match self {
            Self::Transport { .. } => None,
            Self::Failed { .. } => Some(PollState::DoneError),
            Self::TimedOut { .. } => Some(PollState::TimedOut),
        }
    }
}

/// Drives an [`OperationHandle`] to a terminal state.
#[derive(Clone)]
pub struct OperationPoller {
    config: PollConfig,
    clock: Arc<dyn Clock>,
}

impl OperationPoller {
    #[must_use]
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` until it is done, starting the deadline now.
    ///
    /// # Errors
    ///
    /// See [`OperationPoller::wait_since`]
    pub fn wait<T, E, F>(&self, handle: OperationHandle<T>, poll: F) -> Result<PollOutcome<T>, PollError<E>>
    where
        F: FnMut(&OperationHandle<T>) -> Result<OperationHandle<T>, E>,
    {
        self.wait_since(handle, self.clock.now(), poll)
    }

    /// Poll `handle` until it is done, measuring the deadline from `submitted_at`.
    ///
    /// # Errors
    ///
    /// - [`PollError::Failed`] when the operation completes with an error
    /// - [`PollError::TimedOut`] when the deadline passes first
    /// - [`PollError::Transport`] when a poll call fails
    pub fn wait_since<T, E, F>(
        &self,
        handle: OperationHandle<T>,
        submitted_at: Instant,
        mut poll: F,
    ) -> Result<PollOutcome<T>, PollError<E>>
    where
        F: FnMut(&OperationHandle<T>) -> Result<OperationHandle<T>, E>,
    {
        let deadline = self.config.timeout();
        let operation = handle.name().to_string();
        let mut state = PollState::Submitted;
        let mut interval = self.config.interval();
        let mut polls: u32 = 0;
        let mut current = handle;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(submitted_at);
            current = match current.into_result() {
                Ok(Ok(value)) => {
                    info!(%operation, polls, ?elapsed, from = %state, to = %PollState::DoneSuccess, "operation done");
                    return Ok(PollOutcome {
                        value,
                        operation,
                        polls,
                        elapsed,
                    });
                }
                Ok(Err(error)) => {
                    warn!(%operation, polls, %error, from = %state, to = %PollState::DoneError, "operation failed");
                    return Err(PollError::Failed {
                        operation,
                        polls,
                        error,
                    });
                }
                Err(pending) => pending,
            };

            if state == PollState::Submitted {
                debug!(%operation, from = %state, to = %PollState::Polling, "tracking operation");
                state = PollState::Polling;
            }

            if elapsed >= deadline {
                return Err(self.timed_out(operation, polls, elapsed));
            }
            self.clock.sleep(interval.min(deadline - elapsed));

            let elapsed = self.clock.now().saturating_duration_since(submitted_at);
            if elapsed >= deadline {
                return Err(self.timed_out(operation, polls, elapsed));
            }

            polls += 1;
            current = match poll(&current) {
                Ok(next) => next,
                Err(error) => {
                    return Err(PollError::Transport {
                        operation,
                        polls,
                        error,
                    });
                }
            };
            debug!(%operation, polls, done = current.is_done(), "polled operation");
            interval = self.config.next_interval(interval);
        }
    }

    fn timed_out<E>(&self, operation: String, polls: u32, elapsed: Duration) -> PollError<E> {
        let deadline = self.config.timeout();
        warn!(%operation, polls, ?elapsed, ?deadline, to = %PollState::TimedOut, "operation deadline exceeded");
        PollError::TimedOut {
            operation,
            polls,
            elapsed,
            deadline,
        }
    }
}

impl fmt::Debug for OperationPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPoller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_interval_grows_to_cap() {
        let config = PollConfig {
            interval_ms: 100,
            max_interval_ms: 350,
            multiplier: 2.0,
            timeout_ms: 10_000,
        };
        let a = config.next_interval(config.interval());
        let b = config.next_interval(a);
        let c = config.next_interval(b);
        assert_eq!(a, Duration::from_millis(200));
        assert_eq!(b, Duration::from_millis(350));
        assert_eq!(c, Duration::from_millis(350));
    }

    #[test]
    fn test_fixed_config() {
        let config = PollConfig::fixed(Duration::from_millis(500), Duration::from_secs(30));
        assert_eq!(config.interval(), Duration::from_millis(500));
        assert_eq!(config.next_interval(config.interval()), Duration::from_millis(500));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PollState::DoneSuccess.to_string(), "done-success");
        assert_eq!(PollState::TimedOut.to_string(), "timed-out");
    }
}
