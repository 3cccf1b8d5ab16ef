//! Composition of checksum, retry, polling and pagination for one logical call.
//!
//! A mutation runs in a fixed order:
//!
//! 1. attach a CRC-32C to the payload (when checksums are enabled and the
//!    payload has none),
//! 2. submit it under the [`RetryController`],
//! 3. if the submit started a long-running operation, poll it with the
//!    [`OperationPoller`], each poll call again under the retry controller,
//! 4. return the terminal value or the first fatal error, tagged with the
//!    [`Step`] it came from.
//!
//! Semantic failures (bad input, missing or conflicting resources, permission
//! problems) and integrity failures are fatal on first occurrence whatever the
//! configured classifier says.
//!
//! ```
//! use ironlro::clock::ManualClock;
//! use ironlro::config::OrchestratorConfig;
//! use ironlro::orchestrator::Orchestrator;
//! use ironlro::rpc::{OperationHandle, Submission};
//!
//! let clock = ManualClock::new();
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default())
//!     .with_clock(clock.clone().into_shared());
//!
//! let outcome = orchestrator
//!     .run(
//!         None,
//!         |_| Ok(Submission::Started(OperationHandle::pending("operations/resize-1"))),
//!         |h| Ok(OperationHandle::succeeded(h.name(), "RUNNING".to_string())),
//!     )
//!     .unwrap();
//! assert_eq!(outcome.value, "RUNNING");
//! assert_eq!(outcome.polls, 1);
//! ```

use crate::checksum::attach_checksum;
use crate::clock::{Clock, system_clock};
use crate::config::{ConfigError, OrchestratorConfig};
use crate::poller::{OperationPoller, PollError};
use crate::retry::{CancellationToken, Classifier, RetryController, RetryError, TransientOnly};
use crate::rpc::{
    ErrorClass, ListService, MutationService, OperationHandle, PageRequest, Payload, PayloadService,
    ResultPage, RpcError, RpcResult, Submission,
};
use crate::sink::ResultSink;
use crate::stream::{PageStream, StreamError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::metrics::names;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsCollector;
#[cfg(feature = "metrics")]
use crate::retry::RetryAttempt;

// ============================================================================
// Errors
// ============================================================================

/// Stage of an orchestrated call at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Checksum,
    Submit,
    Poll,
    Fetch,
    PageFetch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Checksum => "checksum",
            Self::Submit => "submit",
            Self::Poll => "poll",
            Self::Fetch => "fetch",
            Self::PageFetch => "page-fetch",
        })
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A remote call failed fatally or kept failing until the retry budget ran out.
    #[error("{step} failed after {attempts} attempt(s): {source}")]
    Remote {
        step: Step,
        attempts: u32,
        /// Set when every attempt failed retryably and the budget ran out.
        exhausted: bool,
        source: RpcError,
    },

    /// Payload and checksum disagree, locally or as reported by the remote.
    #[error("integrity check failed at {step}: {source}")]
    Integrity { step: Step, source: RpcError },

    /// The long-running operation completed with an error.
    #[error("operation {operation} failed: {source}")]
    OperationFailed { operation: String, source: RpcError },

    /// The deadline passed first. `last_error` is the failed poll call that was
    /// still being retried when it did, if any.
    #[error("operation {operation} still pending after {elapsed:?} ({polls} polls, deadline {deadline:?})")]
    TimedOut {
        operation: String,
        elapsed: Duration,
        deadline: Duration,
        polls: u32,
        last_error: Option<RpcError>,
    },

    #[error("cancelled during {step} after {attempts} attempt(s)")]
    Cancelled {
        step: Step,
        attempts: u32,
        last_error: Option<RpcError>,
    },

    #[error("page {page} is invalid: {reason}")]
    InvalidPage { page: u32, reason: String },
}

impl OrchestrationError {
    #[must_use]
    pub const fn step(&self) -> Step {
        match self {
            Self::Remote { step, .. } | Self::Integrity { step, .. } | Self::Cancelled { step, .. } => {
                *step
            }
            Self::OperationFailed { .. } | Self::TimedOut { .. } => Step::Poll,
            Self::InvalidPage { .. } => Step::PageFetch,
        }
    }

    /// The caller may recompute the checksum and resubmit.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Every attempt failed retryably until the retry budget ran out.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Remote { exhausted: true, .. })
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The remote error behind this failure, if there is one.
    #[must_use]
    pub const fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Remote { source, .. }
            | Self::Integrity { source, .. }
            | Self::OperationFailed { source, .. } => Some(source),
            Self::TimedOut { last_error, .. } | Self::Cancelled { last_error, .. } => last_error.as_ref(),
            Self::InvalidPage { .. } => None,
        }
    }

    fn from_retry(step: Step, error: RetryError<RpcError>) -> Self {
        match error {
            // Only poll slots carry a deadline, and await_operation turns that into TimedOut.
            RetryError::Cancelled { attempts, last_error } | RetryError::DeadlineExceeded { attempts, last_error } => {
                Self::Cancelled {
                    step,
                    attempts,
                    last_error,
                }
            }
            RetryError::Fatal { error, attempts } => Self::remote(step, attempts, false, error),
            RetryError::Exhausted { error, attempts } => Self::remote(step, attempts, true, error),
        }
    }

    fn remote(step: Step, attempts: u32, exhausted: bool, error: RpcError) -> Self {
        if error.class() == ErrorClass::Integrity {
            Self::Integrity {
                step,
                source: error,
            }
        } else {
            Self::Remote {
                step,
                attempts,
                exhausted,
                source: error,
            }
        }
    }
}

impl From<StreamError<OrchestrationError>> for OrchestrationError {
    fn from(e: StreamError<OrchestrationError>) -> Self {
        match e {
            StreamError::Fetch { error, .. } => error,
            StreamError::InvalidPage { page, reason } => Self::InvalidPage { page, reason },
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Terminal result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome<T> {
    pub value: T,
    pub submit_attempts: u32,
    pub polls: u32,
    /// Name of the long-running operation, if the submit started one.
    pub operation: Option<String>,
}

impl<T: fmt::Display> fmt::Display for MutationOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(
                f,
                "{}: operation {op} done after {} submit attempt(s) and {} poll(s)",
                self.value, self.submit_attempts, self.polls
            ),
            None => write!(f, "{}: completed after {} submit attempt(s)", self.value, self.submit_attempts),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

type SharedClassifier = Arc<dyn Classifier<RpcError> + Send + Sync>;

/// Runs mutations, verified reads and listings against a remote API.
#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
    classifier: SharedClassifier,
    cancel: Option<CancellationToken>,
    #[cfg(feature = "metrics")]
    metrics: Option<MetricsCollector>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            clock: system_clock(),
            classifier: Arc::new(TransientOnly),
            cancel: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Like [`Orchestrator::new`], rejecting an invalid configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `config` fails validation
    pub fn try_new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default transient-only classification.
    ///
    /// Semantic and integrity failures stay fatal regardless of `classifier`.
    #[must_use]
    pub fn with_classifier<C>(mut self, classifier: C) -> Self
    where
        C: Classifier<RpcError> + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsCollector> {
        self.metrics.as_ref()
    }

    fn is_retryable(&self, error: &RpcError) -> bool {
        match error.class() {
            ErrorClass::Semantic | ErrorClass::Integrity => false,
            ErrorClass::Transient | ErrorClass::Internal => self.classifier.is_retryable(error),
        }
    }

    fn controller(&self) -> RetryController {
        let mut controller = RetryController::from_policy(self.config.retry).with_clock(Arc::clone(&self.clock));
        if let Some(token) = &self.cancel {
            controller = controller.with_cancellation(token.clone());
        }
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.clone() {
            controller = controller.with_observer(Arc::new(move |attempt: &RetryAttempt| {
                if attempt.index > 1 {
                    metrics.increment_counter(names::RETRIES, 1);
                }
            }));
        }
        controller
    }

    fn retrying<T>(
        &self,
        controller: &RetryController,
        step: Step,
        operation: impl FnMut() -> RpcResult<T>,
    ) -> Result<T, OrchestrationError> {
        controller
            .run(operation, &|e: &RpcError| self.is_retryable(e))
            .map_err(|e| OrchestrationError::from_retry(step, e))
    }

    /// Run one mutation through checksum, submit and (if needed) polling.
    ///
    /// `submit` receives the payload with its checksum attached; `poll` is only
    /// called when `submit` returns [`Submission::Started`].
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::Remote`] for a fatal or exhausted submit or poll call
    /// - [`OrchestrationError::Integrity`] if the remote rejects the checksum
    /// - [`OrchestrationError::OperationFailed`] if the operation completes with an error
    /// - [`OrchestrationError::TimedOut`] if the operation outlives the poll deadline
    /// - [`OrchestrationError::Cancelled`] if the cancellation token is set
    #[instrument(skip_all, fields(checksummed = tracing::field::Empty))]
    pub fn run<T, S, P>(
        &self,
        payload: Option<Payload>,
        mut submit: S,
        mut poll: P,
    ) -> Result<MutationOutcome<T>, OrchestrationError>
    where
        S: FnMut(Option<&Payload>) -> RpcResult<Submission<T>>,
        P: FnMut(&OperationHandle<T>) -> RpcResult<OperationHandle<T>>,
    {
        let payload = payload.map(|p| self.prepare_payload(p));
        tracing::Span::current().record(
            "checksummed",
            payload.as_ref().is_some_and(|p| p.checksum().is_some()),
        );

        let controller = self.controller();
        let mut submit_attempts: u32 = 0;
        let submitted = self.retrying(&controller, Step::Submit, || {
            submit_attempts += 1;
            submit(payload.as_ref())
        });
        self.count(names::SUBMIT_ATTEMPTS, u64::from(submit_attempts));

        let result = submitted.and_then(|submission| match submission {
            Submission::Completed(value) => {
                info!(submit_attempts, "mutation completed directly");
                Ok(MutationOutcome {
                    value,
                    submit_attempts,
                    polls: 0,
                    operation: None,
                })
            }
            Submission::Started(handle) => {
                info!(submit_attempts, operation = handle.name(), "mutation started long-running operation");
                self.await_operation(&controller, handle, &mut poll)
                    .map(|(value, polls, operation)| MutationOutcome {
                        value,
                        submit_attempts,
                        polls,
                        operation: Some(operation),
                    })
            }
        });

        self.record_result(&result);
        result
    }

    fn prepare_payload(&self, payload: Payload) -> Payload {
        if self.config.verify_checksums && payload.checksum().is_none() {
            let payload = attach_checksum(payload.into_data());
            debug!(len = payload.len(), checksum = ?payload.checksum(), "attached checksum");
            payload
        } else {
            payload
        }
    }

    fn await_operation<T, P>(
        &self,
        controller: &RetryController,
        handle: OperationHandle<T>,
        poll: &mut P,
    ) -> Result<(T, u32, String), OrchestrationError>
    where
        P: FnMut(&OperationHandle<T>) -> RpcResult<OperationHandle<T>>,
    {
        let poller = OperationPoller::new(self.config.poll).with_clock(Arc::clone(&self.clock));
        let submitted_at = self.clock.now();
        let deadline = self.config.poll.timeout();
        let slot = controller.clone().with_deadline(submitted_at + deadline);
        let outcome = poller.wait_since(handle, submitted_at, |current| {
            slot.run(|| poll(current), &|e: &RpcError| self.is_retryable(e))
        });

        match outcome {
            Ok(done) => {
                self.count(names::POLLS, u64::from(done.polls));
                self.observe_operation(done.polls, done.elapsed);
                Ok((done.value, done.polls, done.operation))
            }
            Err(e) => {
                self.count(names::POLLS, u64::from(e.polls()));
                Err(match e {
                    PollError::Transport {
                        operation,
                        polls,
                        error: RetryError::DeadlineExceeded { last_error, .. },
                    } => {
                        let elapsed = self.clock.now().saturating_duration_since(submitted_at);
                        warn!(%operation, polls, ?elapsed, ?deadline, "deadline reached while retrying a poll");
                        OrchestrationError::TimedOut {
                            operation,
                            elapsed,
                            deadline,
                            polls,
                            last_error,
                        }
                    }
                    PollError::Transport { error, .. } => OrchestrationError::from_retry(Step::Poll, error),
                    PollError::Failed { error, .. } if error.class() == ErrorClass::Integrity => {
                        OrchestrationError::Integrity {
                            step: Step::Poll,
                            source: error,
                        }
                    }
                    PollError::Failed { operation, error, .. } => OrchestrationError::OperationFailed {
                        operation,
                        source: error,
                    },
                    PollError::TimedOut {
                        operation,
                        polls,
                        elapsed,
                        deadline,
                    } => OrchestrationError::TimedOut {
                        operation,
                        elapsed,
                        deadline,
                        polls,
                        last_error: None,
                    },
                })
            }
        }
    }

    /// Run a mutation against a [`MutationService`].
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run`]
    pub fn mutate<S>(
        &self,
        service: &S,
        request: &S::Request,
        payload: Option<Payload>,
    ) -> Result<MutationOutcome<S::Output>, OrchestrationError>
    where
        S: MutationService + ?Sized,
    {
        self.run(
            payload,
            |p| service.submit(request, p),
            |handle| service.poll(handle),
        )
    }

    /// Fetch a payload with retry and check it against its checksum.
    ///
    /// A payload returned without a checksum is accepted as is.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::Integrity`] with [`Step::Checksum`] if the bytes do
    ///   not match the returned checksum
    /// - [`OrchestrationError::Remote`] or [`OrchestrationError::Cancelled`] if the
    ///   fetch itself fails
    #[instrument(skip_all)]
    pub fn fetch_verified<F>(&self, fetch: F) -> Result<Payload, OrchestrationError>
    where
        F: FnMut() -> RpcResult<Payload>,
    {
        let payload = self.retrying(&self.controller(), Step::Fetch, fetch)?;
        if let Err(mismatch) = payload.verify() {
            warn!(%mismatch, "fetched payload failed verification");
            self.count(names::INTEGRITY_FAILURES, 1);
            return Err(OrchestrationError::Integrity {
                step: Step::Checksum,
                source: mismatch.into(),
            });
        }
        debug!(len = payload.len(), checksum = ?payload.checksum(), "payload verified");
        Ok(payload)
    }

    /// Fetch a named payload from a [`PayloadService`] and verify it.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::fetch_verified`]
    pub fn fetch_payload<S>(&self, service: &S, name: &str) -> Result<Payload, OrchestrationError>
    where
        S: PayloadService + ?Sized,
    {
        self.fetch_verified(|| service.fetch_payload(name))
    }

    /// Lazily list items, retrying each page fetch on transient failures.
    ///
    /// Convert stream errors with `OrchestrationError::from`.
    pub fn list<'a, T, F>(
        &'a self,
        mut fetch_page: F,
    ) -> PageStream<T, OrchestrationError, impl FnMut(&PageRequest) -> Result<ResultPage<T>, OrchestrationError> + 'a>
    where
        F: FnMut(&PageRequest) -> RpcResult<ResultPage<T>> + 'a,
        T: 'a,
    {
        let controller = self.controller();
        PageStream::new(self.config.pagination, move |request: &PageRequest| {
            debug!(page = request.index, token = ?request.token, "fetching page");
            let page = self.retrying(&controller, Step::PageFetch, || fetch_page(request));
            if page.is_ok() {
                self.count(names::PAGES_FETCHED, 1);
            }
            page
        })
    }

    /// [`Orchestrator::list`] over a [`ListService`].
    pub fn list_service<'a, S>(
        &'a self,
        service: &'a S,
    ) -> PageStream<
        S::Item,
        OrchestrationError,
        impl FnMut(&PageRequest) -> Result<ResultPage<S::Item>, OrchestrationError> + 'a,
    >
    where
        S: ListService + ?Sized,
        S::Item: 'a,
    {
        self.list(move |request: &PageRequest| service.list_page(request))
    }

    /// Run independent calls concurrently, one result per item in input order.
    ///
    /// `f` receives this orchestrator and one item. The orchestrator and any
    /// client `f` captures are shared read-only between workers.
    #[cfg(feature = "parallel")]
    pub fn run_all<I, R, F>(&self, items: Vec<I>, f: F) -> Vec<Result<R, OrchestrationError>>
    where
        I: Send,
        R: Send,
        F: Fn(&Self, I) -> Result<R, OrchestrationError> + Sync + Send,
    {
        use rayon::prelude::*;
        items.into_par_iter().map(|item| f(self, item)).collect()
    }

    /// Run independent calls one after another, one result per item in input order.
    #[cfg(not(feature = "parallel"))]
    pub fn run_all<I, R, F>(&self, items: Vec<I>, f: F) -> Vec<Result<R, OrchestrationError>>
    where
        F: Fn(&Self, I) -> Result<R, OrchestrationError>,
    {
        items.into_iter().map(|item| f(self, item)).collect()
    }

    /// Write a one-line summary of `outcome` to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the write
    pub fn report<T, W>(&self, sink: &mut W, outcome: &MutationOutcome<T>) -> std::io::Result<()>
    where
        T: fmt::Display,
        W: ResultSink + ?Sized,
    {
        sink.write_result(&outcome.to_string())
    }

    fn record_result<T>(&self, result: &Result<MutationOutcome<T>, OrchestrationError>) {
        match result {
            Ok(_) => self.count(names::MUTATIONS_SUCCEEDED, 1),
            Err(e) => {
                warn!(step = %e.step(), error = %e, "mutation failed");
                self.count(names::MUTATIONS_FAILED, 1);
                if e.is_integrity() {
                    self.count(names::INTEGRITY_FAILURES, 1);
                }
                if e.is_timeout() {
                    self.count(names::TIMEOUTS, 1);
                }
            }
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Metrics hooks
// ============================================================================

#[cfg(feature = "metrics")]
impl Orchestrator {
    fn count(&self, name: &str, by: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_counter(name, by);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe_operation(&self, polls: u32, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_value(names::POLLS_PER_OPERATION, f64::from(polls));
            metrics.record_value(names::OPERATION_ELAPSED_MS, elapsed.as_millis() as f64);
        }
    }
}

#[cfg(not(feature = "metrics"))]
impl Orchestrator {
    #[allow(clippy::unused_self)]
    const fn count(&self, _name: &str, _by: u64) {}

    #[allow(clippy::unused_self)]
    const fn observe_operation(&self, _polls: u32, _elapsed: Duration) {}
}
