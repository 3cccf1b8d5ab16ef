//! # ironlro
//!
//! Client-side orchestration for remote resource-management APIs. A mutating
//! remote call is wrapped with:
//!
//! - **Checksums** - CRC-32C (Castagnoli) computed before submission and
//!   verified after retrieval
//! - **Bounded retry** - a fixed attempt budget with a per-attempt delay policy
//!   and pluggable failure classification
//! - **Long-running operation polling** - fixed or growing intervals up to a
//!   deadline, without cancelling the remote operation on timeout
//! - **Lazy pagination** - token-ordered page streams that never hold more than
//!   the current page
//!
//! The crate is synchronous and provider agnostic: it is written against the
//! traits in [`rpc`], and every wait goes through an injectable [`clock::Clock`]
//! so behaviour can be tested in virtual time.
//!
//! ## Quick Start
//!
//! ```
//! use ironlro::prelude::*;
//! use ironlro::rpc::FakeMutationService;
//!
//! # fn main() -> Result<(), OrchestrationError> {
//! let clock = ManualClock::new();
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default())
//!     .with_clock(clock.clone().into_shared());
//!
//! // A remote that is briefly unavailable, then starts an operation
//! let service = FakeMutationService::new()
//!     .then_submit_errors(1, ErrorKind::ServiceUnavailable)
//!     .then_start("operations/add-version-1")
//!     .then_poll_pending(1)
//!     .then_poll_success("projects/p/secrets/s/versions/1".to_string());
//!
//! let payload = Payload::new(b"my super secret data".to_vec());
//! let outcome = orchestrator.mutate(&service, &"projects/p/secrets/s".to_string(), Some(payload))?;
//!
//! assert_eq!(outcome.submit_attempts, 2);
//! assert_eq!(outcome.polls, 2);
//! assert!(service.received_payloads()[0].as_ref().unwrap().checksum().is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`checksum`] - CRC-32C computation and verification
//! - [`retry`] - retry controller, delay policies, classifiers, cancellation
//! - [`poller`] - long-running operation state machine
//! - [`stream`] - paginated result streams
//! - [`orchestrator`] - composition of the above
//! - [`rpc`] - remote capability traits and in-memory fakes
//! - [`config`] - serde-backed configuration with JSON and environment loading
//! - [`metrics`] - counters and histograms fed by the orchestrator
//! - [`sink`] - destination for terminal results
//! - [`testing`] - fixtures and assertions for virtual-time tests
//!
//! ## Features
//!
//! - `metrics` (default) - lets an [`Orchestrator`] record into a
//!   [`metrics::MetricsCollector`] via `Orchestrator::with_metrics`. The
//!   [`metrics`] module itself is always available for standalone use.
//! - `parallel` (default) - runs [`Orchestrator::run_all`] on the rayon pool

pub mod checksum;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod rpc;
pub mod sink;
pub mod stream;
pub mod testing;

// General re-exports
pub use checksum::{Checksum, ChecksumMismatch, attach_checksum, compute_checksum, verify_checksum};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, OrchestratorConfig};
pub use orchestrator::{MutationOutcome, OrchestrationError, Orchestrator, Step};
pub use poller::{OperationPoller, PollConfig, PollError, PollOutcome, PollState};
pub use retry::{
    CancellationToken, ConstantDelay, LinearDelay, RetryController, RetryError, RetryPolicy, retry,
    retry_with_backoff,
};
pub use sink::ResultSink;
pub use stream::{PageStream, PaginationConfig, StreamError};

/// Everything needed for typical use in one import.
pub mod prelude {
    pub use crate::checksum::{Checksum, attach_checksum, compute_checksum, verify_checksum};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::OrchestratorConfig;
    pub use crate::orchestrator::{MutationOutcome, OrchestrationError, Orchestrator, Step};
    pub use crate::retry::{CancellationToken, RetryPolicy};
    pub use crate::rpc::{
        ErrorKind, ListService, MutationService, OperationHandle, Payload, PayloadService, ResultPage,
        RpcError, RpcResult, Submission,
    };
    pub use crate::sink::ResultSink;
}
