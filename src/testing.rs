//! Testing utilities for code built on the orchestration layer.
//!
//! - **Fixtures**: configurations tuned for virtual time, an orchestrator wired
//!   to a [`ManualClock`](crate::clock::ManualClock), sample payloads and pages
//! - **Assertions**: check which [`Step`](crate::orchestrator::Step) failed and
//!   how long the virtual clock slept
//!
//! Combine them with the fakes in [`crate::rpc::fake`]:
//!
//! ```
//! use ironlro::rpc::FakeMutationService;
//! use ironlro::testing::*;
//!
//! let (orchestrator, clock) = manual_orchestrator(fast_config());
//! let service = FakeMutationService::new()
//!     .then_start("operations/op-1")
//!     .then_poll_pending(2)
//!     .then_poll_success(42);
//!
//! let outcome = orchestrator.mutate(&service, &"req".to_string(), None).unwrap();
//! assert_eq!(outcome.value, 42);
//! assert_eq!(outcome.polls, 3);
//! assert_clock_slept(&clock, fast_config().poll.interval() * 3);
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
