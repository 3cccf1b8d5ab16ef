//! Abstract remote capability the orchestration layer is written against.
//!
//! The traits here describe what a remote resource-management API offers, not
//! how any particular provider encodes it:
//!
//! - [`MutationService`] - a mutating call that may return a long-running
//!   operation, plus the poll call for that operation
//! - [`ListService`] - a paginated list or group call
//! - [`PayloadService`] - retrieval of stored payloads with their checksum
//! - [`Closeable`] - clients that own resources released on close
//!
//! Failures are [`RpcError`]s whose [`ErrorKind`] decides whether a retry may
//! help (see [`ErrorClass`]).
//!
//! ## Synchronous by Design
//!
//! All traits are blocking. An implementation backed by an async SDK drives its
//! runtime internally and exposes the blocking interface.
//!
//! ## Unit Testing with Fakes
//!
//! ```
//! use ironlro::rpc::*;
//!
//! let service = FakeMutationService::<String>::new()
//!     .then_start("operations/op-1")
//!     .then_poll_pending(2)
//!     .then_poll_success("done".to_string());
//!
//! let submission = service.submit(&"req".to_string(), None).unwrap();
//! assert!(matches!(submission, Submission::Started(_)));
//! assert_eq!(service.submit_calls(), 1);
//! ```

pub mod fake;
pub mod traits;

pub use fake::*;
pub use traits::*;
