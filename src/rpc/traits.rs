//! Core traits and types for the remote RPC capability.
//!
//! The orchestration layer never talks to a concrete cloud SDK. It is written
//! against these synchronous traits; implementations can wrap an async client
//! internally but expose a blocking interface.

use crate::checksum::Checksum;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error returned by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    pub message: String,
    pub kind: ErrorKind,
    pub detail: Option<String>,
}

/// Status taxonomy for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    AlreadyExists,
    InvalidInput,
    FailedPrecondition,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    Aborted,
    ChecksumMismatch,
    InternalError,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Broad class of an [`ErrorKind`], used to decide whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport-level failure, throttling or temporary unavailability.
    Transient,
    /// The request itself is wrong or conflicts with remote state.
    Semantic,
    /// The remote side rejected the payload checksum.
    Integrity,
    /// Server fault or unclassified failure.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn class(self) -> ErrorClass {
        match self {
            Self::Network
            | Self::Timeout
            | Self::ServiceUnavailable
            | Self::RateLimited
            | Self::Aborted => ErrorClass::Transient,
            Self::Authentication
            | Self::Authorization
            | Self::NotFound
            | Self::AlreadyExists
            | Self::InvalidInput
            | Self::FailedPrecondition => ErrorClass::Semantic,
            Self::ChecksumMismatch => ErrorClass::Integrity,
            Self::InternalError | Self::Other => ErrorClass::Internal,
        }
    }

    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    #[must_use]
    pub const fn is_semantic(self) -> bool {
        matches!(self.class(), ErrorClass::Semantic)
    }
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        self.kind.class()
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

// ============================================================================
// Payload
// ============================================================================

/// Immutable bytes submitted to (or returned by) a remote store.
///
/// When `checksum` is present the remote side is expected to reject the
/// mutation unless it matches the CRC-32C of `data`. Nothing is enforced
/// locally on the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    checksum: Option<Checksum>,
}

impl Payload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            checksum: None,
        }
    }

    /// Payload carrying a checksum computed elsewhere (e.g. read back from a remote).
    pub fn with_checksum(data: impl Into<Vec<u8>>, checksum: Checksum) -> Self {
        Self {
            data: data.into(),
            checksum: Some(checksum),
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn checksum(&self) -> Option<Checksum> {
        self.checksum
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

// ============================================================================
// Long-running Operations
// ============================================================================

/// Completion state of a server-side operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus<T> {
    Pending,
    Succeeded(T),
    Failed(RpcError),
}

/// Opaque reference to a server-tracked asynchronous task.
///
/// Handles are produced by submit calls and replaced wholesale by poll
/// responses; the orchestrator never edits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle<T> {
    name: String,
    status: OperationStatus<T>,
}

impl<T> OperationHandle<T> {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: OperationStatus::Pending,
        }
    }

    pub fn succeeded(name: impl Into<String>, result: T) -> Self {
        Self {
            name: name.into(),
            status: OperationStatus::Succeeded(result),
        }
    }

    pub fn failed(name: impl Into<String>, error: RpcError) -> Self {
        Self {
            name: name.into(),
            status: OperationStatus::Failed(error),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn status(&self) -> &OperationStatus<T> {
        &self.status
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        !matches!(self.status, OperationStatus::Pending)
    }

    #[must_use]
    pub fn into_status(self) -> OperationStatus<T> {
        self.status
    }

    /// Split a finished handle into its outcome; a pending handle is handed back.
    ///
    /// # Errors
    ///
    /// Returns the handle itself while the operation is still pending
    pub fn into_result(self) -> Result<Result<T, RpcError>, Self> {
        match self.status {
            OperationStatus::Pending => Err(Self::pending(self.name)),
            OperationStatus::Succeeded(value) => Ok(Ok(value)),
            OperationStatus::Failed(error) => Ok(Err(error)),
        }
    }
}

/// What a mutating call returned: a direct result, or a handle to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    Completed(T),
    Started(OperationHandle<T>),
}

// ============================================================================
// Pagination
// ============================================================================

/// One page of a listing or grouping response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPage<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> ResultPage<T> {
    pub const fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn with_token(items: Vec<T>, token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(token.into()),
        }
    }

    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// Token for the following page; an empty token also marks the last page.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Request for one page: the continuation token of the previous page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: Option<String>,
    pub page_size: u32,
    /// 0-based position of the requested page in the stream.
    pub index: u32,
}

// ============================================================================
// Service Traits
// ============================================================================

/// A remote API exposing one mutating call and the poll call for its operations.
pub trait MutationService: Send + Sync {
    type Request;
    type Output;

    /// Issue the mutating call.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails in transport or is rejected by the remote
    fn submit(
        &self,
        request: &Self::Request,
        payload: Option<&Payload>,
    ) -> RpcResult<Submission<Self::Output>>;

    /// Fetch the latest state of an operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll RPC itself fails
    fn poll(&self, handle: &OperationHandle<Self::Output>)
    -> RpcResult<OperationHandle<Self::Output>>;
}

/// A remote API exposing a paginated list or group call.
pub trait ListService: Send + Sync {
    type Item;

    /// Fetch one page; a request without a token asks for the first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched
    fn list_page(&self, request: &PageRequest) -> RpcResult<ResultPage<Self::Item>>;
}

/// A remote API returning stored payloads together with their checksum.
pub trait PayloadService: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the payload cannot be fetched
    fn fetch_payload(&self, name: &str) -> RpcResult<Payload>;
}

// ============================================================================
// Client Lifetime
// ============================================================================

/// A client handle that owns background resources released by `close`.
pub trait Closeable {
    fn close(&self);
}

/// Guard that closes a client on every exit path.
pub struct ScopedClient<C: Closeable> {
    client: C,
}

impl<C: Closeable> ScopedClient<C> {
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// Open a client with `open`, returning a guard only if it succeeded.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `open`
    pub fn open<F, E>(open: F) -> Result<Self, E>
    where
        F: FnOnce() -> Result<C, E>,
    {
        open().map(Self::new)
    }

    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }
}

impl<C: Closeable> std::ops::Deref for ScopedClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: Closeable> Drop for ScopedClient<C> {
    fn drop(&mut self) {
        self.client.close();
    }
}

/// Run `body` with a freshly opened client, closing it afterwards whatever happens.
///
/// # Errors
///
/// Returns the error from `open` or from `body`
pub fn with_client<C, T, E, O, F>(open: O, body: F) -> Result<T, E>
where
    C: Closeable,
    O: FnOnce() -> Result<C, E>,
    F: FnOnce(&C) -> Result<T, E>,
{
    let scoped = ScopedClient::open(open)?;
    body(scoped.client())
}
