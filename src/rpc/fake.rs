//! Fake implementations for testing.
//!
//! These keep scripted responses in memory so orchestration logic can be
//! exercised without a remote endpoint. Every fake is cheap to clone; clones
//! share their state, so a test can hand one clone to the code under test and
//! inspect call counts through another.

use crate::rpc::traits::{
    Closeable, ErrorKind, ListService, MutationService, OperationHandle, PageRequest, Payload,
    PayloadService, ResultPage, RpcError, RpcResult, Submission,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn script_exhausted(what: &str) -> RpcError {
    RpcError::new(ErrorKind::InternalError, format!("no scripted {what} response left"))
}

// ============================================================================
// Mutation Service
// ============================================================================

enum SubmitStep<T> {
    Complete(T),
    Start(String),
    Error(RpcError),
}

enum PollStep<T> {
    Pending,
    Success(T),
    Failure(RpcError),
    Error(RpcError),
}

struct MutationState<T> {
    submits: VecDeque<SubmitStep<T>>,
    polls: VecDeque<PollStep<T>>,
    submit_calls: u32,
    poll_calls: u32,
    payloads: Vec<Option<Payload>>,
    reject_bad_checksums: bool,
}

/// Scripted [`MutationService`]: submit and poll responses are served in the
/// order they were queued.
pub struct FakeMutationService<T> {
    state: Arc<Mutex<MutationState<T>>>,
}

impl<T> Clone for FakeMutationService<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> FakeMutationService<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MutationState {
                submits: VecDeque::new(),
                polls: VecDeque::new(),
                submit_calls: 0,
                poll_calls: 0,
                payloads: Vec::new(),
                reject_bad_checksums: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MutationState<T>> {
        self.state.lock().expect("fake mutex poisoned")
    }

    /// Next submit returns the value directly.
    #[must_use]
    pub fn then_complete(self, value: T) -> Self {
        self.lock().submits.push_back(SubmitStep::Complete(value));
        self
    }

    /// Next submit starts a long-running operation called `operation`.
    #[must_use]
    pub fn then_start(self, operation: impl Into<String>) -> Self {
        self.lock().submits.push_back(SubmitStep::Start(operation.into()));
        self
    }

    #[must_use]
    pub fn then_submit_error(self, error: RpcError) -> Self {
        self.lock().submits.push_back(SubmitStep::Error(error));
        self
    }

    /// Queue `count` submit failures of the given kind.
    #[must_use]
    pub fn then_submit_errors(self, count: u32, kind: ErrorKind) -> Self {
        {
            let mut state = self.lock();
            for i in 0..count {
                state
                    .submits
                    .push_back(SubmitStep::Error(RpcError::new(kind, format!("scripted submit failure {}", i + 1))));
            }
        }
        self
    }

    /// Next `count` polls report the operation as still running.
    #[must_use]
    pub fn then_poll_pending(self, count: u32) -> Self {
        {
            let mut state = self.lock();
            for _ in 0..count {
                state.polls.push_back(PollStep::Pending);
            }
        }
        self
    }

    #[must_use]
    pub fn then_poll_success(self, value: T) -> Self {
        self.lock().polls.push_back(PollStep::Success(value));
        self
    }

    /// Next poll reports the operation as finished with `error`.
    #[must_use]
    pub fn then_poll_failure(self, error: RpcError) -> Self {
        self.lock().polls.push_back(PollStep::Failure(error));
        self
    }

    /// Next poll call itself fails with `error`.
    #[must_use]
    pub fn then_poll_error(self, error: RpcError) -> Self {
        self.lock().polls.push_back(PollStep::Error(error));
        self
    }

    /// Reject submissions whose payload checksum does not match its bytes,
    /// the way a checksum-aware store does.
    #[must_use]
    pub fn reject_bad_checksums(self) -> Self {
        self.lock().reject_bad_checksums = true;
        self
    }

    #[must_use]
    pub fn submit_calls(&self) -> u32 {
        self.lock().submit_calls
    }

    #[must_use]
    pub fn poll_calls(&self) -> u32 {
        self.lock().poll_calls
    }

    /// Payload passed to each submit call, in call order.
    #[must_use]
    pub fn received_payloads(&self) -> Vec<Option<Payload>> {
        self.lock().payloads.clone()
    }
}

impl<T> Default for FakeMutationService<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> MutationService for FakeMutationService<T> {
    type Request = String;
    type Output = T;

    fn submit(&self, _request: &Self::Request, payload: Option<&Payload>) -> RpcResult<Submission<T>> {
        let mut state = self.lock();
        state.submit_calls += 1;
        state.payloads.push(payload.cloned());

        if state.reject_bad_checksums {
            if let Some(mismatch) = payload.and_then(|p| p.verify().err()) {
                return Err(mismatch.into());
            }
        }

        match state.submits.pop_front() {
            Some(SubmitStep::Complete(value)) => Ok(Submission::Completed(value)),
            Some(SubmitStep::Start(name)) => Ok(Submission::Started(OperationHandle::pending(name))),
            Some(SubmitStep::Error(error)) => Err(error),
            None => Err(script_exhausted("submit")),
        }
    }

    fn poll(&self, handle: &OperationHandle<T>) -> RpcResult<OperationHandle<T>> {
        let mut state = self.lock();
        state.poll_calls += 1;
        match state.polls.pop_front() {
            Some(PollStep::Pending) => Ok(OperationHandle::pending(handle.name())),
            Some(PollStep::Success(value)) => Ok(OperationHandle::succeeded(handle.name(), value)),
            Some(PollStep::Failure(error)) => Ok(OperationHandle::failed(handle.name(), error)),
            Some(PollStep::Error(error)) => Err(error),
            None => Err(script_exhausted("poll")),
        }
    }
}

// ============================================================================
// List Service
// ============================================================================

struct ListState<T> {
    pages: Vec<ResultPage<T>>,
    by_token: HashMap<String, usize>,
    failures: VecDeque<RpcError>,
    requests: Vec<PageRequest>,
}

/// [`ListService`] over a fixed sequence of pages.
///
/// The first page is served for a request without a token; page `n + 1` for the
/// continuation token of page `n`.
pub struct FakeListService<T> {
    state: Arc<Mutex<ListState<T>>>,
}

impl<T> Clone for FakeListService<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> FakeListService<T> {
    #[must_use]
    pub fn new(pages: Vec<ResultPage<T>>) -> Self {
        let by_token = pages
            .iter()
            .enumerate()
            .filter_map(|(i, page)| page.continuation().map(|t| (t.to_string(), i + 1)))
            .collect();
        Self {
            state: Arc::new(Mutex::new(ListState {
                pages,
                by_token,
                failures: VecDeque::new(),
                requests: Vec::new(),
            })),
        }
    }

    /// Split `items` into pages of `page_size` linked by tokens `page-1`, `page-2`, ...
    #[must_use]
    pub fn from_items(items: Vec<T>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let mut pages = Vec::new();
        let mut rest = items.into_iter().peekable();
        while rest.peek().is_some() {
            let chunk: Vec<T> = rest.by_ref().take(page_size).collect();
            pages.push(chunk);
        }
        let count = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, items)| {
                if i + 1 == count {
                    ResultPage::last(items)
                } else {
                    ResultPage::with_token(items, format!("page-{}", i + 1))
                }
            })
            .collect();
        Self::new(pages)
    }

    fn lock(&self) -> MutexGuard<'_, ListState<T>> {
        self.state.lock().expect("fake mutex poisoned")
    }

    /// Make the next page fetch fail with `error` before any page is served.
    #[must_use]
    pub fn fail_next(self, error: RpcError) -> Self {
        self.lock().failures.push_back(error);
        self
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.lock().requests.len()
    }

    /// Every page request received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<PageRequest> {
        self.lock().requests.clone()
    }
}

impl<T: Clone + Send> ListService for FakeListService<T> {
    type Item = T;

    fn list_page(&self, request: &PageRequest) -> RpcResult<ResultPage<T>> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let index = match &request.token {
            None => 0,
            Some(token) => *state.by_token.get(token).ok_or_else(|| {
                RpcError::new(ErrorKind::InvalidInput, format!("unknown page token {token:?}"))
            })?,
        };

        Ok(state
            .pages
            .get(index)
            .cloned()
            .unwrap_or_else(|| ResultPage::last(Vec::new())))
    }
}

// ============================================================================
// Payload Service
// ============================================================================

#[derive(Default)]
struct PayloadState {
    payloads: HashMap<String, Payload>,
    failures: VecDeque<RpcError>,
    fetch_calls: u32,
}

/// In-memory [`PayloadService`] keyed by resource name.
#[derive(Clone, Default)]
pub struct FakePayloadService {
    state: Arc<Mutex<PayloadState>>,
}

impl FakePayloadService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PayloadState> {
        self.state.lock().expect("fake mutex poisoned")
    }

    /// Store `payload` under `name` exactly as given, checksum included.
    pub fn insert(&self, name: impl Into<String>, payload: Payload) {
        self.lock().payloads.insert(name.into(), payload);
    }

    #[must_use]
    pub fn with_payload(self, name: impl Into<String>, payload: Payload) -> Self {
        self.insert(name, payload);
        self
    }

    #[must_use]
    pub fn fail_next(self, error: RpcError) -> Self {
        self.lock().failures.push_back(error);
        self
    }

    #[must_use]
    pub fn fetch_calls(&self) -> u32 {
        self.lock().fetch_calls
    }
}

impl PayloadService for FakePayloadService {
    fn fetch_payload(&self, name: &str) -> RpcResult<Payload> {
        let mut state = self.lock();
        state.fetch_calls += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state
            .payloads
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::new(ErrorKind::NotFound, format!("payload {name} not found")))
    }
}

// ============================================================================
// Client Lifetime
// ============================================================================

/// [`Closeable`] client that counts how often it was closed.
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    closes: Arc<AtomicU32>,
}

impl FakeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Closeable for FakeClient {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
