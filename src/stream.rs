//! Lazy consumption of paginated listings.
//!
//! [`PageStream`] turns a page-fetching function into an iterator over items.
//! Pages are requested one at a time with the previous page's continuation token
//! and only the current page is held in memory. The stream ends after the first
//! page without a token (or with an empty one) and is fused: after the last page
//! or after an error no further fetch is made.
//!
//! The stream cannot resume mid-way. When a fetch fails the caller starts a new
//! stream from the first page. Wrap the fetch function in a
//! [`RetryController`](crate::retry::RetryController) to absorb transient
//! failures within a single page fetch.
//!
//! ```
//! use ironlro::rpc::{PageRequest, ResultPage};
//! use ironlro::stream::{PageStream, PaginationConfig};
//!
//! let pages = vec![
//!     ResultPage::with_token(vec![1, 2], "t1"),
//!     ResultPage::last(vec![3]),
//! ];
//! let stream = PageStream::new(PaginationConfig::default(), move |req: &PageRequest| {
//!     Ok::<_, String>(pages[req.index as usize].clone())
//! });
//! assert_eq!(stream.collect_all().unwrap(), vec![1, 2, 3]);
//! ```

use crate::rpc::{PageRequest, ResultPage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;

/// Configuration for pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: u32,
    /// Stop after this many pages even if the remote reports more.
    pub max_pages: Option<u32>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError<E> {
    #[error("fetching page {page} failed: {error}")]
    Fetch { page: u32, error: E },

    /// The remote returned a page that cannot belong to a well-formed listing.
    #[error("page {page} is invalid: {reason}")]
    InvalidPage { page: u32, reason: String },
}

impl<E> StreamError<E> {
    #[must_use]
    pub const fn page(&self) -> u32 {
        match self {
            Self::Fetch { page, .. } | Self::InvalidPage { page, .. } => *page,
        }
    }
}

/// Finite, non-restartable sequence of items pulled page by page.
pub struct PageStream<T, E, F> {
    fetch: F,
    config: PaginationConfig,
    current: std::vec::IntoIter<T>,
    next_token: Option<String>,
    used_tokens: HashSet<String>,
    pages_fetched: u32,
    finished: bool,
    _error: PhantomData<fn() -> E>,
}

impl<T, E, F> PageStream<T, E, F>
where
    F: FnMut(&PageRequest) -> Result<ResultPage<T>, E>,
{
    pub fn new(config: PaginationConfig, fetch: F) -> Self {
        Self {
            fetch,
            config,
            current: Vec::new().into_iter(),
            next_token: None,
            used_tokens: HashSet::new(),
            pages_fetched: 0,
            finished: false,
            _error: PhantomData,
        }
    }

    #[must_use]
    pub const fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Drain the stream into a vector, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first fetch failure or invalid page encountered
    pub fn collect_all(self) -> Result<Vec<T>, StreamError<E>> {
        self.collect()
    }

    fn fetch_next_page(&mut self) -> Result<(), StreamError<E>> {
        let index = self.pages_fetched;
        let request = PageRequest {
            token: self.next_token.take(),
            page_size: self.config.page_size,
            index,
        };
        let page = (self.fetch)(&request).map_err(|error| StreamError::Fetch { page: index, error })?;
        self.pages_fetched += 1;

        match page.continuation() {
            None => {
                debug!(page = index, items = page.items.len(), "fetched last page");
                self.finished = true;
            }
            Some(token) => {
                if !self.used_tokens.insert(token.to_string()) {
                    return Err(StreamError::InvalidPage {
                        page: index,
                        reason: format!("continuation token {token:?} was already used"),
                    });
                }
                debug!(page = index, items = page.items.len(), "fetched page");
                self.next_token = Some(token.to_string());
            }
        }

        self.current = page.items.into_iter();
        Ok(())
    }
}

impl<T, E, F> Iterator for PageStream<T, E, F>
where
    F: FnMut(&PageRequest) -> Result<ResultPage<T>, E>,
{
    type Item = Result<T, StreamError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            if self
                .config
                .max_pages
                .is_some_and(|max| self.pages_fetched >= max)
            {
                self.finished = true;
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}
