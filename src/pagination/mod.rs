//! Remote paged collections exposed as forward-only sequences.
//!
//! A remote collection is reached one page at a time through a
//! [`PageRequester`]. Two fetchers hide the page boundaries:
//!
//! - [`EagerPages`] blocks in `fetch_next` until the element's page is loaded
//!   and hands back the element itself.
//! - [`PipelinedPages`] hands back a [`Task`] per element immediately and
//!   requests the following page as soon as every element of the buffered one
//!   has been asked for, overlapping network latency with the caller's work.
//!
//! Both fetch the first page on creation to learn the sequence length. A page
//! that resolves to absence or comes back empty ends the sequence.

mod eager;
mod pipelined;

pub use eager::EagerPages;
pub use pipelined::PipelinedPages;

use crate::error::Error;
use crate::task::{Task, guarded};
use serde::{Deserialize, Serialize};

/// Page metadata returned alongside every page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Zero based index of the first element of the page
    pub index: usize,

    /// Number of elements requested
    pub page_size: usize,

    /// Number of elements actually returned
    pub result_count: usize,

    /// Length of the whole remote collection, when the remote knows it
    #[serde(default)]
    pub total_count: Option<usize>,
}

/// One page of a remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Elements in remote order
    #[serde(rename = "data")]
    pub items: Vec<T>,

    /// Position and size information
    pub pagination: Pagination,
}

impl<T> Page<T> {
    /// Builds a page, deriving `result_count` from `items`
    pub fn new(items: Vec<T>, index: usize, page_size: usize, total_count: Option<usize>) -> Self {
        let result_count = items.len();
        Self {
            items,
            pagination: Pagination {
                index,
                page_size,
                result_count,
                total_count,
            },
        }
    }

    /// Length of the whole sequence as far as this page can tell
    ///
    /// A reported total is authoritative. Without one, a short page marks the
    /// end and a full page means more may follow.
    pub(crate) fn sequence_len(&self, query: &PageQuery) -> usize {
        match self.pagination.total_count {
            Some(total) => total,
            None if self.items.len() < query.page_size => query.index + self.items.len(),
            None => usize::MAX,
        }
    }
}

/// Which slice of the remote collection to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageQuery {
    /// Zero based index of the first element to include
    pub index: usize,
    /// Number of elements to include
    pub page_size: usize,
}

impl PageQuery {
    /// The first page
    pub fn first(page_size: usize) -> Self {
        Self::at(0, page_size)
    }

    /// The page starting at `index`
    pub fn at(index: usize, page_size: usize) -> Self {
        Self { index, page_size }
    }

    /// One past the last index this query covers
    pub fn end(&self) -> usize {
        self.index.saturating_add(self.page_size)
    }

    /// Appends `index` and `pageSize` query arguments to `endpoint`
    pub fn append_to(&self, endpoint: &str) -> String {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{endpoint}{separator}index={}&pageSize={}", self.index, self.page_size)
    }
}

/// Fetches one page of a remote collection
///
/// Implemented for every `Fn(PageQuery) -> Task<Page<T>>` closure.
pub trait PageRequester<T>: Send + Sync {
    /// Starts fetching the page described by `query`
    fn request(&self, query: PageQuery) -> Task<Page<T>>;
}

impl<T, F> PageRequester<T> for F
where
    F: Fn(PageQuery) -> Task<Page<T>> + Send + Sync,
{
    fn request(&self, query: PageQuery) -> Task<Page<T>> {
        self(query)
    }
}

/// Calls the requester, turning a panic into a failed task
fn request_page<T: Send + 'static>(requester: &dyn PageRequester<T>, query: PageQuery) -> Task<Page<T>> {
    tracing::debug!(index = query.index, page_size = query.page_size, "requesting page");
    guarded(|| requester.request(query)).unwrap_or_else(Task::failed)
}

fn invalid_page_size() -> Error {
    Error::config("page_size", "page size must be greater than zero")
}

#[cfg(test)]
mod tests;
