use super::{Page, PageQuery, PageRequester, invalid_page_size, request_page};
use crate::error::{Error, Result};
use std::fmt;

/// A paged collection read one element at a time, blocking on page loads
///
/// `fetch_next` blocks the calling thread while a page is loading, so do not
/// drive this from inside an async runtime worker; use
/// [`PipelinedPages`](super::PipelinedPages) there.
///
/// The sequence length follows the most recently loaded page. A page load that
/// fails is reported once by `fetch_next` and ends the sequence.
pub struct EagerPages<T> {
    requester: Box<dyn PageRequester<T>>,
    page_size: usize,
    cursor: usize,
    known_total: usize,
    buffer: std::vec::IntoIter<T>,
}

impl<T: Send + 'static> EagerPages<T> {
    /// Loads the first page and returns a sequence positioned before it
    ///
    /// # Errors
    ///
    /// Fails if `page_size` is zero or the first page fails to load. A first
    /// page that resolves to absence yields an empty sequence.
    pub fn create<R>(requester: R, page_size: usize) -> Result<Self>
    where
        R: PageRequester<T> + 'static,
    {
        if page_size == 0 {
            return Err(invalid_page_size());
        }

        let mut pages = Self {
            requester: Box::new(requester),
            page_size,
            cursor: 0,
            known_total: usize::MAX,
            buffer: Vec::new().into_iter(),
        };
        pages.load(PageQuery::first(page_size))?;
        Ok(pages)
    }

    /// Returns true if another element can be fetched
    pub fn has_next(&self) -> bool {
        self.cursor < self.known_total
    }

    /// Returns the next element, loading its page first if needed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] past the end of the sequence, or the
    /// failure of the page load.
    pub fn fetch_next(&mut self) -> Result<T> {
        if !self.has_next() {
            return Err(Error::Exhausted);
        }

        if self.buffer.len() == 0 {
            self.load(PageQuery::at(self.cursor, self.page_size))?;
            if !self.has_next() {
                return Err(Error::Exhausted);
            }
        }

        match self.buffer.next() {
            Some(item) => {
                self.cursor += 1;
                Ok(item)
            }
            None => {
                self.known_total = self.cursor;
                Err(Error::Exhausted)
            }
        }
    }

    /// Index of the next element
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn load(&mut self, query: PageQuery) -> Result<()> {
        match request_page(self.requester.as_ref(), query).wait_optional() {
            Err(error) => {
                tracing::warn!(index = query.index, error = %error, "page failed to load");
                self.known_total = self.cursor;
                Err(error)
            }
            Ok(None) => {
                self.end_at(query.index);
                Ok(())
            }
            Ok(Some(page)) if page.items.is_empty() => {
                self.end_at(query.index);
                Ok(())
            }
            Ok(Some(page)) => {
                self.accept(&query, page);
                Ok(())
            }
        }
    }

    fn accept(&mut self, query: &PageQuery, page: Page<T>) {
        let total = page.sequence_len(query);
        if total != self.known_total && self.known_total != usize::MAX {
            tracing::debug!(previous = self.known_total, total, "remote total changed");
        }
        self.known_total = total;
        self.buffer = page.items.into_iter();
    }

    fn end_at(&mut self, index: usize) {
        tracing::debug!(index, "no page at index, sequence ends");
        self.known_total = index;
        self.buffer = Vec::new().into_iter();
    }
}

impl<T: Send + 'static> Iterator for EagerPages<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fetch_next() {
            Err(Error::Exhausted) => None,
            other => Some(other),
        }
    }
}

impl<T> fmt::Debug for EagerPages<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerPages")
            .field("page_size", &self.page_size)
            .field("cursor", &self.cursor)
            .field("known_total", &self.known_total)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
