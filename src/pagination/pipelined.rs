use super::{Page, PageQuery, PageRequester, invalid_page_size, request_page};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::task::{Outcome, Promise, Task};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A paged collection handing out one task per element without blocking
///
/// `next_task` returns immediately. An element whose page has not arrived yet
/// is handed out as a pending task, fulfilled when the page lands. The next
/// page is requested as soon as the last element of the requested range has
/// been handed out, so page loads overlap with the caller's processing.
///
/// The length learned from the first page is an upper bound: a later page
/// reporting a smaller total, resolving to absence, coming back empty, or
/// failing shortens the sequence for good. Pending tasks past the new end
/// resolve to absence; tasks inside a failed page fail with [`Error::Page`].
///
/// Elements are released in index order. A page that lands while an earlier
/// page is still in flight is held back until the earlier one settles, so a
/// failure never leaves delivered elements behind the new end.
///
/// Tasks handed out for pages that are never requested (because the caller
/// stopped pulling) stay pending. Nothing blocks on them.
pub struct PipelinedPages<T> {
    pipeline: Arc<Pipeline<T>>,
}

struct Pipeline<T> {
    requester: Box<dyn PageRequester<T>>,
    scheduler: Scheduler,
    state: Mutex<State<T>>,
}

struct State<T> {
    page_size: usize,
    /// Index of the next element to hand out
    cursor: usize,
    known_total: usize,
    /// End of the furthest page requested so far
    requested_end: usize,
    /// Start indices of requests that have not settled
    in_flight: BTreeSet<usize>,
    /// Arrived elements not yet handed out
    ready: BTreeMap<usize, T>,
    /// Handed out elements whose page has not arrived
    waiting: BTreeMap<usize, Promise<T>>,
}

impl<T: Send + 'static> PipelinedPages<T> {
    /// Fetches the first page on `scheduler` and completes with the sequence
    ///
    /// The returned task fails if `page_size` is zero or the first page fails.
    /// A first page that resolves to absence yields an empty sequence.
    pub fn create<R>(scheduler: &Scheduler, requester: R, page_size: usize) -> Task<Self>
    where
        R: PageRequester<T> + 'static,
    {
        if page_size == 0 {
            return Task::failed(invalid_page_size());
        }

        let requester: Box<dyn PageRequester<T>> = Box::new(requester);
        let owner = scheduler.clone();
        Task::spawn(scheduler, async move {
            let first = PageQuery::first(page_size);
            let outcome = request_page(requester.as_ref(), first).await?;

            let pipeline = Arc::new(Pipeline {
                requester,
                scheduler: owner,
                state: Mutex::new(State::new(page_size)),
            });
            let gap = pipeline.lock().arrive(first, Ok(outcome));
            if let Some(gap) = gap {
                pipeline.issue(gap);
            }

            Ok(Some(Self { pipeline }))
        })
    }

    /// Returns true if another element can be handed out
    ///
    /// A later page can still shorten the sequence, in which case tasks
    /// already handed out past the new end resolve to absence.
    pub fn has_next(&self) -> bool {
        let state = self.pipeline.lock();
        state.cursor < state.known_total
    }

    /// Hands out the task for the next element
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] past the end of the sequence.
    pub fn next_task(&mut self) -> Result<Task<T>> {
        let (task, prefetch) = {
            let mut state = self.pipeline.lock();
            if state.cursor >= state.known_total {
                return Err(Error::Exhausted);
            }

            let index = state.cursor;
            state.cursor += 1;

            let released = if index < state.frontier() {
                state.ready.remove(&index)
            } else {
                None
            };
            let task = match released {
                Some(item) => Task::of(item),
                None => {
                    let (promise, task) = Task::pending();
                    state.waiting.insert(index, promise);
                    task
                }
            };

            let prefetch = (state.cursor == state.requested_end && state.cursor < state.known_total)
                .then(|| state.reserve());
            (task, prefetch)
        };

        if let Some(query) = prefetch {
            self.pipeline.issue(query);
        }
        Ok(task)
    }

    /// Index of the next element
    pub fn position(&self) -> usize {
        self.pipeline.lock().cursor
    }
}

impl<T: Send + 'static> Iterator for PipelinedPages<T> {
    type Item = Task<T>;

    fn next(&mut self) -> Option<Task<T>> {
        self.next_task().ok()
    }
}

impl<T> fmt::Debug for PipelinedPages<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.pipeline.lock();
        f.debug_struct("PipelinedPages")
            .field("page_size", &state.page_size)
            .field("cursor", &state.cursor)
            .field("known_total", &state.known_total)
            .field("requested_end", &state.requested_end)
            .field("in_flight", &state.in_flight.len())
            .field("ready", &state.ready.len())
            .field("waiting", &state.waiting.len())
            .finish()
    }
}

impl<T> Pipeline<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Requests `query` and feeds the outcome back in on the scheduler
    fn issue(self: &Arc<Self>, query: PageQuery) {
        let pipeline = Arc::clone(self);
        request_page(self.requester.as_ref(), query).on_outcome(&self.scheduler, move |outcome| {
            let gap = pipeline.lock().arrive(query, outcome);
            if let Some(gap) = gap {
                pipeline.issue(gap);
            }
        });
    }
}

impl<T> State<T> {
    fn new(page_size: usize) -> Self {
        Self {
            page_size,
            cursor: 0,
            known_total: usize::MAX,
            requested_end: page_size,
            in_flight: BTreeSet::from([0]),
            ready: BTreeMap::new(),
            waiting: BTreeMap::new(),
        }
    }

    /// Marks the page at the cursor as requested
    fn reserve(&mut self) -> PageQuery {
        let query = PageQuery::at(self.cursor, self.page_size);
        self.requested_end = query.end();
        self.in_flight.insert(query.index);
        query
    }

    /// Applies a page outcome, returning a request for any gap it left
    fn arrive(&mut self, query: PageQuery, outcome: Outcome<Page<T>>) -> Option<PageQuery> {
        self.in_flight.remove(&query.index);
        let gap = match outcome {
            Err(error) => {
                self.fail(query, error);
                None
            }
            Ok(Some(page)) if !page.items.is_empty() => self.accept(query, page),
            Ok(_) => {
                self.truncate(query.index);
                None
            }
        };
        self.release();
        gap
    }

    /// Everything below this index has settled and can be handed over
    fn frontier(&self) -> usize {
        self.in_flight
            .first()
            .copied()
            .unwrap_or(usize::MAX)
            .min(self.known_total)
    }

    /// Fulfils waiting tasks whose elements have arrived below the frontier
    fn release(&mut self) {
        let later = self.waiting.split_off(&self.frontier());
        let settled = std::mem::replace(&mut self.waiting, later);
        for (index, promise) in settled {
            match self.ready.remove(&index) {
                Some(item) => promise.fulfill(item),
                None => {
                    self.waiting.insert(index, promise);
                }
            }
        }
    }

    fn accept(&mut self, query: PageQuery, page: Page<T>) -> Option<PageQuery> {
        let covered = query.index + page.items.len();
        self.truncate(page.sequence_len(&query));

        for (index, item) in (query.index..).zip(page.items) {
            if index >= self.known_total {
                break;
            }
            if index >= self.cursor || self.waiting.contains_key(&index) {
                self.ready.insert(index, item);
            }
        }

        // A short page that does not reach the end leaves a hole to fill
        let end = query.end().min(self.known_total);
        let gap = (covered < end).then(|| PageQuery::at(covered, end - covered));
        if let Some(gap) = gap {
            self.in_flight.insert(gap.index);
        }
        gap
    }

    fn fail(&mut self, query: PageQuery, error: Error) {
        tracing::warn!(index = query.index, error = %error, "page failed to load, sequence ends");

        let source = Arc::new(error);
        for (index, promise) in self.waiting.split_off(&query.index) {
            if index < query.end() {
                promise.fail(Error::Page {
                    index: query.index,
                    source: Arc::clone(&source),
                });
            } else {
                promise.fulfill_absent();
            }
        }
        self.truncate(query.index);
    }

    /// Ends the sequence at `at` if that is shorter than what is known
    fn truncate(&mut self, at: usize) {
        if at >= self.known_total {
            return;
        }
        if self.known_total != usize::MAX {
            tracing::debug!(previous = self.known_total, total = at, "sequence shortened");
        }
        self.known_total = at;

        for (_, promise) in self.waiting.split_off(&at) {
            promise.fulfill_absent();
        }
        drop(self.ready.split_off(&at));
    }
}
