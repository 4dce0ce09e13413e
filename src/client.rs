//! API client: runs [`Request`]s through a [`Transport`] and turns listings
//! into paginated sequences.

use crate::config::{ClientConfig, default_page_size};
use crate::error::{Error, Result};
use crate::pagination::{EagerPages, Page, PageQuery, PipelinedPages};
use crate::request::Request;
use crate::scheduler::Scheduler;
use crate::task::{Outcome, Task};
use crate::transport::{RawResponse, ReqwestTransport, Transport};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// Entry point for talking to the API
///
/// Cloning is cheap; clones share the transport and the scheduler.
///
/// # Example
///
/// ```no_run
/// use pagewise::{Client, ClientConfig, Page, PageQuery, Request};
///
/// # fn main() -> pagewise::Result<()> {
/// let mut config = ClientConfig::new("https://api.example.com");
/// config.api_key = Some("secret".into());
/// let client = Client::from_config(&config)?;
///
/// let titles = client.pages_eager(|query: PageQuery| {
///     Request::<Page<serde_json::Value>>::page("/v1/mods/search?gameId=432", query)
/// })?;
/// for title in titles {
///     println!("{}", title?["name"]);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    scheduler: Scheduler,
    page_size: usize,
}

impl Client {
    /// Builds a client with its own scheduler from `config.scheduler`
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the runtime cannot start.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let scheduler = Scheduler::new(&config.scheduler)?;
        Self::new(config, scheduler)
    }

    /// Builds a reqwest-backed client running on `scheduler`
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: &ClientConfig, scheduler: Scheduler) -> Result<Self> {
        let transport = ReqwestTransport::new(config, scheduler.clone())?;
        tracing::debug!(base_url = %config.base_url, page_size = config.page_size, "created API client");
        Ok(Self {
            transport: Arc::new(transport),
            scheduler,
            page_size: config.page_size,
        })
    }

    /// Builds a client on top of any [`Transport`]
    pub fn with_transport(transport: impl Transport + 'static, scheduler: Scheduler) -> Self {
        Self {
            transport: Arc::new(transport),
            scheduler,
            page_size: default_page_size(),
        }
    }

    /// Sets the page size used by paginated listings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero page size.
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::config("page_size", "page size must be positive"));
        }
        self.page_size = page_size;
        Ok(self)
    }

    /// The scheduler requests and callbacks run on
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Page size used by paginated listings
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Sends `request` and decodes the answer
    ///
    /// A 404 or an empty body completes with absence. Any other non-2xx status
    /// fails with [`Error::Status`]; a body that does not decode fails with
    /// [`Error::Serialization`].
    pub fn execute<T: Send + 'static>(&self, request: Request<T>) -> Task<T> {
        let Request {
            endpoint,
            method,
            body,
            decoder,
        } = request;

        self.transport
            .perform(&endpoint, method, body)
            .flat_map(move |raw| Task::from_outcome(interpret(&endpoint, raw, |bytes| decoder(bytes))))
    }

    /// GET `endpoint`, decoding the `data` field of the response
    pub fn get<T: DeserializeOwned + Send + 'static>(&self, endpoint: &str) -> Task<T> {
        self.execute(Request::get(endpoint))
    }

    /// Walks a listing element by element, blocking on page loads
    ///
    /// `request` builds the request for each page. See [`EagerPages`].
    /// Listings whose `data` is not a plain array can be read with
    /// [`Request::page_with`].
    ///
    /// # Errors
    ///
    /// Fails if the first page fails to load.
    pub fn pages_eager<T, F>(&self, request: F) -> Result<EagerPages<T>>
    where
        T: Send + 'static,
        F: Fn(PageQuery) -> Request<Page<T>> + Send + Sync + 'static,
    {
        EagerPages::create(self.page_requester(request), self.page_size)
    }

    /// Walks a listing with one task per element, prefetching pages
    ///
    /// `request` builds the request for each page, as for
    /// [`pages_eager`](Client::pages_eager). See [`PipelinedPages`].
    pub fn pages_pipelined<T, F>(&self, request: F) -> Task<PipelinedPages<T>>
    where
        T: Send + 'static,
        F: Fn(PageQuery) -> Request<Page<T>> + Send + Sync + 'static,
    {
        PipelinedPages::create(&self.scheduler, self.page_requester(request), self.page_size)
    }

    fn page_requester<T, F>(&self, request: F) -> impl Fn(PageQuery) -> Task<Page<T>> + Send + Sync + 'static
    where
        T: Send + 'static,
        F: Fn(PageQuery) -> Request<Page<T>> + Send + Sync + 'static,
    {
        let client = self.clone();
        move |query: PageQuery| client.execute(request(query))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("scheduler", &self.scheduler)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Maps a raw response onto a task outcome
fn interpret<T>(endpoint: &str, raw: RawResponse, decode: impl FnOnce(&[u8]) -> Result<T>) -> Outcome<T> {
    if raw.is_not_found() {
        tracing::debug!(endpoint, "not found");
        return Ok(None);
    }
    if !raw.is_success() {
        tracing::debug!(endpoint, status = raw.status, "unexpected status");
        return Err(Error::Status {
            status: raw.status,
            body: raw.body_text(),
        });
    }
    match raw.body.as_deref() {
        None => Ok(None),
        Some(bytes) => decode(bytes).map(Some),
    }
}
