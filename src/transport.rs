//! The HTTP seam: one `perform` capability behind a trait
//!
//! Everything above this module speaks in endpoints, [`Method`]s and raw
//! [`RawResponse`]s. [`ReqwestTransport`] is the production implementation;
//! tests and alternative backends implement [`Transport`] directly.

use crate::config::{ClientConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::{is_retryable_status, with_retry};
use crate::scheduler::Scheduler;
use crate::task::Task;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// HTTP methods the API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST with a JSON body
    Post,
    /// PUT with a JSON body
    Put,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        };
        f.write_str(name)
    }
}

/// Status code and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, `None` when empty
    pub body: Option<Vec<u8>>,
}

impl RawResponse {
    /// Builds a response, treating an empty body as no body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status,
            body: (!body.is_empty()).then_some(body),
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 404
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// The body as text, for diagnostics
    pub fn body_text(&self) -> String {
        self.body
            .as_deref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .unwrap_or_default()
    }
}

/// Performs one HTTP exchange
///
/// `endpoint` is a path (with query string) relative to whatever base the
/// implementation is configured with. Non-2xx statuses are *not* failures at
/// this level; they come back in the [`RawResponse`].
pub trait Transport: Send + Sync {
    /// Sends `body` to `endpoint` with `method`
    fn perform(&self, endpoint: &str, method: Method, body: Option<Vec<u8>>) -> Task<RawResponse>;
}

/// [`Transport`] backed by a [`reqwest::Client`]
///
/// Sends `Accept: application/json`, the configured API key header, and a
/// JSON content type for bodies. Timeouts, refused connections and
/// 429/502/503/504 answers are retried per [`RetryConfig`]; when retries run
/// out those statuses surface as [`Error::Status`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
    scheduler: Scheduler,
}

impl ReqwestTransport {
    /// Builds a transport from `config`, running requests on `scheduler`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::Network`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, scheduler: Scheduler) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let name = HeaderName::from_bytes(config.api_key_header.as_bytes())
                .map_err(|e| Error::config("api_key_header", e.to_string()))?;
            let mut value = HeaderValue::from_str(key).map_err(|e| Error::config("api_key", e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("pagewise/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
            scheduler,
        })
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        let url = if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        };
        Ok(Url::parse(&url)?)
    }
}

impl Transport for ReqwestTransport {
    fn perform(&self, endpoint: &str, method: Method, body: Option<Vec<u8>>) -> Task<RawResponse> {
        let url = match self.url(endpoint) {
            Ok(url) => url,
            Err(error) => return Task::failed(error),
        };
        let client = self.client.clone();
        let retry = self.retry.clone();

        Task::spawn(&self.scheduler, async move {
            let response = with_retry(&retry, move || send(client.clone(), method, url.clone(), body.clone())).await?;
            Ok(Some(response))
        })
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

async fn send(client: reqwest::Client, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<RawResponse> {
    tracing::trace!(%method, %url, "sending request");

    let mut request = client.request(method.into(), url);
    if let Some(body) = body {
        request = request.header(CONTENT_TYPE, "application/json").body(body);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    let raw = RawResponse::new(status, bytes.to_vec());

    if is_retryable_status(status) {
        return Err(Error::Status {
            status,
            body: raw.body_text(),
        });
    }

    tracing::trace!(status, len = bytes.len(), "received response");
    Ok(raw)
}
