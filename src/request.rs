//! Request descriptions: where to send, what to send, how to read the answer

use crate::error::Result;
use crate::pagination::{Page, PageQuery, Pagination};
use crate::transport::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

type Decoder<T> = Arc<dyn Fn(&[u8]) -> Result<T> + Send + Sync>;

/// The API wraps single results in a `data` field
#[derive(serde::Deserialize)]
struct Envelope<T> {
    data: T,
}

/// A page whose `data` field has some other shape than a list of elements
#[derive(serde::Deserialize)]
struct RawPage<P> {
    data: P,
    pagination: Pagination,
}

/// One API call and the decoder for its response body
///
/// The decoder runs only for 2xx responses that carry a body; a 404 or an
/// empty body becomes absence before decoding is attempted.
pub struct Request<T> {
    pub(crate) endpoint: String,
    pub(crate) method: Method,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) decoder: Decoder<T>,
}

impl<T: DeserializeOwned + Send + 'static> Request<T> {
    /// GET `endpoint`, decoding the `data` field of the response
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, Method::Get, None, decode_envelope)
    }

    /// POST `body` as JSON to `endpoint`, decoding the `data` field of the response
    ///
    /// # Errors
    ///
    /// Fails if `body` cannot be serialized.
    pub fn post<B: Serialize + ?Sized>(endpoint: impl Into<String>, body: &B) -> Result<Self> {
        Ok(Self::new(endpoint, Method::Post, Some(serde_json::to_vec(body)?), decode_envelope))
    }

    /// PUT `body` as JSON to `endpoint`, decoding the `data` field of the response
    ///
    /// # Errors
    ///
    /// Fails if `body` cannot be serialized.
    pub fn put<B: Serialize + ?Sized>(endpoint: impl Into<String>, body: &B) -> Result<Self> {
        Ok(Self::new(endpoint, Method::Put, Some(serde_json::to_vec(body)?), decode_envelope))
    }
}

impl<T: DeserializeOwned + Send + 'static> Request<Page<T>> {
    /// GET one page of the listing at `endpoint`
    ///
    /// The `index`/`pageSize` arguments of `query` are appended to the
    /// endpoint and the whole body is decoded as a [`Page`].
    pub fn page(endpoint: &str, query: PageQuery) -> Self {
        Self::new(query.append_to(endpoint), Method::Get, None, |raw: &[u8]| {
            Ok(serde_json::from_slice(raw)?)
        })
    }

    /// GET one page whose `data` field must be unpacked by `collector`
    ///
    /// For listings that do not return a plain array of elements, e.g.
    /// `{"data": {"exactMatches": [..]}, "pagination": {..}}`. The page's
    /// pagination metadata is kept as reported.
    pub fn page_with<P, C>(endpoint: &str, query: PageQuery, collector: C) -> Self
    where
        P: DeserializeOwned,
        C: Fn(P) -> Vec<T> + Send + Sync + 'static,
    {
        Self::new(query.append_to(endpoint), Method::Get, None, move |raw: &[u8]| {
            let RawPage { data, pagination } = serde_json::from_slice::<RawPage<P>>(raw)?;
            Ok(Page {
                items: collector(data),
                pagination,
            })
        })
    }
}

impl<T: Send + 'static> Request<T> {
    /// A request with a custom decoder
    pub fn new<D>(endpoint: impl Into<String>, method: Method, body: Option<Vec<u8>>, decoder: D) -> Self
    where
        D: Fn(&[u8]) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            endpoint: endpoint.into(),
            method,
            body,
            decoder: Arc::new(decoder),
        }
    }

    /// Endpoint path, including any query string
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Serialized request body, if any
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Decodes a response body
    pub fn decode(&self, raw: &[u8]) -> Result<T> {
        (self.decoder)(raw)
    }

    /// Applies `f` to every decoded value
    pub fn map<U, F>(self, f: F) -> Request<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let decoder = self.decoder;
        Request {
            endpoint: self.endpoint,
            method: self.method,
            body: self.body,
            decoder: Arc::new(move |raw: &[u8]| decoder(raw).map(&f)),
        }
    }
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            method: self.method,
            body: self.body.clone(),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

fn decode_envelope<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(raw)?;
    Ok(envelope.data)
}
