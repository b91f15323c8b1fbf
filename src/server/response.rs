//! Transport-neutral request and response types for the image server.
//!
//! [`ImageServer::run`](super::ImageServer::run) takes an [`ImageRequest`]
//! and returns a [`Dispatch`]: the response to send plus an optional
//! deferred cache write that must only run after the response went out.

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::BlobStream;

// =============================================================================
// Request
// =============================================================================

/// The parts of an HTTP request the server looks at.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl ImageRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// A GET request for `uri` with no headers.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri, HeaderMap::new())
    }

    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }

    /// Builder-style header insert.
    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path and query, as routed on.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }
}

// =============================================================================
// Response
// =============================================================================

/// Response body.
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    /// Chunks streamed from a store
    Stream(BlobStream),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        match self {
            ResponseBody::Empty => true,
            ResponseBody::Full(bytes) => bytes.is_empty(),
            ResponseBody::Stream(_) => false,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        ResponseBody::Full(bytes)
    }
}

/// A response produced by the image server or a failure hook.
#[derive(Debug)]
pub struct ImageResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ImageResponse {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// `text/html` response with a static body.
    pub fn html(status: StatusCode, body: &'static str) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        response.body = ResponseBody::Full(Bytes::from_static(body.as_bytes()));
        response
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    /// The body bytes if it is held in memory.
    pub fn full_body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(bytes),
            _ => None,
        }
    }
}

// =============================================================================
// Cache Write
// =============================================================================

/// A deferred write of a freshly computed derivative into the cache store.
pub struct CacheWrite {
    key: String,
    write: BoxFuture<'static, Result<(), StoreError>>,
}

impl CacheWrite {
    pub fn new<F>(key: impl Into<String>, write: F) -> Self
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            write: Box::pin(write),
        }
    }

    /// Cache key being written.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Perform the write. Failures are logged, never returned: the response
    /// has already been sent when this runs.
    pub async fn execute(self) {
        match self.write.await {
            Ok(()) => debug!(key = %self.key, "Wrote derivative to cache"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to write derivative to cache"),
        }
    }
}

impl fmt::Debug for CacheWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWrite").field("key", &self.key).finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Outcome of one request: the response and, for freshly computed
/// derivatives, the cache write to run after the response is delivered.
#[derive(Debug)]
pub struct Dispatch {
    pub response: ImageResponse,
    pub cache_write: Option<CacheWrite>,
}

impl Dispatch {
    /// A response with nothing to write afterwards.
    pub fn respond(response: ImageResponse) -> Self {
        Self {
            response,
            cache_write: None,
        }
    }

    pub fn into_parts(self) -> (ImageResponse, Option<CacheWrite>) {
        (self.response, self.cache_write)
    }

    /// Deliver the response, then run the cache write.
    pub async fn send_with<F, Fut, T>(self, deliver: F) -> T
    where
        F: FnOnce(ImageResponse) -> Fut,
        Fut: Future<Output = T>,
    {
        let (response, cache_write) = self.into_parts();
        let delivered = deliver(response).await;
        if let Some(write) = cache_write {
            write.execute().await;
        }
        delivered
    }
}
