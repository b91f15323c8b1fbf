//! The cache-or-compute request engine.
//!
//! # Flow
//!
//! ```text
//!              ┌──────────────┐
//!  request ───►│ Route::parse │── invalid ──────────────────────► not found
//!              └──────┬───────┘
//!                     ▼
//!              ┌──────────────┐  hit   ┌─────────────────┐
//!              │ cache.has()  │───────►│ conditional GET │── match ──► 304
//!              └──────┬───────┘        └────────┬────────┘
//!                miss │                         └────────────────────► 200 (stream)
//!                     ▼
//!              ┌──────────────┐  miss
//!              │ source.has() │────────────────────────────────────► not found
//!              └──────┬───────┘
//!                 hit ▼
//!              ┌──────────────┐        ┌──────────────┐
//!              │  transform   │───────►│ 200 (bytes)  │──► cache write after send
//!              └──────────────┘        └──────────────┘
//! ```
//!
//! Any store or transform fault on the way ends in the error hook.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{debug, error, info};

use super::failure::FailureRouter;
use super::policy::{is_not_modified, not_modified, CachePolicy, MaxAge};
use super::response::{CacheWrite, Dispatch, ImageRequest, ImageResponse, ResponseBody};
use super::route::{CacheKey, Route};
use crate::error::{ConfigError, ServeError, StoreError};
use crate::store::{BlobStore, FALLBACK_MIME_TYPE};
use crate::transform::{Template, TemplateRegistry, TransformPipeline};

/// Serves derivatives of source images, computing and caching them on
/// demand.
///
/// Configure with the setters before serving; afterwards share it behind an
/// `Arc` and call [`run`](Self::run) per request.
pub struct ImageServer {
    source: Arc<dyn BlobStore>,
    cache: Arc<dyn BlobStore>,
    templates: TemplateRegistry,
    policy: CachePolicy,
    failures: FailureRouter,
}

impl ImageServer {
    /// Create a server reading originals from `source` and storing
    /// derivatives in `cache`.
    pub fn new(source: Arc<dyn BlobStore>, cache: Arc<dyn BlobStore>) -> Self {
        Self {
            source,
            cache,
            templates: TemplateRegistry::new(),
            policy: CachePolicy::default(),
            failures: FailureRouter::new(),
        }
    }

    /// Register a template under `name`, replacing any previous one.
    pub fn set_template<F, T>(&mut self, name: impl Into<String>, factory: F) -> Result<(), ConfigError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Template + 'static,
    {
        self.templates.register(name, factory)
    }

    /// Set the HTTP cache max-age in seconds. `0` disables caching headers.
    pub fn set_http_cache_max_age(&mut self, seconds: i64) -> Result<(), ConfigError> {
        self.policy.set_max_age(MaxAge::new(seconds)?);
        Ok(())
    }

    pub fn set_max_age(&mut self, max_age: MaxAge) {
        self.policy.set_max_age(max_age);
    }

    pub fn http_cache_max_age(&self) -> MaxAge {
        self.policy.max_age()
    }

    /// Replace the not-found response.
    pub fn set_not_found<F>(&mut self, hook: F)
    where
        F: Fn(ImageResponse) -> ImageResponse + Send + Sync + 'static,
    {
        self.failures.set_not_found(hook);
    }

    /// Replace the error response.
    pub fn set_error<F>(&mut self, hook: F)
    where
        F: Fn(ImageResponse, &ServeError) -> ImageResponse + Send + Sync + 'static,
    {
        self.failures.set_error(hook);
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn failures(&self) -> &FailureRouter {
        &self.failures
    }

    pub fn source(&self) -> &Arc<dyn BlobStore> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<dyn BlobStore> {
        &self.cache
    }

    /// Handle one request.
    ///
    /// Never fails: misses resolve to the not-found response and faults to
    /// the error response. A freshly computed derivative comes back with a
    /// [`CacheWrite`] the caller must run after sending the response.
    pub async fn run(&self, request: &ImageRequest) -> Dispatch {
        let route = Route::parse(request.path_and_query());
        let Some(key) = route.resolve(&self.templates) else {
            debug!(path = %request.uri.path(), "Not an image route");
            return Dispatch::respond(self.failures.not_found());
        };

        match self.dispatch(request, &key).await {
            Ok(Some(dispatch)) => dispatch,
            Ok(None) => {
                debug!(key = %key, "Source image not found");
                Dispatch::respond(self.failures.not_found())
            }
            Err(err) => {
                error!(key = %key, error = %err, "Failed to serve image");
                Dispatch::respond(self.failures.error(&err))
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
    ) -> Result<Option<Dispatch>, ServeError> {
        if let Some(response) = self.serve_from_cache(request, key).await? {
            return Ok(Some(Dispatch::respond(response)));
        }
        self.serve_from_source(request, key).await
    }

    /// Serve a cached derivative, or `None` on a cache miss.
    ///
    /// The cached bytes are never decoded. A conditional request that
    /// matches gets a 304 without the blob being opened.
    pub async fn serve_from_cache(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
    ) -> Result<Option<ImageResponse>, ServeError> {
        if !self.cache.has(key.as_str()).await? {
            return Ok(None);
        }

        let meta = match self.cache.get(key.as_str()).await {
            Ok(meta) => meta,
            // Removed between has() and get()
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let headers = self.policy.headers_for(meta.modified, key.as_str());

        if is_not_modified(&request.method, &request.headers, &headers) {
            debug!(key = %key, "Cached derivative not modified");
            let mut response = ImageResponse::new(StatusCode::NOT_MODIFIED);
            response.headers = not_modified(headers);
            return Ok(Some(response));
        }

        let mut response = ImageResponse::new(StatusCode::OK);
        response.headers = headers;
        set_content_headers(&mut response.headers, &meta.mime_type, meta.size);

        if request.method != Method::HEAD {
            response.body = ResponseBody::Stream(self.cache.open(key.as_str()).await?);
        }

        debug!(key = %key, size = meta.size, "Serving cached derivative");
        Ok(Some(response))
    }

    /// Compute a derivative from the source image, or `None` if there is no
    /// source image at the route's path.
    pub async fn serve_from_source(
        &self,
        request: &ImageRequest,
        key: &CacheKey,
    ) -> Result<Option<Dispatch>, ServeError> {
        if !self.source.has(key.path()).await? {
            return Ok(None);
        }

        let factory = self
            .templates
            .get(key.template())
            .ok_or_else(|| ServeError::UnknownTemplate(key.template().to_string()))?;
        let template = factory();

        let source = self.source.read(key.path()).await?;
        let source_size = source.len();
        let encoded = TransformPipeline::run_blocking(template, source).await?;

        info!(
            key = %key,
            source_size,
            size = encoded.len(),
            mime_type = %encoded.mime_type,
            "Computed derivative"
        );

        let now = Utc::now().trunc_subsecs(0);
        let mut response = ImageResponse::new(StatusCode::OK);
        response.headers = self.policy.headers_for(now, key.as_str());
        set_content_headers(&mut response.headers, &encoded.mime_type, encoded.len() as u64);

        if request.method != Method::HEAD {
            response.body = ResponseBody::Full(encoded.bytes.clone());
        }

        let cache = Arc::clone(&self.cache);
        let cache_key = key.as_str().to_string();
        let bytes = encoded.bytes;
        let cache_write = CacheWrite::new(key.as_str(), async move {
            cache.put(&cache_key, bytes).await
        });

        Ok(Some(Dispatch {
            response,
            cache_write: Some(cache_write),
        }))
    }
}

impl std::fmt::Debug for ImageServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageServer")
            .field("source", &self.source.name())
            .field("cache", &self.cache.name())
            .field("templates", &self.templates)
            .field("policy", &self.policy)
            .field("failures", &self.failures)
            .finish()
    }
}

fn set_content_headers(headers: &mut HeaderMap, mime_type: &str, size: u64) {
    let content_type = HeaderValue::from_str(mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_MIME_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
}
