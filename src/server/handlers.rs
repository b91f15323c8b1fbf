//! Axum handlers for the image server.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /{template}/{path}` - Serve a derivative (router fallback)

use std::any::Any;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    Json,
};
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use serde::Serialize;
use tracing::{error, warn};

use super::gate::ImageServer;
use super::response::{CacheWrite, Dispatch, ImageRequest, ImageResponse, ResponseBody};
use crate::error::ServeError;
use crate::transform::panic_message;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<ImageServer>,
}

impl AppState {
    pub fn new(server: ImageServer) -> Self {
        Self {
            server: Arc::new(server),
        }
    }

    pub fn from_shared(server: Arc<ImageServer>) -> Self {
        Self { server }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Response from the health check endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve `/{template}/{path}`.
///
/// Used as the router fallback so every path that is not a fixed endpoint
/// reaches the image server, including ones it will reject as not found.
pub async fn image_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let request = ImageRequest::from_parts(&parts);

    let dispatch = state.server.run(&request).await;
    into_http_response(dispatch)
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Response for a panic caught by the router, built by the error hook.
pub fn panic_response(server: &ImageServer, payload: Box<dyn Any + Send + 'static>) -> Response {
    let err = ServeError::Panicked {
        message: panic_message(payload),
    };
    error!(error = %err, "Request handler panicked");
    into_http_response(Dispatch::respond(server.failures().error(&err)))
}

// =============================================================================
// Response Conversion
// =============================================================================

/// Convert a dispatch into an axum response.
///
/// A pending cache write rides along in the body and starts once the server
/// is done with the body, i.e. after the response has been written.
pub fn into_http_response(dispatch: Dispatch) -> Response {
    let (response, cache_write) = dispatch.into_parts();
    let ImageResponse {
        status,
        headers,
        body,
    } = response;

    let body = match (body, cache_write) {
        (ResponseBody::Empty, Some(write)) => Body::new(WriteBehindBody::new(Bytes::new(), write)),
        (ResponseBody::Full(bytes), Some(write)) => Body::new(WriteBehindBody::new(bytes, write)),
        (body, write) => {
            if let Some(write) = write {
                spawn_cache_write(write);
            }
            match body {
                ResponseBody::Empty => Body::empty(),
                ResponseBody::Full(bytes) => Body::from(bytes),
                ResponseBody::Stream(stream) => Body::from_stream(stream),
            }
        }
    };

    let mut http_response = Response::new(body);
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;
    http_response
}

fn spawn_cache_write(write: CacheWrite) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(write.execute());
        }
        Err(_) => warn!(key = write.key(), "No runtime available for cache write"),
    }
}

/// An in-memory body that launches a cache write when dropped.
pub struct WriteBehindBody {
    data: Option<Bytes>,
    write: Option<CacheWrite>,
}

impl WriteBehindBody {
    pub fn new(data: Bytes, write: CacheWrite) -> Self {
        Self {
            data: (!data.is_empty()).then_some(data),
            write: Some(write),
        }
    }
}

impl http_body::Body for WriteBehindBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.data.take().map(|data| Ok(Frame::data(data))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.data.as_ref().map_or(0, |data| data.len() as u64))
    }
}

impl Drop for WriteBehindBody {
    fn drop(&mut self) {
        if let Some(write) = self.write.take() {
            spawn_cache_write(write);
        }
    }
}
