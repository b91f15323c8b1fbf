//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    routes / handlers (axum)                     │
//! │                 GET /{template}/{path}, /health                 │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      gate::ImageServer                          │
//! │  ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌───────────────┐  │
//! │  │  route  │   │  policy  │   │ failure  │   │   response    │  │
//! │  │ (parse) │   │ (cache   │   │ (404/500 │   │ (Dispatch,    │  │
//! │  │         │   │ headers) │   │  hooks)  │   │  CacheWrite)  │  │
//! │  └─────────┘   └──────────┘   └──────────┘   └───────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod failure;
pub mod gate;
pub mod handlers;
pub mod policy;
pub mod response;
pub mod route;
pub mod routes;

pub use failure::{ErrorHook, FailureRouter, NotFoundHook, ERROR_BODY, NOT_FOUND_BODY};
pub use gate::ImageServer;
pub use handlers::{
    health_handler, image_handler, into_http_response, AppState, HealthResponse, WriteBehindBody,
};
pub use policy::{
    etag_for, http_date, is_not_modified, not_modified, parse_http_date, CachePolicy, MaxAge,
    DEFAULT_MAX_AGE,
};
pub use response::{CacheWrite, Dispatch, ImageRequest, ImageResponse, ResponseBody};
pub use route::{CacheKey, Route};
pub use routes::{create_router, create_shared_router, RouterConfig};
