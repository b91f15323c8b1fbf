//! # image-rack
//!
//! An on-demand image transformation proxy.
//!
//! A request for `/{template}/{path}` returns a derivative of the source
//! image at `{path}`, produced by the named template. Derivatives are cached:
//! the first request computes one and writes it to the cache store after the
//! response is sent; later requests stream it straight from the cache, with
//! HTTP caching headers and conditional GET support.
//!
//! ## Features
//!
//! - **Cache-or-compute**: cached derivatives are streamed without decoding
//! - **Conditional GET**: `ETag`, `Last-Modified`, `If-None-Match`,
//!   `If-Modified-Since` and a configurable `Cache-Control` max-age
//! - **Pluggable storage**: local directories, S3 (or MinIO), or memory
//! - **Open template set**: any [`transform::Template`] under any name
//! - **Hooks**: replace the not-found and error responses
//!
//! ## Architecture
//!
//! - [`store`] - Blob storage for sources and derivatives
//! - [`transform`] - Templates, the template registry and the decode/encode pipeline
//! - [`server`] - Request engine, HTTP cache policy and the axum router
//! - [`config`] - CLI configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image_rack::{create_router, FsStore, Fit, ImageServer, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ImageServer::new(
//!         Arc::new(FsStore::new("./images")),
//!         Arc::new(FsStore::create("./cache").await?),
//!     );
//!     server.set_template("thumb", || Fit::square(150))?;
//!     server.set_http_cache_max_age(86_400)?;
//!
//!     let router = create_router(server, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod transform;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, ServeError, StoreError, TransformError};
pub use server::{
    create_router, create_shared_router, CachePolicy, Dispatch, ImageRequest, ImageResponse,
    ImageServer, MaxAge, RouterConfig,
};
pub use store::{create_s3_client, BlobMeta, BlobStore, FsStore, MemoryStore, S3Store, StoreLocation};
pub use transform::{
    CropToAspect, EncodedImage, Fit, Grayscale, ImageHandle, Template, TemplateRegistry,
    TransformPipeline,
};
