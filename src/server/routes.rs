//! Router configuration for the image server.
//!
//! # Route Structure
//!
//! ```text
//! /health                 - Health check
//! /{template}/{path}      - Derivative of the source image at {path} (fallback)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use image_rack::server::{create_router, ImageServer, RouterConfig};
//! use image_rack::store::FsStore;
//! use image_rack::transform::Fit;
//!
//! let mut server = ImageServer::new(
//!     Arc::new(FsStore::new("/srv/images")),
//!     Arc::new(FsStore::new("/var/cache/images")),
//! );
//! server.set_template("thumb", || Fit::square(150))?;
//!
//! let router = create_router(server, RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::Method;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::gate::ImageServer;
use super::handlers::{health_handler, image_handler, panic_response, AppState};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default CORS allows any origin and tracing is enabled.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router for a configured image server.
pub fn create_router(server: ImageServer, config: RouterConfig) -> Router {
    create_shared_router(Arc::new(server), config)
}

/// Create the application router for an image server that is shared
/// elsewhere too.
///
/// Panics in any handler are caught and answered through the server's error
/// hook.
pub fn create_shared_router(server: Arc<ImageServer>, config: RouterConfig) -> Router {
    let cors = build_cors_layer(&config);
    let panic_server = Arc::clone(&server);

    let router = Router::new()
        .route("/health", get(health_handler))
        .fallback(image_handler)
        .with_state(AppState::from_shared(server))
        .layer(CatchPanicLayer::custom(move |payload: Box<dyn std::any::Any + Send + 'static>| {
            panic_response(&panic_server, payload)
        }))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, IF_NONE_MATCH, IF_MODIFIED_SINCE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
