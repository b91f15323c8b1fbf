//! image-rack - An on-demand image transformation proxy.
//!
//! This binary wires the stores, registers the built-in templates and starts
//! the HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_rack::{
    config::Config,
    create_s3_client,
    server::{create_router, ImageServer, RouterConfig},
    store::{BlobStore, FsStore, S3Store, StoreLocation},
    transform::{CropToAspect, Fit, Grayscale},
    ConfigError, StoreError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Source: {}", config.source);
    info!("  Cache: {}", config.cache);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    if config.uses_s3() {
        info!("  S3 region: {}", config.s3_region);
    }
    info!("  HTTP cache max-age: {}s", config.cache_max_age);

    let s3_client = if config.uses_s3() {
        Some(create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await)
    } else {
        None
    };

    let (source, cache) = match build_stores(&config, s3_client.as_ref()).await {
        Ok(stores) => stores,
        Err(e) => {
            error!("Failed to open stores: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match build_server(&config, source, cache) {
        Ok(server) => server,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("  Templates: {}", server.templates().names().join(", "));

    let router = create_router(server, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/thumb/<path>", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_rack=debug,tower_http=debug"
    } else {
        "image_rack=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

type Stores = (Arc<dyn BlobStore>, Arc<dyn BlobStore>);

async fn build_stores(
    config: &Config,
    s3_client: Option<&aws_sdk_s3::Client>,
) -> Result<Stores, String> {
    let source_location = config.source_location().map_err(|e| e.to_string())?;
    let cache_location = config.cache_location().map_err(|e| e.to_string())?;

    let source = open_store(source_location, s3_client, false)
        .await
        .map_err(|e| format!("source: {}", e))?;
    let cache = open_store(cache_location, s3_client, true)
        .await
        .map_err(|e| format!("cache: {}", e))?;

    Ok((source, cache))
}

/// Open a store; cache directories are created if missing.
async fn open_store(
    location: StoreLocation,
    s3_client: Option<&aws_sdk_s3::Client>,
    create: bool,
) -> Result<Arc<dyn BlobStore>, StoreError> {
    match location {
        StoreLocation::Directory(path) if create => Ok(Arc::new(FsStore::create(path).await?)),
        StoreLocation::Directory(path) => {
            if !path.is_dir() {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
            Ok(Arc::new(FsStore::new(path)))
        }
        StoreLocation::S3 { bucket, prefix } => {
            let client = s3_client
                .cloned()
                .ok_or_else(|| StoreError::Connection("S3 client not configured".to_string()))?;
            let store = S3Store::new(client, bucket);
            Ok(Arc::new(match prefix {
                Some(prefix) => store.with_prefix(prefix),
                None => store,
            }))
        }
    }
}

/// Create the image server with the built-in templates.
fn build_server(
    config: &Config,
    source: Arc<dyn BlobStore>,
    cache: Arc<dyn BlobStore>,
) -> Result<ImageServer, ConfigError> {
    let size = config.thumb_size;
    let mut server = ImageServer::new(source, cache);

    server.set_template("thumb", move || Fit::square(size))?;
    server.set_template("small", move || Fit::square(size.saturating_mul(2)))?;
    server.set_template("square", move || CropToAspect::new((1, 1), size))?;
    server.set_template("portrait", move || CropToAspect::new((4, 5), size))?;
    server.set_template("grayscale", || Grayscale)?;

    server.set_max_age(config.max_age()?);

    Ok(server)
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
