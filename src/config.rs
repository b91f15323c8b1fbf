//! Configuration for the image-rack binary.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `RACK_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use image_rack::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `RACK_HOST` - Server bind address (default: 0.0.0.0)
//! - `RACK_PORT` - Server port (default: 3000)
//! - `RACK_SOURCE` - Source images: directory or `s3://bucket/prefix` (required)
//! - `RACK_CACHE` - Derivative cache: directory or `s3://bucket/prefix` (required)
//! - `RACK_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `RACK_S3_REGION` - AWS region (default: us-east-1)
//! - `RACK_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 2678400)
//! - `RACK_THUMB_SIZE` - Edge length of the built-in templates (default: 150)
//! - `RACK_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use clap::Parser;

use crate::error::ConfigError;
use crate::server::MaxAge;
use crate::store::StoreLocation;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default HTTP cache max-age in seconds (31 days).
pub const DEFAULT_CACHE_MAX_AGE: i64 = 2_678_400;

/// Default edge length in pixels for the built-in templates.
pub const DEFAULT_THUMB_SIZE: u32 = 150;

// =============================================================================
// CLI Arguments
// =============================================================================

/// image-rack - An on-demand image transformation proxy.
///
/// Serves `/{template}/{path}` as a derivative of the source image at
/// `{path}`, computing it on first request and caching it afterwards.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-rack")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "RACK_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RACK_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Where source images live: a directory or s3://bucket/prefix.
    #[arg(long, env = "RACK_SOURCE")]
    pub source: String,

    /// Where derivatives are cached: a directory or s3://bucket/prefix.
    #[arg(long, env = "RACK_CACHE")]
    pub cache: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "RACK_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "RACK_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds (0 sends no-cache).
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "RACK_CACHE_MAX_AGE", allow_negative_numbers = true)]
    pub cache_max_age: i64,

    /// Edge length in pixels used by the built-in templates.
    #[arg(long, default_value_t = DEFAULT_THUMB_SIZE, env = "RACK_THUMB_SIZE")]
    pub thumb_size: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "RACK_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source_location()
            .map_err(|e| format!("{}. Set --source or RACK_SOURCE", e))?;
        self.cache_location()
            .map_err(|e| format!("{}. Set --cache or RACK_CACHE", e))?;

        self.max_age().map_err(|e| e.to_string())?;

        if self.thumb_size == 0 {
            return Err("thumb_size must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Parsed source store location.
    pub fn source_location(&self) -> Result<StoreLocation, ConfigError> {
        self.source.parse()
    }

    /// Parsed cache store location.
    pub fn cache_location(&self) -> Result<StoreLocation, ConfigError> {
        self.cache.parse()
    }

    pub fn max_age(&self) -> Result<MaxAge, ConfigError> {
        MaxAge::new(self.cache_max_age)
    }

    /// Whether either store lives in S3.
    pub fn uses_s3(&self) -> bool {
        [self.source_location(), self.cache_location()]
            .iter()
            .any(|location| matches!(location, Ok(StoreLocation::S3 { .. })))
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
