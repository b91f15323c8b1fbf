//! Blob storage for source images and cached derivatives.
//!
//! The server talks to two independent stores of the same shape: the source
//! store holds original images addressed by path, and the cache store holds
//! encoded derivatives addressed by `template/path`.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              ImageServer                │
//! └──────────┬──────────────────┬───────────┘
//!            │ source           │ cache
//!            ▼                  ▼
//! ┌─────────────────────────────────────────┐
//! │            BlobStore Trait              │
//! └──────┬──────────────┬──────────────┬────┘
//!        ▼              ▼              ▼
//!   ┌─────────┐    ┌─────────┐   ┌─────────────┐
//!   │ FsStore │    │ S3Store │   │ MemoryStore │
//!   └─────────┘    └─────────┘   └─────────────┘
//! ```

mod fs;
mod memory;
mod s3;

use std::str::FromStr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;

use crate::error::{ConfigError, StoreError};

pub use fs::FsStore;
pub use memory::{MemoryStore, StoreStats};
pub use s3::{create_s3_client, S3Store};

/// A stream of blob chunks.
pub type BlobStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// MIME type reported when neither content nor extension identify a blob.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Metadata for a stored blob, read without touching its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    /// Key the blob is stored under
    pub key: String,

    /// MIME type of the stored bytes
    pub mime_type: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time, second precision
    pub modified: DateTime<Utc>,
}

impl BlobMeta {
    /// Modification time as a unix timestamp.
    pub fn timestamp(&self) -> i64 {
        self.modified.timestamp()
    }
}

/// Key/value blob storage with create-or-replace writes.
///
/// Implementations must be safe for concurrent use; the server shares one
/// handle across all in-flight requests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check whether a blob exists under `key`.
    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Get the metadata of the blob under `key`.
    async fn get(&self, key: &str) -> Result<BlobMeta, StoreError>;

    /// Open a chunked read stream over the blob under `key`.
    async fn open(&self, key: &str) -> Result<BlobStream, StoreError>;

    /// Write `data` under `key`, replacing any existing blob.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Read the whole blob into memory.
    async fn read(&self, key: &str) -> Result<Bytes, StoreError> {
        let chunks: Vec<Bytes> = self.open(key).await?.try_collect().await?;
        let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Work out the MIME type of a blob from its leading bytes, falling back to
/// the key's extension.
pub fn detect_mime(key: &str, head: &[u8]) -> String {
    image::guess_format(head)
        .ok()
        .or_else(|| image::ImageFormat::from_path(key).ok())
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

// =============================================================================
// Store Location
// =============================================================================

/// Where a store lives, as given on the command line.
///
/// `s3://bucket/optional/prefix` selects S3, anything else is a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Local directory root
    Directory(std::path::PathBuf),

    /// S3 bucket with an optional key prefix
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
}

impl FromStr for StoreLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidLocation {
            location: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("location is empty"));
        }

        match s.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, prefix) = match rest.split_once('/') {
                    Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
                    None => (rest, ""),
                };
                if bucket.is_empty() {
                    return Err(invalid("bucket name is missing"));
                }
                Ok(StoreLocation::S3 {
                    bucket: bucket.to_string(),
                    prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                })
            }
            None => Ok(StoreLocation::Directory(s.into())),
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::Directory(path) => write!(f, "{}", path.display()),
            StoreLocation::S3 {
                bucket,
                prefix: Some(prefix),
            } => write!(f, "s3://{}/{}", bucket, prefix),
            StoreLocation::S3 { bucket, prefix: None } => write!(f, "s3://{}", bucket),
        }
    }
}
