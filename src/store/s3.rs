//! S3-backed blob store.
//!
//! Works with AWS S3 and S3-compatible services (MinIO, etc.). Keys are
//! stored under an optional prefix inside the bucket.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream;
use tracing::warn;

use super::{detect_mime, BlobMeta, BlobStore, BlobStream, FALLBACK_MIME_TYPE};
use crate::error::StoreError;

/// Blob store over an S3 bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    /// Create a store for the given bucket.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: None,
        }
    }

    /// Store every key under `prefix/` inside the bucket.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Full object key for a store key.
    pub fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn identifier(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }

    async fn head(
        &self,
        key: &str,
    ) -> Result<Option<aws_sdk_s3::operation::head_object::HeadObjectOutput>, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(head) => Ok(Some(head)),
            Err(e) => {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);

                // Some S3-compatible services only signal a missing key
                // through the raw status code.
                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    Ok(None)
                } else {
                    Err(StoreError::S3(e.to_string()))
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.head(key).await?.is_some())
    }

    async fn get(&self, key: &str) -> Result<BlobMeta, StoreError> {
        let head = self
            .head(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.identifier(key)))?;

        let modified = last_modified_secs(head.last_modified()).unwrap_or_else(|| {
            warn!(key = %self.identifier(key), "Object has no Last-Modified, using the epoch");
            DateTime::UNIX_EPOCH
        });

        let mime_type = head
            .content_type()
            .filter(|ct| !ct.is_empty() && *ct != FALLBACK_MIME_TYPE)
            .map(str::to_string)
            .unwrap_or_else(|| detect_mime(key, &[]));

        Ok(BlobMeta {
            key: key.to_string(),
            mime_type,
            size: head.content_length().unwrap_or(0).max(0) as u64,
            modified,
        })
    }

    async fn open(&self, key: &str) -> Result<BlobStream, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if is_no_such_key {
                    StoreError::NotFound(self.identifier(key))
                } else {
                    StoreError::S3(e.to_string())
                }
            })?;

        let chunks = stream::unfold(resp.body, |mut body| async move {
            body.next().await.map(|chunk| {
                (
                    chunk.map_err(|e| StoreError::Connection(e.to_string())),
                    body,
                )
            })
        });

        Ok(Box::pin(chunks))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let content_type = detect_mime(key, &data);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StoreError::S3(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}

/// Second-precision modification time from an object's `Last-Modified`.
///
/// `None` when the header is absent or out of range.
fn last_modified_secs(
    last_modified: Option<&aws_sdk_s3::primitives::DateTime>,
) -> Option<DateTime<Utc>> {
    last_modified.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), 0))
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
