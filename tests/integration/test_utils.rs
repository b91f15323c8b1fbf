//! Test utilities for integration tests.
//!
//! This module provides:
//! - Synthetic test images generated with the `image` crate
//! - Stores that fail or panic on demand
//! - Helpers for building servers and waiting on write-behind cache writes

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use image_rack::store::{BlobMeta, BlobStore, BlobStream, MemoryStore};
use image_rack::transform::Fit;
use image_rack::{ImageServer, StoreError};

/// Edge length of the "thumb" template used throughout the tests.
pub const THUMB_SIZE: u32 = 16;

// =============================================================================
// Test Images
// =============================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7) as u8, (y * 5) as u8, 120])
    }))
}

/// Create a PNG of the given size.
pub fn create_test_png(width: u32, height: u32) -> Bytes {
    let mut buf = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode test PNG");
    Bytes::from(buf)
}

/// Create a JPEG of the given size.
pub fn create_test_jpeg(width: u32, height: u32) -> Bytes {
    let mut buf = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .expect("Failed to encode test JPEG");
    Bytes::from(buf)
}

/// Check if data is a valid PNG (starts with the PNG signature).
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// Check if data is a valid JPEG (starts with SOI, ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

/// Decoded dimensions of an encoded image.
pub fn dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).expect("Failed to decode image");
    (img.width(), img.height())
}

// =============================================================================
// Servers
// =============================================================================

/// Build a server over memory stores with a "thumb" template.
pub fn build_server(source: &MemoryStore, cache: &MemoryStore) -> ImageServer {
    build_server_with(Arc::new(source.clone()), Arc::new(cache.clone()))
}

/// Build a server over arbitrary stores with a "thumb" template.
pub fn build_server_with(source: Arc<dyn BlobStore>, cache: Arc<dyn BlobStore>) -> ImageServer {
    let mut server = ImageServer::new(source, cache);
    server
        .set_template("thumb", || Fit::square(THUMB_SIZE))
        .expect("valid template name");
    server
}

/// Wait until `key` appears in `store`, polling for up to a second.
pub async fn wait_for_blob(store: &MemoryStore, key: &str) -> Option<Bytes> {
    for _ in 0..100 {
        if let Some(bytes) = store.peek(key).await {
            return Some(bytes);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

// =============================================================================
// Faulty Stores
// =============================================================================

/// How a [`FaultyStore`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every operation returns an S3 error
    Fail,
    /// Only writes fail; reads go to the inner store
    FailWrites,
    /// `has` panics
    Panic,
}

/// A store wrapper that fails or panics on demand.
#[derive(Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, fault: Fault) -> Self {
        Self { inner, fault }
    }

    fn check_read(&self) -> Result<(), StoreError> {
        match self.fault {
            Fault::Fail => Err(StoreError::S3("service unavailable".to_string())),
            Fault::Panic => panic!("store exploded"),
            Fault::FailWrites => Ok(()),
        }
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.check_read()?;
        self.inner.has(key).await
    }

    async fn get(&self, key: &str) -> Result<BlobMeta, StoreError> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn open(&self, key: &str) -> Result<BlobStream, StoreError> {
        self.check_read()?;
        self.inner.open(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        if self.fault != Fault::Panic {
            return Err(StoreError::S3("read-only".to_string()));
        }
        self.inner.put(key, data).await
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}
