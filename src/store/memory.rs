//! In-memory blob store.
//!
//! Useful for local development and tests. Every call is counted so tests can
//! assert which code paths touched the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use futures_util::stream;

use super::{detect_mime, BlobMeta, BlobStore, BlobStream};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct MemoryBlob {
    data: Bytes,
    mime_type: String,
    modified: DateTime<Utc>,
}

/// Snapshot of how many times each store operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub has: usize,
    pub get: usize,
    pub open: usize,
    pub put: usize,
}

#[derive(Default)]
struct Counters {
    has: AtomicUsize,
    get: AtomicUsize,
    open: AtomicUsize,
    put: AtomicUsize,
}

/// A blob store backed by a `HashMap`.
///
/// Cloning shares the underlying map and counters. The map lock is never
/// held across an `.await`, so builder-style inserts can block on it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, MemoryBlob>>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, stamped with the current time.
    pub fn with_blob(self, key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.with_blob_modified_at(key, data, Utc::now())
    }

    /// Builder-style insert with an explicit modification time.
    pub fn with_blob_modified_at(
        self,
        key: impl Into<String>,
        data: impl Into<Bytes>,
        modified: DateTime<Utc>,
    ) -> Self {
        let key = key.into();
        let data = data.into();
        let blob = MemoryBlob {
            mime_type: detect_mime(&key, &data),
            data,
            modified: modified.trunc_subsecs(0),
        };
        self.write_blobs().insert(key, blob);
        self
    }

    fn read_blobs(&self) -> RwLockReadGuard<'_, HashMap<String, MemoryBlob>> {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_blobs(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryBlob>> {
        self.blobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes stored under `key`, without counting as a store access.
    pub async fn peek(&self, key: &str) -> Option<Bytes> {
        self.read_blobs().get(key).map(|b| b.data.clone())
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.read_blobs().len()
    }

    pub async fn is_empty(&self) -> bool {
        self.read_blobs().is_empty()
    }

    /// Call counts since creation or the last reset.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            has: self.counters.has.load(Ordering::SeqCst),
            get: self.counters.get.load(Ordering::SeqCst),
            open: self.counters.open.load(Ordering::SeqCst),
            put: self.counters.put.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        self.counters.has.store(0, Ordering::SeqCst);
        self.counters.get.store(0, Ordering::SeqCst);
        self.counters.open.store(0, Ordering::SeqCst);
        self.counters.put.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.counters.has.fetch_add(1, Ordering::SeqCst);
        Ok(self.read_blobs().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<BlobMeta, StoreError> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        let blobs = self.read_blobs();
        let blob = blobs
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(BlobMeta {
            key: key.to_string(),
            mime_type: blob.mime_type.clone(),
            size: blob.data.len() as u64,
            modified: blob.modified,
        })
    }

    async fn open(&self, key: &str) -> Result<BlobStream, StoreError> {
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        let data = self
            .read_blobs()
            .get(key)
            .map(|b| b.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(Box::pin(stream::iter([Ok(data)])))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        let blob = MemoryBlob {
            mime_type: detect_mime(key, &data),
            data,
            modified: Utc::now().trunc_subsecs(0),
        };
        self.write_blobs().insert(key.to_string(), blob);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
