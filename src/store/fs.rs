//! Filesystem blob store.
//!
//! Keys are relative paths under a root directory. Keys that would resolve
//! outside the root (absolute paths, `..` components) or that no file can
//! have (NUL bytes, over-long names, a path through a regular file) never
//! match a blob.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use futures_util::stream;
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::{detect_mime, BlobMeta, BlobStore, BlobStream};
use crate::error::StoreError;

/// Chunk size for streamed reads.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Number of leading bytes inspected for MIME detection.
const SNIFF_LEN: usize = 32;

/// Longest single path component accepted (`NAME_MAX` on common filesystems).
const MAX_NAME_LEN: usize = 255;

/// Raw OS error for a path that runs through a regular file.
#[cfg(unix)]
const ENOTDIR: i32 = 20;
#[cfg(windows)]
const ENOTDIR: i32 = 267;
#[cfg(not(any(unix, windows)))]
const ENOTDIR: i32 = -1;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store over an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store, creating the root directory if needed.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root.display().to_string(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path under the root.
    ///
    /// Returns `None` for keys that are empty or would escape the root.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        if key.contains('\0') {
            return None;
        }

        let relative = Path::new(key);
        let mut path = self.root.clone();
        let mut depth = 0;

        for component in relative.components() {
            match component {
                Component::Normal(part) if part.len() > MAX_NAME_LEN => return None,
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        (depth > 0).then_some(path)
    }

    fn resolve_existing(&self, key: &str) -> Result<PathBuf, StoreError> {
        self.resolve(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

/// Whether an I/O error means there is no file at the path.
fn is_missing(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::InvalidInput
    ) || err.raw_os_error() == Some(ENOTDIR)
}

fn io_error(key: &str, err: std::io::Error) -> StoreError {
    if is_missing(&err) {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Io {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Read the next chunk of a file, or `None` at end of file.
async fn read_chunk(
    mut file: fs::File,
    key: String,
) -> Result<Option<(Bytes, (fs::File, String))>, StoreError> {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let read = file.read(&mut buf).await.map_err(|e| io_error(&key, e))?;
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some((Bytes::from(buf), (file, key))))
}

#[async_trait]
impl BlobStore for FsStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        let Some(path) = self.resolve(key) else {
            return Ok(false);
        };

        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }

    async fn get(&self, key: &str) -> Result<BlobMeta, StoreError> {
        let path = self.resolve_existing(key)?;

        let meta = fs::metadata(&path).await.map_err(|e| io_error(key, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let modified: DateTime<Utc> = meta
            .modified()
            .map_err(|e| io_error(key, e))?
            .into();

        let mut head = [0u8; SNIFF_LEN];
        let mut file = fs::File::open(&path).await.map_err(|e| io_error(key, e))?;
        let read = file.read(&mut head).await.map_err(|e| io_error(key, e))?;

        Ok(BlobMeta {
            key: key.to_string(),
            mime_type: detect_mime(key, &head[..read]),
            size: meta.len(),
            modified: modified.trunc_subsecs(0),
        })
    }

    async fn open(&self, key: &str) -> Result<BlobStream, StoreError> {
        let path = self.resolve_existing(key)?;
        let file = fs::File::open(&path).await.map_err(|e| io_error(key, e))?;
        let key = key.to_string();

        let chunks = stream::try_unfold((file, key), |(file, key)| read_chunk(file, key));

        Ok(Box::pin(chunks))
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self
            .resolve(key)
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, e))?;
        }

        // Write to a sibling temp file and rename, so readers never see a
        // partially written blob.
        let suffix = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(format!(".{}.{}.tmp", std::process::id(), suffix));
        let temp_path = path.with_file_name(temp_name);

        if let Err(e) = fs::write(&temp_path, &data).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(io_error(key, e));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(io_error(key, e));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}
