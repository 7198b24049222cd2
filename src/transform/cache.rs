// src/transform/cache.rs

//! Memoisation of cacheable transforms.
//!
//! The key of an entry is the blake3 hash of the transform identity and the
//! input content hash, so entries are only invalidated by content changes
//! (or a different transform configuration).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use blake3::Hasher;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::errors::TransformError;
use crate::transform::{Asset, Transform};

/// Directory (relative to the project root) used by [`FileTransformCache`].
pub const CACHE_DIR: &str = ".assetpipe/cache";

/// Hex blake3 digest of `contents`.
pub fn content_hash(contents: &[u8]) -> String {
    blake3::hash(contents).to_hex().to_string()
}

/// Cache key for running `transform_id` over content with hash `input_hash`.
pub fn cache_key(transform_id: &str, input_hash: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(transform_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(input_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Abstract storage for transform outputs.
pub trait TransformCache: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, contents: &[u8]) -> Result<()>;
}

/// Stores entries in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryTransformCache {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryTransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransformCache for MemoryTransformCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    fn put(&self, key: &str, contents: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), contents.to_vec());
        Ok(())
    }
}

/// Stores one file per entry under `<root>/.assetpipe/cache/`.
#[derive(Debug, Clone)]
pub struct FileTransformCache {
    dir: PathBuf,
}

impl FileTransformCache {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(CACHE_DIR),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Two-level fan-out keeps directories small.
        let (prefix, rest) = key.split_at(key.len().min(2));
        self.dir.join(prefix).join(rest)
    }
}

impl TransformCache for FileTransformCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("reading cache entry {:?}", path))?;
        Ok(Some(bytes))
    }

    fn put(&self, key: &str, contents: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {:?}", parent))?;
        }
        fs::write(&path, contents).with_context(|| format!("writing cache entry {:?}", path))
    }
}

/// Wraps a cacheable transform with a [`TransformCache`].
///
/// Cache IO errors never fail a file; they are logged and the transform runs
/// uncached.
#[derive(Debug)]
pub struct CachedTransform {
    inner: Arc<dyn Transform>,
    cache: Arc<dyn TransformCache>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedTransform {
    pub fn new(inner: Arc<dyn Transform>, cache: Arc<dyn TransformCache>) -> Self {
        Self {
            inner,
            cache,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Transform for CachedTransform {
    fn id(&self) -> String {
        self.inner.id()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn writes_sourcemap(&self) -> bool {
        self.inner.writes_sourcemap()
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let id = self.inner.id();
        let key = cache_key(&id, &content_hash(&asset.contents));

        match self.cache.get(&key) {
            Ok(Some(contents)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(transform = %id, path = ?asset.path, "transform cache hit");
                return Ok(Asset::new(asset.path, contents));
            }
            Ok(None) => {}
            Err(err) => warn!(transform = %id, error = %err, "transform cache read failed"),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let out = self.inner.apply(asset)?;
        if let Err(err) = self.cache.put(&key, &out.contents) {
            warn!(transform = %id, error = %err, "transform cache write failed");
        }
        Ok(out)
    }
}
