//! Local file cache for reference-valued settings.
//!
//! Some settings carry a file reference (a wallpaper path or URI) rather
//! than a plain value. The cache maps such a reference to a local copy so
//! the target backend never points at a remote or transient location. A
//! miss is a normal, non-exceptional return value.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::paths;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to cache {reference}: {source}")]
    Store {
        reference: String,
        source: std::io::Error,
    },
}

pub trait FileCache {
    /// Cached local path for a reference, if one exists.
    fn get(&self, reference: &str) -> Option<PathBuf>;

    /// Copy the referenced file into the cache. Returns the cached path, or
    /// `None` when the reference scheme is not supported.
    fn store(&self, reference: &str) -> Result<Option<PathBuf>, CacheError>;
}

/// Filesystem-backed cache with content-addressed file names.
#[derive(Debug)]
pub struct FsFileCache {
    dir: PathBuf,
}

impl FsFileCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn open_default() -> Self {
        Self::new(paths::cache_dir())
    }

    fn cached_path(&self, reference: &str) -> PathBuf {
        let digest = Sha256::digest(reference.as_bytes());
        let mut name = format!("{digest:x}");
        if let Some(ext) = Path::new(reference).extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        self.dir.join(name)
    }
}

impl FileCache for FsFileCache {
    fn get(&self, reference: &str) -> Option<PathBuf> {
        let path = self.cached_path(reference);
        path.is_file().then_some(path)
    }

    fn store(&self, reference: &str) -> Result<Option<PathBuf>, CacheError> {
        let Some(source) = local_source(reference) else {
            tracing::debug!(reference, "unsupported reference scheme, not cached");
            return Ok(None);
        };
        let target = self.cached_path(reference);
        let copy = || -> std::io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            fs::copy(&source, &target)?;
            Ok(())
        };
        copy().map_err(|source| CacheError::Store {
            reference: reference.to_string(),
            source,
        })?;
        Ok(Some(target))
    }
}

/// Local path for a reference: plain paths and `file://` URIs only.
/// Network transport of referenced files is out of scope.
fn local_source(reference: &str) -> Option<PathBuf> {
    if let Some(path) = reference.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if reference.contains("://") {
        return None;
    }
    Some(PathBuf::from(reference))
}
