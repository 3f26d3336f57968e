//! Content-addressed download cache.
//!
//! Archives are stored by their declared SHA256, so a cache hit never needs a
//! network request and never serves bytes other than the pinned ones.

use std::path::{Path, PathBuf};
use thirdparty_core::{Error, Result};
use tracing::{debug, trace};

/// Content-addressed cache of downloaded archives.
///
/// Default location: `~/.cache/thirdparty/downloads/`
///
/// Structure:
/// ```text
/// ~/.cache/thirdparty/downloads/
/// └── sha256/
///     └── 10b9beda.../
///         └── ffmpeg-4.4-linux.tgz
/// ```
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
}

impl Default for DownloadCache {
    fn default() -> Self {
        Self::in_cache_dir(&dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")))
    }
}

impl DownloadCache {
    /// Create a cache at the specified root directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the cache below a general cache directory.
    #[must_use]
    pub fn in_cache_dir(cache_dir: &Path) -> Self {
        Self::new(cache_dir.join("thirdparty").join("downloads"))
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an archive with the given checksum and file name is stored at.
    #[must_use]
    pub fn path(&self, sha256: &str, file_name: &str) -> PathBuf {
        self.root
            .join("sha256")
            .join(sha256.to_lowercase())
            .join(file_name)
    }

    /// Get a cached archive if it exists.
    #[must_use]
    pub fn get(&self, sha256: &str, file_name: &str) -> Option<PathBuf> {
        let path = self.path(sha256, file_name);
        if path.is_file() {
            trace!(sha256, ?path, "Cache hit for download");
            Some(path)
        } else {
            trace!(sha256, "Cache miss for download");
            None
        }
    }

    /// Copy an archive into the cache.
    ///
    /// The caller is responsible for having checked that `source` hashes to
    /// `sha256`.
    pub fn store(&self, sha256: &str, file_name: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.path(sha256, file_name);
        let parent = dest
            .parent()
            .ok_or_else(|| Error::configuration("Cache path has no parent directory"))?;
        std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;

        let partial = parent.join(format!(".{file_name}.partial"));
        std::fs::copy(source, &partial).map_err(|e| Error::io(e, &partial, "write"))?;
        std::fs::rename(&partial, &dest).map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            Error::io(e, &dest, "rename")
        })?;

        debug!(sha256, ?dest, "Stored download in cache");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_layout() {
        let cache = DownloadCache::in_cache_dir(Path::new("/var/cache"));
        assert_eq!(
            cache.path("ABCDEF", "tool.zip"),
            PathBuf::from("/var/cache/thirdparty/downloads/sha256/abcdef/tool.zip")
        );
    }

    #[test]
    fn test_store_and_get() {
        let temp = TempDir::new().unwrap();
        let cache = DownloadCache::new(temp.path().join("cache"));
        let source = temp.path().join("tool.zip");
        std::fs::write(&source, b"archive bytes").unwrap();

        assert!(cache.get("abc", "tool.zip").is_none());

        let stored = cache.store("abc", "tool.zip", &source).unwrap();
        assert_eq!(cache.get("abc", "tool.zip"), Some(stored.clone()));
        assert_eq!(std::fs::read(stored).unwrap(), b"archive bytes");

        // Same checksum, different file name is a separate entry
        assert!(cache.get("abc", "other.zip").is_none());
    }
}
