//! Fetcher trait.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thirdparty_core::tools::ToolSource;
use thirdparty_core::{PlatformTarget, Result};

/// What to fetch: one platform build of one tool.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Target platform.
    pub platform: PlatformTarget,
    /// Tool name.
    pub tool: &'a str,
    /// Download source.
    pub source: &'a ToolSource,
}

impl<'a> FetchRequest<'a> {
    /// Create a fetch request.
    #[must_use]
    pub const fn new(platform: PlatformTarget, tool: &'a str, source: &'a ToolSource) -> Self {
        Self {
            platform,
            tool,
            source,
        }
    }
}

/// A fetched artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Path of the artifact.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Whether it was served from the download cache.
    pub from_cache: bool,
}

/// Something that can place tool archives on disk.
///
/// Implementations write the artifact to `dest_dir/<source file name>` and
/// must not leave a partial file behind on failure.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetcher name for logging.
    fn name(&self) -> &'static str;

    /// Fetch the artifact described by `request` into `dest_dir`.
    async fn fetch(&self, request: &FetchRequest<'_>, dest_dir: &Path) -> Result<FetchedArtifact>;
}
