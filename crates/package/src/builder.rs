//! The package builder.
//!
//! Runs the build plan of a [`Catalog`] against an [`ArtifactFetcher`] and
//! produces a single zip archive. Nothing is written at the output path
//! unless every step succeeds.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thirdparty_core::manifest::{MANIFEST_FILE, to_slash_path};
use thirdparty_core::tools::{Catalog, PlanEntry, ToolArtifact, ToolSource};
use thirdparty_core::{
    AddonInfo, Error, FileInfo, GapEntry, PackageManifest, PlatformTarget, Result, ToolEntry,
};
use thirdparty_fetch::{
    ArtifactFetcher, FetchRequest, extract_archive, find_executables, verify_artifact,
};
use tracing::{debug, info, warn};

use crate::archive::write_archive;
use crate::layout::{IgnoreRules, copy_server_content, write_files_info, zip_client_content};

/// Resolve an output location to an archive path.
///
/// A path ending in `.zip` is the archive itself; anything else is a
/// directory that receives `<addon>-<version>.zip`.
#[must_use]
pub fn archive_path_for(output: &Path, addon: &AddonInfo) -> PathBuf {
    let is_zip = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        output.to_path_buf()
    } else {
        output.join(addon.archive_file_name())
    }
}

/// Settings of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Archive path to write.
    pub output: PathBuf,
    /// Addon identity.
    pub addon: AddonInfo,
    /// Store raw archives and `files_info.json` under `private/`.
    pub include_archives: bool,
    /// Server content to copy into `server/`.
    pub server_dir: Option<PathBuf>,
    /// Client content to zip into `private/client.zip`.
    pub client_dir: Option<PathBuf>,
}

impl BuildOptions {
    /// Options writing the archive to `output`.
    #[must_use]
    pub fn new(output: impl Into<PathBuf>, addon: AddonInfo) -> Self {
        Self {
            output: output.into(),
            addon,
            include_archives: false,
            server_dir: None,
            client_dir: None,
        }
    }

    /// Include the raw downloaded archives.
    #[must_use]
    pub const fn with_archives(mut self, include: bool) -> Self {
        self.include_archives = include;
        self
    }

    /// Copy server content from `dir`.
    #[must_use]
    pub fn with_server_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.server_dir = dir;
        self
    }

    /// Zip client content from `dir`.
    #[must_use]
    pub fn with_client_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.client_dir = dir;
        self
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Written archive.
    pub archive: PathBuf,
    /// Archive size in bytes.
    pub size: u64,
    /// SHA256 of the archive.
    pub sha256: String,
    /// Manifest stored in the archive.
    pub manifest: PackageManifest,
    /// Artifacts downloaded over the network.
    pub downloaded: usize,
    /// Artifacts served from the download cache.
    pub cached: usize,
}

impl BuildReport {
    /// Documented gaps of the build.
    #[must_use]
    pub fn gaps(&self) -> &[GapEntry] {
        &self.manifest.gaps
    }
}

struct PackagedTool {
    entry: ToolEntry,
    archive: PathBuf,
    from_cache: bool,
}

/// Builds the addon package.
pub struct PackageBuilder<'a> {
    catalog: &'a Catalog,
    fetcher: &'a dyn ArtifactFetcher,
    options: BuildOptions,
}

impl<'a> PackageBuilder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(catalog: &'a Catalog, fetcher: &'a dyn ArtifactFetcher, options: BuildOptions) -> Self {
        Self {
            catalog,
            fetcher,
            options,
        }
    }

    /// Build options.
    #[must_use]
    pub const fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Run the build.
    pub async fn build(&self) -> Result<BuildReport> {
        self.options.addon.validate()?;
        self.catalog.validate()?;
        let plan = self.catalog.plan()?;
        let rules = IgnoreRules::new()?;

        let output = &self.options.output;
        let output_dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&output_dir).map_err(|e| Error::io(e, &output_dir, "create"))?;

        // Removed on drop, also when the build fails
        let work = tempfile::Builder::new()
            .prefix(".thirdparty-build-")
            .tempdir_in(&output_dir)
            .map_err(|e| Error::io(e, &output_dir, "create"))?;
        let downloads = work.path().join("downloads");
        let staging = work.path().join("package");
        std::fs::create_dir_all(&staging).map_err(|e| Error::io(e, &staging, "create"))?;

        info!(
            addon = %self.options.addon.name,
            version = %self.options.addon.version,
            steps = plan.len(),
            fetcher = self.fetcher.name(),
            "Building package"
        );

        let mut manifest = PackageManifest::new(self.options.addon.clone());
        let mut raw_archives = Vec::new();
        let (mut downloaded, mut cached) = (0, 0);

        for entry in &plan {
            match *entry {
                PlanEntry::Gap { platform, tool } => {
                    let reason = format!("no {} build is published for {platform}", tool.name);
                    warn!(%platform, tool = %tool.name, "Skipping documented gap: {reason}");
                    manifest.record_gap(platform, &tool.name, reason);
                }
                PlanEntry::Fetch {
                    platform,
                    tool,
                    source,
                } => match self
                    .package_tool(platform, tool, source, &downloads, &staging)
                    .await
                {
                    Ok(packaged) => {
                        if packaged.from_cache {
                            cached += 1;
                        } else {
                            downloaded += 1;
                        }
                        if self.options.include_archives {
                            let info = FileInfo::sha256(
                                &tool.name,
                                source.file_name(),
                                &packaged.entry.sha256,
                                platform,
                            );
                            raw_archives.push((packaged.archive, info));
                        }
                        manifest.insert(platform, &tool.name, packaged.entry);
                    }
                    Err(e) if tool.is_expected_gap(platform) => {
                        warn!(%platform, tool = %tool.name, error = %e, "Skipping documented gap after failure");
                        remove_tool_dir(&staging, platform, &tool.name)?;
                        manifest.record_gap(platform, &tool.name, e.to_string());
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        if let Some(server_dir) = &self.options.server_dir {
            copy_server_content(server_dir, &staging, &rules)?;
        }
        if let Some(client_dir) = &self.options.client_dir {
            zip_client_content(client_dir, &staging, &rules)?;
        }
        if self.options.include_archives {
            write_files_info(&staging, &raw_archives)?;
        }

        manifest.save(&staging.join(MANIFEST_FILE))?;
        manifest.verify_layout(&staging)?;

        let summary = write_archive(&staging, output)?;
        info!(
            archive = %output.display(),
            size = summary.size,
            tools = manifest.len(),
            gaps = manifest.gaps.len(),
            "Package written"
        );

        Ok(BuildReport {
            archive: output.clone(),
            size: summary.size,
            sha256: summary.sha256,
            manifest,
            downloaded,
            cached,
        })
    }

    async fn package_tool(
        &self,
        platform: PlatformTarget,
        tool: &ToolArtifact,
        source: &ToolSource,
        downloads: &Path,
        staging: &Path,
    ) -> Result<PackagedTool> {
        let request = FetchRequest::new(platform, &tool.name, source);
        let download_dir = downloads.join(platform.as_str()).join(&tool.name);
        let fetched = self.fetcher.fetch(&request, &download_dir).await?;

        let verified = verify_artifact(&fetched.path, source)?;
        debug!(%platform, tool = %tool.name, size = verified.size, "Artifact verified");

        let platform_dir = staging.join(platform.as_str());
        std::fs::create_dir_all(&platform_dir).map_err(|e| Error::io(e, &platform_dir, "create"))?;
        let dest = platform_dir.join(&tool.name);
        extract_archive(&fetched.path, verified.format, &dest)?;

        let found = find_executables(&dest, platform, &tool.executables)?;
        let primary = tool.primary_executable().ok_or_else(|| {
            Error::configuration(format!("Tool '{}' does not declare any executables", tool.name))
        })?;
        if !found.contains_key(primary) {
            return Err(Error::verification(
                source.file_name(),
                format!(
                    "executable '{}' not found after extraction",
                    platform.executable_file_name(primary)
                ),
            ));
        }
        for missing in tool.executables.iter().filter(|e| !found.contains_key(*e)) {
            debug!(%platform, tool = %tool.name, executable = %missing, "Optional executable not present");
        }

        let executables = found
            .into_iter()
            .map(|(name, relative)| {
                let path = format!("{platform}/{}/{}", tool.name, to_slash_path(&relative));
                (name, path)
            })
            .collect();

        info!(%platform, tool = %tool.name, version = %source.version, "Tool packaged");
        Ok(PackagedTool {
            entry: ToolEntry {
                version: source.version.clone(),
                source: source.file_name().to_string(),
                sha256: verified.sha256,
                executables,
            },
            archive: fetched.path,
            from_cache: fetched.from_cache,
        })
    }
}

/// Remove whatever a failed step left of `<platform>/<tool>`, and the
/// platform directory if that leaves it empty.
fn remove_tool_dir(staging: &Path, platform: PlatformTarget, tool: &str) -> Result<()> {
    let platform_dir = staging.join(platform.as_str());
    let tool_dir = platform_dir.join(tool);
    if tool_dir.exists() {
        std::fs::remove_dir_all(&tool_dir).map_err(|e| Error::io(e, &tool_dir, "remove"))?;
    }
    let is_empty = std::fs::read_dir(&platform_dir).is_ok_and(|mut d| d.next().is_none());
    if is_empty {
        std::fs::remove_dir(&platform_dir).map_err(|e| Error::io(e, &platform_dir, "remove"))?;
    }
    Ok(())
}
