//! The packaging catalog and build plan.

use std::collections::HashSet;

use super::artifact::ToolArtifact;
use super::source::ToolSource;
use crate::{Error, PlatformTarget, Result};

/// Base URL of the prebuilt third-party binaries.
pub const DISTRIBUTE_SOURCE_URL: &str = "https://distribute.openpype.io/thirdparty";

/// Platforms and tools to package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Platforms to package, in order.
    pub platforms: Vec<PlatformTarget>,
    /// Tools to package, in order.
    pub tools: Vec<ToolArtifact>,
}

/// One step of the build plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEntry<'a> {
    /// Download the tool for the platform.
    Fetch {
        /// Target platform.
        platform: PlatformTarget,
        /// Tool to fetch.
        tool: &'a ToolArtifact,
        /// Source to fetch from.
        source: &'a ToolSource,
    },
    /// Documented gap: nothing to fetch.
    Gap {
        /// Target platform.
        platform: PlatformTarget,
        /// Tool not available on the platform.
        tool: &'a ToolArtifact,
    },
}

impl<'a> PlanEntry<'a> {
    /// Target platform of the entry.
    #[must_use]
    pub const fn platform(&self) -> PlatformTarget {
        match self {
            Self::Fetch { platform, .. } | Self::Gap { platform, .. } => *platform,
        }
    }

    /// Tool of the entry.
    #[must_use]
    pub const fn tool(&self) -> &'a ToolArtifact {
        match self {
            Self::Fetch { tool, .. } | Self::Gap { tool, .. } => *tool,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// Create a catalog for all platforms.
    #[must_use]
    pub fn new(tools: Vec<ToolArtifact>) -> Self {
        Self {
            platforms: PlatformTarget::ALL.to_vec(),
            tools,
        }
    }

    /// Restrict the catalog to the given platforms.
    #[must_use]
    pub fn with_platforms(mut self, platforms: Vec<PlatformTarget>) -> Self {
        self.platforms = platforms;
        self
    }

    /// The ffmpeg and OpenImageIO builds distributed with the addon.
    #[must_use]
    pub fn builtin() -> Self {
        let url = |file: &str| format!("{DISTRIBUTE_SOURCE_URL}/{file}");

        let ffmpeg = ToolArtifact::new("ffmpeg", ["ffmpeg", "ffprobe"])
            .with_source(
                PlatformTarget::Windows,
                ToolSource::new(url("ffmpeg-4.4-windows.zip"), "4.4").with_sha256(
                    "dd51ba29d64ee238e7c4c3c7301b19754c3f0ee2e2a729c20a0e2789e72db925",
                ),
            )
            .with_source(
                PlatformTarget::Linux,
                ToolSource::new(url("ffmpeg-4.4-linux.tgz"), "4.4").with_sha256(
                    "10b9beda57cfbb69b9ed0ce896c0c8d99227b26ca8b9f611040c4752e365cbe9",
                ),
            )
            .with_source(
                PlatformTarget::Darwin,
                ToolSource::new(url("ffmpeg-4.4-macos.tgz"), "4.4").with_sha256(
                    "95f43568338c275f80dc0cab1e1836a2e2270f856f0e7b204440d881dd74fbdb",
                ),
            );

        let oiio = ToolArtifact::new(
            "oiio",
            [
                "oiiotool", "maketx", "iv", "iinfo", "igrep", "idiff", "iconvert",
            ],
        )
        .with_source(
            PlatformTarget::Windows,
            ToolSource::new(url("oiio_tools-2.3.10-windows.zip"), "2.3.10").with_sha256(
                "b9950f5d2fa3720b52b8be55bacf5f56d33f9e029d38ee86534995f3d8d253d2",
            ),
        )
        .with_source(
            PlatformTarget::Linux,
            ToolSource::new(url("oiio_tools-2.2.20-linux-centos7.tgz"), "2.2.20").with_sha256(
                "3894dec7e4e521463891a869586850e8605f5fd604858b674c87323bf33e273d",
            ),
        )
        .unsupported_on(PlatformTarget::Darwin);

        Self::new(vec![ffmpeg, oiio])
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolArtifact> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Check the catalog for structural problems.
    pub fn validate(&self) -> Result<()> {
        if self.platforms.is_empty() {
            return Err(Error::configuration("Catalog lists no platforms"));
        }
        if self.tools.is_empty() {
            return Err(Error::configuration("Catalog lists no tools"));
        }

        let mut seen_platforms = HashSet::new();
        for platform in &self.platforms {
            if !seen_platforms.insert(*platform) {
                return Err(Error::configuration(format!(
                    "Platform '{platform}' is listed more than once"
                )));
            }
        }

        let mut seen_tools = HashSet::new();
        for tool in &self.tools {
            if !is_safe_segment(&tool.name) {
                return Err(Error::configuration_with_help(
                    format!("Invalid tool name '{}'", tool.name),
                    "Tool names are directory names: use letters, digits, '-', '_' or '.'",
                ));
            }
            if !seen_tools.insert(tool.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Tool '{}' is defined more than once",
                    tool.name
                )));
            }
            if tool.executables.is_empty() {
                return Err(Error::configuration(format!(
                    "Tool '{}' does not declare any executables",
                    tool.name
                )));
            }
            if let Some(bad) = tool.executables.iter().find(|e| !is_safe_segment(e)) {
                return Err(Error::configuration(format!(
                    "Tool '{}' declares invalid executable name '{bad}'",
                    tool.name
                )));
            }

            for (platform, source) in &tool.sources {
                validate_source(&tool.name, *platform, source)?;
            }
        }

        Ok(())
    }

    /// Compute the build plan: every platform x tool pair, platform-major.
    ///
    /// A pair without a source is only acceptable when the platform is a
    /// documented gap for the tool.
    pub fn plan(&self) -> Result<Vec<PlanEntry<'_>>> {
        let mut plan = Vec::with_capacity(self.platforms.len() * self.tools.len());

        for &platform in &self.platforms {
            for tool in &self.tools {
                let entry = match tool.source_for(platform) {
                    Some(source) => PlanEntry::Fetch {
                        platform,
                        tool,
                        source,
                    },
                    None if tool.is_expected_gap(platform) => PlanEntry::Gap { platform, tool },
                    None => {
                        return Err(Error::configuration_with_help(
                            format!("No download source for '{}' on {platform}", tool.name),
                            format!(
                                "Add a source for {platform} or list it under 'unsupported' for '{}'",
                                tool.name
                            ),
                        ));
                    }
                };
                plan.push(entry);
            }
        }

        Ok(plan)
    }
}

fn validate_source(tool: &str, platform: PlatformTarget, source: &ToolSource) -> Result<()> {
    if !(source.url.starts_with("https://") || source.url.starts_with("http://")) {
        return Err(Error::configuration(format!(
            "Source URL for '{tool}' on {platform} must be http(s): {}",
            source.url
        )));
    }
    let file_name = source.file_name();
    if matches!(file_name, "" | "." | "..") || file_name.contains('\\') {
        return Err(Error::configuration(format!(
            "Source URL for '{tool}' on {platform} has no usable file name: {}",
            source.url
        )));
    }
    if source.version.trim().is_empty() {
        return Err(Error::configuration(format!(
            "Source for '{tool}' on {platform} has an empty version"
        )));
    }
    if let Some(sha) = &source.sha256 {
        if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::configuration(format!(
                "Source for '{tool}' on {platform} has a malformed sha256: {sha}"
            )));
        }
    }
    if source.archive_format().is_none() {
        return Err(Error::configuration_with_help(
            format!(
                "Cannot tell the archive format of '{}' for '{tool}' on {platform}",
                source.file_name()
            ),
            "Set 'format' to \"zip\" or \"tar.gz\" on the source",
        ));
    }
    Ok(())
}

/// A single path segment that cannot escape its parent directory.
#[must_use]
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
