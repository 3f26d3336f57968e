//! `thirdparty.toml` configuration file.
//!
//! Every field is optional. Values given here sit between command-line flags
//! (and their environment variables) and the built-in defaults.
//!
//! ```toml
//! output = "dist"
//! platforms = ["windows", "linux"]
//!
//! [addon]
//! name = "ayon_third_party"
//! version = "1.4.0"
//!
//! [download]
//! timeout_secs = 600
//! retries = 2
//!
//! [[tools]]
//! name = "ffmpeg"
//! executables = ["ffmpeg", "ffprobe"]
//!
//! [tools.sources.linux]
//! url = "https://example.com/ffmpeg-4.4-linux.tgz"
//! version = "4.4"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::manifest::AddonInfo;
use crate::tools::{Catalog, ToolArtifact};
use crate::{Error, PlatformTarget, Result};

/// File name looked up in the working directory when no config is given.
pub const CONFIG_FILE_NAME: &str = "thirdparty.toml";

/// Addon name used when none is configured.
pub const DEFAULT_ADDON_NAME: &str = "ayon_third_party";

/// Addon version used when none is configured.
pub const DEFAULT_ADDON_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default whole-request download timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Output archive path or directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Platforms to package; all when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<PlatformTarget>>,
    /// Addon identity.
    #[serde(default)]
    pub addon: AddonConfig,
    /// Download behaviour.
    #[serde(default)]
    pub download: DownloadConfig,
    /// Tool definitions replacing the built-in catalog when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolArtifact>,
}

/// `[addon]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddonConfig {
    /// Addon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Addon version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// `[download]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    /// Whole-request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Additional attempts after a network failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Whether to use the download cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    /// Download cache root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            Error::configuration_with_help(
                format!("Invalid {CONFIG_FILE_NAME}: {}", e.message()),
                "See the [addon], [download] and [[tools]] tables in the readme",
            )
        })
    }

    /// Load a configuration file.
    ///
    /// Relative `output` and `download.cache_dir` paths are resolved against
    /// the directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        tracing::debug!(path = %path.display(), tools = config.tools.len(), "Loaded configuration");
        Ok(config)
    }

    /// Path of the default configuration file in `dir`, if it exists.
    #[must_use]
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let candidate = dir.join(CONFIG_FILE_NAME);
        candidate.is_file().then_some(candidate)
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(output) = self.output.as_mut() {
            resolve(output);
        }
        if let Some(cache_dir) = self.download.cache_dir.as_mut() {
            resolve(cache_dir);
        }
    }

    /// Catalog described by this configuration.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        let catalog = if self.tools.is_empty() {
            Catalog::builtin()
        } else {
            Catalog::new(self.tools.clone())
        };
        match &self.platforms {
            Some(platforms) => catalog.with_platforms(platforms.clone()),
            None => catalog,
        }
    }

    /// Addon identity with defaults applied.
    #[must_use]
    pub fn addon(&self) -> AddonInfo {
        AddonInfo::new(
            self.addon
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_ADDON_NAME.to_string()),
            self.addon
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_ADDON_VERSION.to_string()),
        )
    }
}
