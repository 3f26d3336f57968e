//! Package manifest.
//!
//! The manifest (`manifest.json`) sits at the root of every package and tells
//! the host which tools are available for which platform, and where their
//! executables live inside the package.
//!
//! ## Structure
//!
//! ```json
//! {
//!   "version": 1,
//!   "addon": { "name": "ayon_third_party", "version": "1.4.0" },
//!   "platforms": {
//!     "linux": {
//!       "ffmpeg": {
//!         "version": "4.4",
//!         "source": "ffmpeg-4.4-linux.tgz",
//!         "sha256": "10b9beda...",
//!         "executables": { "ffmpeg": "linux/ffmpeg/ffmpeg" }
//!       }
//!     }
//!   },
//!   "gaps": [{ "platform": "darwin", "tool": "oiio", "reason": "..." }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use walkdir::WalkDir;

use crate::tools::is_safe_segment;
use crate::{Error, PlatformTarget, Result};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest at the package root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Directory holding content the host serves but never executes.
pub const PRIVATE_DIR: &str = "private";

/// File name of the downloadable-archive listing inside [`PRIVATE_DIR`].
pub const FILES_INFO_FILE: &str = "files_info.json";

/// Addon identity recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonInfo {
    /// Addon name.
    pub name: String,
    /// Addon version.
    pub version: String,
}

impl AddonInfo {
    /// Create addon info.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Check that name and version can be used in a file name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either is empty or contains a path
    /// separator or anything besides ASCII letters, digits, `-`, `_` and `.`.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if !is_safe_segment(value) {
                return Err(Error::configuration_with_help(
                    format!("Invalid addon {field} '{value}'"),
                    "Use ASCII letters, digits, '-', '_' and '.' only",
                ));
            }
        }
        Ok(())
    }

    /// Default archive file name: `<name>-<version>.zip`.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.zip", self.name, self.version)
    }
}

/// One packaged tool on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Tool version.
    pub version: String,
    /// File name of the archive the binaries came from.
    pub source: String,
    /// SHA256 of that archive.
    pub sha256: String,
    /// Executable name to path relative to the package root.
    #[serde(default)]
    pub executables: BTreeMap<String, String>,
}

/// A platform x tool pair that was skipped on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEntry {
    /// Platform lacking the tool.
    pub platform: PlatformTarget,
    /// Tool name.
    pub tool: String,
    /// Why it was skipped.
    pub reason: String,
}

/// The root manifest structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Manifest format version.
    pub version: u32,
    /// Addon identity.
    pub addon: AddonInfo,
    /// Packaged tools, keyed by platform then tool name.
    #[serde(default)]
    pub platforms: BTreeMap<PlatformTarget, BTreeMap<String, ToolEntry>>,
    /// Documented gaps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<GapEntry>,
}

impl PackageManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new(addon: AddonInfo) -> Self {
        Self {
            version: MANIFEST_VERSION,
            addon,
            platforms: BTreeMap::new(),
            gaps: Vec::new(),
        }
    }

    /// Add or replace a tool entry.
    pub fn insert(
        &mut self,
        platform: PlatformTarget,
        tool: impl Into<String>,
        entry: ToolEntry,
    ) -> Option<ToolEntry> {
        self.platforms
            .entry(platform)
            .or_default()
            .insert(tool.into(), entry)
    }

    /// Record a documented gap.
    pub fn record_gap(
        &mut self,
        platform: PlatformTarget,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.gaps.push(GapEntry {
            platform,
            tool: tool.into(),
            reason: reason.into(),
        });
    }

    /// Get the entry for a platform and tool.
    #[must_use]
    pub fn get(&self, platform: PlatformTarget, tool: &str) -> Option<&ToolEntry> {
        self.platforms.get(&platform).and_then(|tools| tools.get(tool))
    }

    /// Whether the manifest lists the tool for the platform.
    #[must_use]
    pub fn contains(&self, platform: PlatformTarget, tool: &str) -> bool {
        self.get(platform, tool).is_some()
    }

    /// Iterate over all entries in platform, then tool order.
    pub fn entries(&self) -> impl Iterator<Item = (PlatformTarget, &str, &ToolEntry)> {
        self.platforms.iter().flat_map(|(platform, tools)| {
            tools
                .iter()
                .map(move |(tool, entry)| (*platform, tool.as_str(), entry))
        })
    }

    /// Number of packaged platform x tool pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.platforms.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is packaged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON, rejecting manifests newer than this build understands.
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content)?;
        if manifest.version > MANIFEST_VERSION {
            return Err(Error::manifest(format!(
                "Manifest version {} is newer than supported version {}",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }

    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_json(&content)
    }

    /// Save the manifest to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = self.to_json()?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| Error::io(e, path, "write"))
    }

    /// Check the manifest against the files of a package.
    ///
    /// `paths` are file paths relative to the package root using `/` as
    /// separator. Every listed tool must have files, every recorded
    /// executable must exist, and every file under a platform directory must
    /// belong to a listed tool. Entries outside platform directories are not
    /// checked.
    pub fn verify_paths<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut files = HashSet::new();
        let mut populated = HashSet::new();
        let mut unlisted = BTreeSet::new();
        let mut stray = BTreeSet::new();

        for path in paths {
            let path = path.as_ref().trim_start_matches("./");
            if path.is_empty() || path.ends_with('/') {
                continue;
            }
            files.insert(path.to_string());

            let mut parts = path.splitn(3, '/');
            let Some(platform) = parts.next().and_then(platform_dir) else {
                continue;
            };
            match (parts.next(), parts.next()) {
                (Some(tool), Some(rest)) if !rest.is_empty() => {
                    if self.contains(platform, tool) {
                        populated.insert((platform, tool.to_string()));
                    } else {
                        unlisted.insert(format!("{platform}/{tool}"));
                    }
                }
                _ => {
                    stray.insert(path.to_string());
                }
            }
        }

        let mut problems = Vec::new();
        for (platform, tool, entry) in self.entries() {
            if !populated.contains(&(platform, tool.to_string())) {
                problems.push(format!("{platform}/{tool} is listed but has no files"));
                continue;
            }
            for (name, path) in &entry.executables {
                if !files.contains(path) {
                    problems.push(format!(
                        "{platform}/{tool} executable '{name}' is missing at {path}"
                    ));
                }
            }
        }
        problems.extend(
            unlisted
                .into_iter()
                .map(|dir| format!("{dir} is present but not listed")),
        );
        problems.extend(
            stray
                .into_iter()
                .map(|path| format!("{path} is outside any tool directory")),
        );

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::manifest(format!(
                "Package contents do not match manifest: {}",
                problems.join("; ")
            )))
        }
    }

    /// Check the manifest against a package directory on disk.
    pub fn verify_layout(&self, root: &Path) -> Result<()> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::io(e.into(), path, "walk")
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            paths.push(to_slash_path(relative));
        }
        self.verify_paths(paths)
    }
}

/// Render a relative path with `/` separators.
#[must_use]
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Exact platform directory name; aliases are not directory names.
fn platform_dir(name: &str) -> Option<PlatformTarget> {
    PlatformTarget::ALL
        .into_iter()
        .find(|platform| platform.as_str() == name)
}

/// Entry of `private/files_info.json`, listing a downloadable archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Tool name.
    pub name: String,
    /// Archive file name inside the private directory.
    pub filename: String,
    /// Archive checksum.
    pub checksum: String,
    /// Checksum algorithm.
    pub checksum_algorithm: String,
    /// Platform the archive is for.
    pub platform: PlatformTarget,
}

impl FileInfo {
    /// Create an entry with a SHA256 checksum.
    #[must_use]
    pub fn sha256(
        name: impl Into<String>,
        filename: impl Into<String>,
        checksum: impl Into<String>,
        platform: PlatformTarget,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            checksum: checksum.into(),
            checksum_algorithm: "sha256".to_string(),
            platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(version: &str, executables: &[(&str, &str)]) -> ToolEntry {
        ToolEntry {
            version: version.to_string(),
            source: "archive.zip".to_string(),
            sha256: "0".repeat(64),
            executables: executables
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn sample() -> PackageManifest {
        let mut manifest = PackageManifest::new(AddonInfo::new("addon", "1.0.0"));
        manifest.insert(
            PlatformTarget::Linux,
            "ffmpeg",
            entry("4.4", &[("ffmpeg", "linux/ffmpeg/ffmpeg")]),
        );
        manifest.insert(
            PlatformTarget::Windows,
            "ffmpeg",
            entry("4.4", &[("ffmpeg", "windows/ffmpeg/bin/ffmpeg.exe")]),
        );
        manifest.record_gap(PlatformTarget::Darwin, "oiio", "not built for darwin");
        manifest
    }

    #[test]
    fn test_addon_validate() {
        assert!(AddonInfo::new("ayon_third_party", "1.4.0-dev.1").validate().is_ok());
        for (name, version) in [("../x", "1"), ("x", ".."), ("x", ""), ("a/b", "1"), ("a\\b", "1")] {
            let err = AddonInfo::new(name, version).validate().unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }), "accepted {name:?} {version:?}");
        }
    }

    #[test]
    fn test_entries_are_ordered() {
        let manifest = sample();
        let keys: Vec<_> = manifest
            .entries()
            .map(|(p, t, _)| format!("{p}/{t}"))
            .collect();
        assert_eq!(keys, vec!["linux/ffmpeg", "windows/ffmpeg"]);
        assert_eq!(manifest.len(), 2);
        assert!(!manifest.is_empty());
    }

    #[test]
    fn test_json_is_deterministic() {
        let a = sample().to_json().unwrap();
        let b = sample().to_json().unwrap();
        assert_eq!(a, b);

        let parsed = PackageManifest::from_json(&a).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut manifest = sample();
        manifest.version = MANIFEST_VERSION + 1;
        let json = serde_json::to_string(&manifest).unwrap();
        let err = PackageManifest::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_verify_paths_accepts_matching_layout() {
        let manifest = sample();
        manifest
            .verify_paths([
                "manifest.json",
                "private/files_info.json",
                "linux/",
                "linux/ffmpeg/ffmpeg",
                "linux/ffmpeg/lib/libavcodec.so",
                "windows/ffmpeg/bin/ffmpeg.exe",
            ])
            .unwrap();
    }

    #[test]
    fn test_verify_paths_reports_missing_tool() {
        let err = sample()
            .verify_paths(["linux/ffmpeg/ffmpeg"])
            .unwrap_err()
            .to_string();
        assert!(err.contains("windows/ffmpeg is listed but has no files"));
    }

    #[test]
    fn test_verify_paths_reports_missing_executable() {
        let err = sample()
            .verify_paths(["linux/ffmpeg/README", "windows/ffmpeg/bin/ffmpeg.exe"])
            .unwrap_err()
            .to_string();
        assert!(err.contains("executable 'ffmpeg' is missing at linux/ffmpeg/ffmpeg"));
    }

    #[test]
    fn test_verify_paths_reports_unlisted_content() {
        let err = sample()
            .verify_paths([
                "linux/ffmpeg/ffmpeg",
                "windows/ffmpeg/bin/ffmpeg.exe",
                "darwin/oiio/bin/oiiotool",
                "darwin/oiio/bin/maketx",
                "linux/stray.txt",
            ])
            .unwrap_err()
            .to_string();
        assert!(err.contains("darwin/oiio is present but not listed"));
        assert!(err.contains("linux/stray.txt is outside any tool directory"));
        assert_eq!(err.matches("darwin/oiio").count(), 1);
    }

    #[test]
    fn test_verify_layout_on_disk() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("linux/ffmpeg")).unwrap();
        std::fs::create_dir_all(root.join("windows/ffmpeg/bin")).unwrap();
        std::fs::write(root.join("linux/ffmpeg/ffmpeg"), b"elf").unwrap();
        std::fs::write(root.join("windows/ffmpeg/bin/ffmpeg.exe"), b"mz").unwrap();
        sample().save(&root.join(MANIFEST_FILE)).unwrap();

        sample().verify_layout(root).unwrap();

        let loaded = PackageManifest::load(&root.join(MANIFEST_FILE)).unwrap();
        assert_eq!(loaded, sample());

        std::fs::remove_file(root.join("linux/ffmpeg/ffmpeg")).unwrap();
        assert!(sample().verify_layout(root).is_err());
    }

    #[test]
    fn test_file_info_format() {
        let info = FileInfo::sha256(
            "ffmpeg",
            "ffmpeg-4.4-linux.tgz",
            "abc",
            PlatformTarget::Linux,
        );
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["checksum_algorithm"], "sha256");
        assert_eq!(json["platform"], "linux");
        assert_eq!(json["filename"], "ffmpeg-4.4-linux.tgz");
    }
}
