//! Named tool artifacts with per-platform sources.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::source::ToolSource;
use crate::PlatformTarget;

/// A named executable dependency packaged for several platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolArtifact {
    /// Tool name, used as directory name inside each platform directory.
    pub name: String,
    /// Executable base names; the first one is required to be present.
    pub executables: Vec<String>,
    /// Download source per platform.
    #[serde(default)]
    pub sources: BTreeMap<PlatformTarget, ToolSource>,
    /// Platforms for which the tool is known not to be available.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unsupported: BTreeSet<PlatformTarget>,
}

impl ToolArtifact {
    /// Create a tool with the given executables and no sources.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, executables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            executables: executables.into_iter().map(Into::into).collect(),
            sources: BTreeMap::new(),
            unsupported: BTreeSet::new(),
        }
    }

    /// Add a platform source.
    #[must_use]
    pub fn with_source(mut self, platform: PlatformTarget, source: ToolSource) -> Self {
        self.sources.insert(platform, source);
        self
    }

    /// Mark a platform as a documented gap.
    #[must_use]
    pub fn unsupported_on(mut self, platform: PlatformTarget) -> Self {
        self.unsupported.insert(platform);
        self
    }

    /// Source for a platform, if any.
    #[must_use]
    pub fn source_for(&self, platform: PlatformTarget) -> Option<&ToolSource> {
        self.sources.get(&platform)
    }

    /// Whether the platform is a documented gap for this tool.
    #[must_use]
    pub fn is_expected_gap(&self, platform: PlatformTarget) -> bool {
        self.unsupported.contains(&platform)
    }

    /// The executable that must exist after extraction.
    #[must_use]
    pub fn primary_executable(&self) -> Option<&str> {
        self.executables.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let tool = ToolArtifact::new("oiio", ["oiiotool", "maketx"])
            .with_source(
                PlatformTarget::Linux,
                ToolSource::new("https://example.com/oiio.tgz", "2.2.20"),
            )
            .unsupported_on(PlatformTarget::Darwin);

        assert_eq!(tool.primary_executable(), Some("oiiotool"));
        assert!(tool.source_for(PlatformTarget::Linux).is_some());
        assert!(tool.source_for(PlatformTarget::Windows).is_none());
        assert!(tool.is_expected_gap(PlatformTarget::Darwin));
        assert!(!tool.is_expected_gap(PlatformTarget::Linux));
    }

    #[test]
    fn test_no_executables() {
        let tool = ToolArtifact::new("empty", Vec::<String>::new());
        assert_eq!(tool.primary_executable(), None);
    }
}
