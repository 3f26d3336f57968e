//! Download sources and archive formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container format of a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Zip archive.
    #[serde(rename = "zip")]
    Zip,
    /// Gzip-compressed tarball (`.tar.gz` or `.tgz`).
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    /// Leading bytes every file of this format starts with.
    #[must_use]
    pub const fn magic(self) -> &'static [u8] {
        match self {
            Self::Zip => b"PK\x03\x04",
            Self::TarGz => &[0x1f, 0x8b],
        }
    }

    /// Check whether `header` starts with this format's signature.
    #[must_use]
    pub fn matches_magic(self, header: &[u8]) -> bool {
        header.starts_with(self.magic())
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::TarGz => write!(f, "tar.gz"),
        }
    }
}

/// Download source of one platform build of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSource {
    /// Download URL.
    pub url: String,
    /// Version of the binaries behind this URL.
    pub version: String,
    /// Expected SHA256 of the artifact (lowercase hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Explicit archive format, when the URL does not reveal it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArchiveFormat>,
}

impl ToolSource {
    /// Create a source without checksum.
    #[must_use]
    pub fn new(url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: version.into(),
            sha256: None,
            format: None,
        }
    }

    /// Set the expected SHA256.
    #[must_use]
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    /// Set an explicit archive format.
    #[must_use]
    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// File name of the artifact: the last URL path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        let path = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.url.as_str());
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Archive format, explicit or derived from the file name.
    #[must_use]
    pub fn archive_format(&self) -> Option<ArchiveFormat> {
        self.format
            .or_else(|| ArchiveFormat::from_file_name(self.file_name()))
    }
}
