//! Platform targets.
//!
//! Binaries are built and downloaded separately per operating system; the
//! architecture is fixed by the upstream builds and is not modelled.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Operating system for which binaries are packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlatformTarget {
    /// Apple macOS.
    Darwin,
    /// Linux.
    Linux,
    /// Microsoft Windows.
    Windows,
}

impl PlatformTarget {
    /// All supported platforms, in packaging order.
    pub const ALL: [Self; 3] = [Self::Windows, Self::Linux, Self::Darwin];

    /// Canonical lowercase name, used for directory names and manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Get the platform the packager runs on, if it is a supported target.
    #[must_use]
    pub fn current() -> Option<Self> {
        match std::env::consts::OS {
            "macos" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Parse from string, accepting common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "darwin" | "macos" | "osx" | "mac" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            "windows" | "win" | "win32" | "win64" => Some(Self::Windows),
            _ => None,
        }
    }

    /// File name of an executable on this platform.
    #[must_use]
    pub fn executable_file_name(self, name: &str) -> String {
        match self {
            Self::Windows => format!("{name}.exe"),
            Self::Darwin | Self::Linux => name.to_string(),
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!("Unknown platform '{s}'. Expected one of: windows, linux, darwin")
        })
    }
}

// Hand-written so aliases are accepted and the type works as a map key in
// both TOML and JSON.
impl Serialize for PlatformTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlatformTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
