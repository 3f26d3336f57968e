//! Error types shared across the thirdparty workspace.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Result type for thirdparty operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can abort a package build.
///
/// Documented platform gaps are not errors; they are recorded in the
/// [`PackageManifest`](crate::PackageManifest) instead.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Download could not be completed.
    #[error("Download failed for {url}: {message}")]
    #[diagnostic(
        code(thirdparty::network),
        help("Check network connectivity and that the source URL is still published")
    )]
    Network {
        /// Source URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Downloaded or extracted artifact is malformed or incomplete.
    #[error("Verification failed for {artifact}: {message}")]
    #[diagnostic(code(thirdparty::verification))]
    Verification {
        /// Artifact file name.
        artifact: String,
        /// Error message.
        message: String,
    },

    /// Artifact checksum does not match the declared one.
    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(thirdparty::checksum),
        help("The upstream artifact changed; update the sha256 in the catalog after reviewing it")
    )]
    ChecksumMismatch {
        /// Artifact file name.
        artifact: String,
        /// Declared sha256.
        expected: String,
        /// Computed sha256.
        actual: String,
    },

    /// Archive could not be unpacked.
    #[error("Failed to extract {artifact}: {message}")]
    #[diagnostic(code(thirdparty::extraction))]
    Extraction {
        /// Artifact file name.
        artifact: String,
        /// Error message.
        message: String,
    },

    /// Invalid configuration or catalog.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(thirdparty::config))]
    Configuration {
        /// Error message.
        message: String,
        /// Optional help text.
        #[help]
        help: Option<String>,
    },

    /// Manifest is unreadable or does not match the package contents.
    #[error("Manifest error: {message}")]
    #[diagnostic(code(thirdparty::manifest))]
    Manifest {
        /// Error message.
        message: String,
    },

    /// I/O error with optional path context.
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(thirdparty::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available.
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create").
        operation: String,
    },
}

impl Error {
    /// Create a network error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a verification error.
    #[must_use]
    pub fn verification(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Verification {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error.
    #[must_use]
    pub fn checksum_mismatch(
        artifact: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            artifact: artifact.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an extraction error.
    #[must_use]
    pub fn extraction(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text.
    #[must_use]
    pub fn configuration_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a manifest error.
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Whether the error came from the network and may succeed on retry.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "operation".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::manifest(format!("invalid JSON: {err}"))
    }
}
