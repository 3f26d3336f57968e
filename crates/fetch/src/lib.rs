//! Artifact acquisition for the thirdparty packager.
//!
//! This crate provides functionality to:
//! - Download tool archives over HTTP ([`HttpFetcher`])
//! - Reuse previously downloaded archives by checksum ([`DownloadCache`])
//! - Verify archives before use ([`verify_artifact`])
//! - Unpack archives atomically and locate executables ([`extract_archive`],
//!   [`find_executables`])
//!
//! # Example
//!
//! ```ignore
//! use thirdparty_fetch::{ArtifactFetcher, FetchRequest, HttpFetcher, HttpOptions};
//!
//! let fetcher = HttpFetcher::new(HttpOptions::default())?;
//! let fetched = fetcher.fetch(&FetchRequest::new(platform, "ffmpeg", source), &downloads).await?;
//! let verified = verify_artifact(&fetched.path, source)?;
//! extract_archive(&fetched.path, verified.format, &dest)?;
//! ```

#![warn(missing_docs)]

mod cache;
mod extract;
mod http;
mod provider;
mod verify;

pub use cache::DownloadCache;
pub use extract::{extract_archive, find_executables};
pub use http::{HttpFetcher, HttpOptions};
pub use provider::{ArtifactFetcher, FetchRequest, FetchedArtifact};
pub use verify::{VerifiedArtifact, sha256_file, verify_artifact};
