//! Builds the thirdparty addon package.
//!
//! [`PackageBuilder`] fetches every tool of a catalog for every platform,
//! arranges the binaries as `<platform>/<tool>/…`, adds addon content and a
//! `manifest.json`, and writes one deterministic zip archive.
//!
//! # Example
//!
//! ```ignore
//! use thirdparty_package::{BuildOptions, PackageBuilder};
//!
//! let fetcher = HttpFetcher::new(HttpOptions::default())?;
//! let options = BuildOptions::new("package/addon-1.0.0.zip", addon);
//! let report = PackageBuilder::new(&catalog, &fetcher, options).build().await?;
//! println!("{} ({} bytes)", report.archive.display(), report.size);
//! ```

#![warn(missing_docs)]

pub mod archive;
mod builder;
mod inspect;
pub mod layout;

pub use builder::{BuildOptions, BuildReport, PackageBuilder, archive_path_for};
pub use inspect::{PackageContents, read_package, verify_package};
