//! Core types for the thirdparty addon packager.
//!
//! This crate holds the data model shared by the fetch, package and CLI
//! crates:
//! - [`PlatformTarget`] and the [`tools`] catalog describing what to download
//! - [`PackageManifest`] describing what a built package contains
//! - [`Config`] read from `thirdparty.toml`
//! - the workspace-wide [`Error`] type
//!
//! # Example
//!
//! ```ignore
//! use thirdparty_core::{Config, PackageManifest};
//!
//! let config = Config::load(Path::new("thirdparty.toml"))?;
//! let catalog = config.catalog();
//! catalog.validate()?;
//!
//! let manifest = PackageManifest::load(Path::new("package/manifest.json"))?;
//! manifest.verify_layout(Path::new("package"))?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod manifest;
pub mod platform;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
pub use manifest::{AddonInfo, FileInfo, GapEntry, PackageManifest, ToolEntry};
pub use platform::PlatformTarget;
