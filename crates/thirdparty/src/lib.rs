// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

//! thirdparty - packager for the ffmpeg and OpenImageIO addon
//!
//! Downloads the pinned third-party builds for every supported platform,
//! verifies and extracts them into `<platform>/<tool>/`, and writes one
//! deterministic zip with a `manifest.json` describing its contents.
//!
//! The library half exposes the command-line surface so it can be driven
//! from tests:
//!
//! ```ignore
//! let cli = thirdparty::cli::parse();
//! let output = thirdparty::commands::run(&cli).await?;
//! println!("{}", output.text);
//! ```

pub mod cli;
pub mod commands;
pub mod tracing;
