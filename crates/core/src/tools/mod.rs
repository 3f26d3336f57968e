//! Tool definitions and the packaging catalog.
//!
//! # Architecture
//!
//! - [`ToolSource`] - Where one platform build of a tool is downloaded from
//! - [`ArchiveFormat`] - Container format of a downloaded artifact
//! - [`ToolArtifact`] - A named tool with its per-platform sources
//! - [`Catalog`] - Platforms and tools to package, and the build plan
//!
//! # Example
//!
//! ```ignore
//! use thirdparty_core::tools::{Catalog, PlanEntry};
//!
//! let catalog = Catalog::builtin();
//! catalog.validate()?;
//! for entry in catalog.plan()? {
//!     match entry {
//!         PlanEntry::Fetch { platform, tool, source } => { /* download */ }
//!         PlanEntry::Gap { platform, tool } => { /* record gap */ }
//!     }
//! }
//! ```

mod artifact;
mod catalog;
mod source;

pub use artifact::ToolArtifact;
pub use catalog::{Catalog, DISTRIBUTE_SOURCE_URL, PlanEntry, is_safe_segment};
pub use source::{ArchiveFormat, ToolSource};
