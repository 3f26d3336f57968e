//! `thirdparty verify`: check a built package against its manifest.

use std::fmt::Write as _;
use std::path::Path;
use thirdparty_package::verify_package;

use super::CommandOutput;
use crate::cli::CliError;

/// Verify a package archive.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or its contents do not
/// match the manifest.
pub fn execute(archive: &Path) -> Result<CommandOutput, CliError> {
    let contents = verify_package(archive)?;
    let manifest = &contents.manifest;

    let mut text = format!(
        "{}: {} {} ({} tools, {} files)\n",
        archive.display(),
        manifest.addon.name,
        manifest.addon.version,
        manifest.len(),
        contents.files.len()
    );
    for (platform, tool, entry) in manifest.entries() {
        let _ = writeln!(text, "  {platform}/{tool} {} ({})", entry.version, entry.source);
    }
    for gap in &manifest.gaps {
        let _ = writeln!(text, "  {}/{} skipped: {}", gap.platform, gap.tool, gap.reason);
    }

    let json = serde_json::json!({
        "archive": archive.display().to_string(),
        "files": contents.files.len(),
        "manifest": manifest,
    });
    Ok(CommandOutput { text, json })
}
