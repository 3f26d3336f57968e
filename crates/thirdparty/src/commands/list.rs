//! `thirdparty list`: show what a build would package.

use serde::Serialize;
use std::fmt::Write as _;
use thirdparty_core::tools::PlanEntry;
use thirdparty_core::{AddonInfo, Config, PlatformTarget};

use super::CommandOutput;
use crate::cli::CliError;

/// One row of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    /// Target platform.
    pub platform: PlatformTarget,
    /// Tool name.
    pub tool: String,
    /// Packaged version, absent for gaps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Download URL, absent for gaps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Whether the pair is a documented gap.
    pub gap: bool,
}

#[derive(Debug, Serialize)]
struct Listing {
    addon: AddonInfo,
    current_platform: Option<PlatformTarget>,
    entries: Vec<ListEntry>,
}

/// List the build plan.
///
/// # Errors
///
/// Returns a configuration error if the catalog is invalid.
pub fn execute(config: &Config) -> Result<CommandOutput, CliError> {
    let catalog = config.catalog();
    catalog.validate()?;

    let entries: Vec<ListEntry> = catalog
        .plan()?
        .into_iter()
        .map(|entry| match entry {
            PlanEntry::Fetch {
                platform,
                tool,
                source,
            } => ListEntry {
                platform,
                tool: tool.name.clone(),
                version: Some(source.version.clone()),
                url: Some(source.url.clone()),
                gap: false,
            },
            PlanEntry::Gap { platform, tool } => ListEntry {
                platform,
                tool: tool.name.clone(),
                version: None,
                url: None,
                gap: true,
            },
        })
        .collect();

    let listing = Listing {
        addon: config.addon(),
        current_platform: PlatformTarget::current(),
        entries,
    };

    let json = serde_json::to_value(&listing)
        .map_err(|e| CliError::other(format!("Failed to serialize listing: {e}")))?;
    Ok(CommandOutput {
        text: render(&listing),
        json,
    })
}

fn render(listing: &Listing) -> String {
    let mut text = format!("{} {}\n", listing.addon.name, listing.addon.version);
    for entry in &listing.entries {
        let marker = if Some(entry.platform) == listing.current_platform {
            '*'
        } else {
            ' '
        };
        let status = entry.version.as_deref().unwrap_or("not available");
        let _ = writeln!(
            text,
            "{marker} {:<8} {:<8} {status}",
            entry.platform.as_str(),
            entry.tool
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_listing() {
        let output = execute(&Config::default()).unwrap();

        let entries = output.json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 6);

        let gaps: Vec<_> = entries.iter().filter(|e| e["gap"] == true).collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0]["platform"], "darwin");
        assert_eq!(gaps[0]["tool"], "oiio");
        assert!(gaps[0].get("version").is_none());

        assert!(output.text.contains("darwin   oiio     not available"));
        assert!(output.text.contains("linux    ffmpeg   4.4"));
    }

    #[test]
    fn test_platform_filter() {
        let config = Config::from_toml("platforms = [\"windows\"]\n").unwrap();
        let output = execute(&config).unwrap();
        let entries = output.json["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e["platform"] == "windows"));
    }
}
