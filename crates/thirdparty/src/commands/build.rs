//! The default command: build the package.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use thirdparty_core::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use thirdparty_core::{AddonInfo, Config};
use thirdparty_fetch::{DownloadCache, HttpFetcher, HttpOptions};
use thirdparty_package::{BuildOptions, BuildReport, PackageBuilder, archive_path_for};

use super::CommandOutput;
use crate::cli::{BuildArgs, CliError};

/// Output location used when neither flag, environment nor config sets one.
pub const DEFAULT_OUTPUT_DIR: &str = "package";

/// Build settings after applying flags, environment, config and defaults,
/// in that order of precedence.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Archive to write.
    pub archive: PathBuf,
    /// Addon identity.
    pub addon: AddonInfo,
    /// HTTP client settings.
    pub http: HttpOptions,
    /// Download cache, unless disabled.
    pub cache: Option<DownloadCache>,
    /// Store raw archives under `private/`.
    pub include_archives: bool,
    /// Server content directory.
    pub server_dir: Option<PathBuf>,
    /// Client content directory.
    pub client_dir: Option<PathBuf>,
}

impl BuildSettings {
    /// Resolve the settings of a build.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero timeout.
    pub fn resolve(args: &BuildArgs, config: &Config) -> Result<Self, CliError> {
        let mut addon = config.addon();
        if let Some(name) = &args.addon_name {
            addon.name.clone_from(name);
        }
        if let Some(version) = &args.addon_version {
            addon.version.clone_from(version);
        }
        addon.validate()?;

        let output = args
            .output
            .clone()
            .or_else(|| config.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let archive = archive_path_for(&output, &addon);

        let timeout_secs = args
            .timeout
            .or(config.download.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let connect_timeout_secs = config
            .download
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        if timeout_secs == 0 || connect_timeout_secs == 0 {
            return Err(CliError::config_with_help(
                "Download timeouts must be greater than zero",
                "Set --timeout or download.timeout_secs to a positive number of seconds",
            ));
        }

        let http = HttpOptions {
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retries: args.retries.or(config.download.retries).unwrap_or(0),
            ..HttpOptions::default()
        };

        let use_cache = !args.no_cache && config.download.cache.unwrap_or(true);
        let cache = use_cache.then(|| {
            match args.cache_dir.as_ref().or(config.download.cache_dir.as_ref()) {
                Some(dir) => DownloadCache::new(dir.clone()),
                None => DownloadCache::default(),
            }
        });

        Ok(Self {
            archive,
            addon,
            http,
            cache,
            include_archives: args.include_archives,
            server_dir: args.server_dir.clone(),
            client_dir: args.client_dir.clone(),
        })
    }
}

/// Build the package.
///
/// # Errors
///
/// Returns an error if any required tool cannot be packaged; nothing is
/// written at the archive path in that case.
pub async fn execute(config: &Config, settings: BuildSettings) -> Result<CommandOutput, CliError> {
    let catalog = config.catalog();

    let mut fetcher = HttpFetcher::new(settings.http)?;
    if let Some(cache) = settings.cache {
        tracing::debug!(cache = %cache.root().display(), "Using download cache");
        fetcher = fetcher.with_cache(cache);
    }

    let options = BuildOptions::new(settings.archive, settings.addon)
        .with_archives(settings.include_archives)
        .with_server_dir(settings.server_dir)
        .with_client_dir(settings.client_dir);

    let report = PackageBuilder::new(&catalog, &fetcher, options)
        .build()
        .await?;

    let json = serde_json::to_value(&report)
        .map_err(|e| CliError::other(format!("Failed to serialize build report: {e}")))?;
    Ok(CommandOutput {
        text: render_report(&report),
        json,
    })
}

fn render_report(report: &BuildReport) -> String {
    let mut text = format!(
        "Package written: {} ({} bytes)\nsha256: {}\n",
        report.archive.display(),
        report.size,
        report.sha256
    );
    for (platform, tool, entry) in report.manifest.entries() {
        let _ = writeln!(text, "  {platform}/{tool} {}", entry.version);
    }
    for gap in report.gaps() {
        let _ = writeln!(text, "  {}/{} skipped: {}", gap.platform, gap.tool, gap.reason);
    }
    text
}
