use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Build, network, verification or I/O error exit code
pub const EXIT_BUILD: i32 = 3;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(thirdparty::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Package build failure (exit code 3)
    #[error("Build failed: {message}")]
    #[diagnostic(code(thirdparty::cli::build))]
    Build {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(thirdparty::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new build error
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Add help text to an existing error, returning a new error with the help text set.
    #[must_use]
    pub fn with_help(self, help_text: impl Into<String>) -> Self {
        let help = Some(help_text.into());
        match self {
            Self::Config { message, .. } => Self::Config { message, help },
            Self::Build { message, .. } => Self::Build { message, help },
            Self::Other { message, .. } => Self::Other { message, help },
        }
    }
}

/// Convert `thirdparty_core::Error` to the matching `CliError` variant.
///
/// - Configuration errors -> Config (exit code 2)
/// - Network, verification, checksum, extraction and manifest errors -> Build (exit code 3)
/// - I/O errors -> Other (exit code 3)
impl From<thirdparty_core::Error> for CliError {
    fn from(err: thirdparty_core::Error) -> Self {
        let help = err.help().map(|h| h.to_string());
        let converted = match err {
            // Extract just the message to avoid "configuration error: Configuration error:"
            thirdparty_core::Error::Configuration { message, .. } => Self::config(message),
            thirdparty_core::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::other(format!("I/O {operation} failed{path_str}: {source}"))
            }
            thirdparty_core::Error::Network { .. }
            | thirdparty_core::Error::Verification { .. }
            | thirdparty_core::Error::ChecksumMismatch { .. }
            | thirdparty_core::Error::Extraction { .. }
            | thirdparty_core::Error::Manifest { .. } => Self::build(err.to_string()),
        };
        match help {
            Some(help) => converted.with_help(help),
            None => converted,
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Build { .. } | CliError::Other { .. } => EXIT_BUILD,
    }
}

/// Render error appropriately based on JSON flag
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Build { .. } => "build",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Packages ffmpeg and OpenImageIO binaries into an installable addon.
///
/// Without a subcommand the package is built.
#[derive(Parser, Debug)]
#[command(name = "thirdparty")]
#[command(about = "Package ffmpeg and OpenImageIO binaries into an installable addon")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Build options, used when no subcommand is given.
    #[command(flatten)]
    pub build: BuildArgs,

    /// Configuration file.
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "THIRDPARTY_CONFIG",
        value_name = "FILE",
        help = "Configuration file (default: ./thirdparty.toml when present)"
    )]
    pub config: Option<PathBuf>,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "info",
        value_enum
    )]
    pub level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    /// Emit JSON envelope on stdout.
    #[arg(long, global = true, help = "Emit JSON envelope on stdout")]
    pub json: bool,
}

/// Options of the build command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArgs {
    /// Output archive path, or directory receiving `<addon>-<version>.zip`.
    #[arg(
        short = 'o',
        long,
        env = "THIRDPARTY_OUTPUT",
        value_name = "PATH",
        help = "Output archive (.zip) or directory (default: package)"
    )]
    pub output: Option<PathBuf>,

    /// Store raw archives and files_info.json in the package.
    #[arg(long, help = "Store raw downloaded archives and files_info.json under private/")]
    pub include_archives: bool,

    /// Server content directory.
    #[arg(long, value_name = "DIR", help = "Copy this directory into server/")]
    pub server_dir: Option<PathBuf>,

    /// Client content directory.
    #[arg(long, value_name = "DIR", help = "Zip this directory into private/client.zip")]
    pub client_dir: Option<PathBuf>,

    /// Disable the download cache.
    #[arg(long, help = "Do not read or populate the download cache")]
    pub no_cache: bool,

    /// Download cache directory.
    #[arg(long, value_name = "DIR", help = "Download cache directory")]
    pub cache_dir: Option<PathBuf>,

    /// Download timeout in seconds.
    #[arg(long, value_name = "SECS", help = "Whole-request download timeout in seconds")]
    pub timeout: Option<u64>,

    /// Additional attempts after a network failure.
    #[arg(long, value_name = "N", help = "Retry failed downloads up to N times")]
    pub retries: Option<u32>,

    /// Addon name override.
    #[arg(long, value_name = "NAME", help = "Addon name")]
    pub addon_name: Option<String>,

    /// Addon version override.
    #[arg(long, value_name = "VERSION", help = "Addon version")]
    pub addon_version: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the platforms, tools and versions that would be packaged.
    #[command(about = "Show the platforms, tools and versions that would be packaged")]
    List,
    /// Check a built package against its manifest.
    #[command(about = "Check a built package against its manifest")]
    Verify {
        /// Package archive to check.
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

/// Parse command line arguments into a CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["thirdparty"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.level, LogLevel::Info);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        assert!(!cli.json);
        assert!(!cli.build.include_archives);
        assert!(!cli.build.no_cache);
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "thirdparty",
            "-o",
            "dist/addon.zip",
            "--include-archives",
            "--retries",
            "2",
            "--timeout",
            "60",
            "--no-cache",
            "-L",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.build.output.as_deref(), Some(Path::new("dist/addon.zip")));
        assert!(cli.build.include_archives);
        assert_eq!(cli.build.retries, Some(2));
        assert_eq!(cli.build.timeout, Some(60));
        assert!(cli.build.no_cache);
        assert_eq!(cli.level, LogLevel::Debug);
    }

    #[test]
    fn test_subcommands_accept_global_flags() {
        let cli = Cli::try_parse_from(["thirdparty", "list", "--json"]).unwrap();
        assert_eq!(cli.command, Some(Commands::List));
        assert!(cli.json);

        let cli = Cli::try_parse_from(["thirdparty", "verify", "pkg.zip", "-c", "cfg.toml"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Verify {
                archive: PathBuf::from("pkg.zip")
            })
        );
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
    }

    #[test]
    fn test_verify_requires_archive() {
        assert!(Cli::try_parse_from(["thirdparty", "verify"]).is_err());
    }

    #[test]
    fn test_error_mapping() {
        let err: CliError = thirdparty_core::Error::configuration("bad").into();
        assert_eq!(exit_code_for(&err), EXIT_CLI);
        assert_eq!(err.to_string(), "CLI/configuration error: bad");

        let err: CliError = thirdparty_core::Error::network("https://x/a.zip", "HTTP 404").into();
        assert_eq!(exit_code_for(&err), EXIT_BUILD);
        assert!(matches!(err, CliError::Build { help: Some(_), .. }));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CliError = thirdparty_core::Error::io(io, "/tmp/x", "open").into();
        assert_eq!(exit_code_for(&err), EXIT_BUILD);
        assert!(err.to_string().contains("I/O open failed on /tmp/x: gone"));
    }

    #[test]
    fn test_envelopes() {
        let ok = serde_json::to_value(OkEnvelope::new(1)).unwrap();
        assert_eq!(ok["status"], "ok");
        let err = serde_json::to_value(ErrorEnvelope::new("x")).unwrap();
        assert_eq!(err["status"], "error");
    }
}
