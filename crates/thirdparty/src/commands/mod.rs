//! Command implementations.
//!
//! Every command returns a [`CommandOutput`]; `main` decides whether the text
//! or the JSON form is printed.

pub mod build;
pub mod list;
pub mod verify;

use std::path::{Path, PathBuf};
use thirdparty_core::{Config, Error};
use tracing::Instrument;

use crate::cli::{Cli, CliError, Commands};
use crate::command_span;

/// Result of a command, in human and machine readable form.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Text printed on stdout in normal mode.
    pub text: String,
    /// Payload of the JSON envelope in `--json` mode.
    pub json: serde_json::Value,
}

/// Run the command selected on the command line.
///
/// `verify` only reads the archive it is given, so the configuration is
/// loaded for `build` and `list` alone.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command fails.
pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    match &cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let settings = build::BuildSettings::resolve(&cli.build, &config)?;
            build::execute(&config, settings)
                .instrument(command_span!("build"))
                .await
        }
        Some(Commands::List) => {
            let _span = command_span!("list").entered();
            let config = load_config(cli.config.as_deref())?;
            list::execute(&config)
        }
        Some(Commands::Verify { archive }) => {
            let _span = command_span!(
                "verify",
                archive = tracing::field::display(archive.display())
            )
            .entered();
            verify::execute(archive)
        }
    }
}

/// Load the configuration.
///
/// An explicit path must exist. Without one, `thirdparty.toml` in the working
/// directory is used when present, otherwise the built-in defaults.
///
/// # Errors
///
/// Returns a configuration error if the file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, CliError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config()?,
    };

    let Some(path) = path else {
        tracing::debug!("No configuration file, using built-in defaults");
        return Ok(Config::default());
    };

    Config::load(&path).map_err(|e| match e {
        Error::Io { source, .. } => CliError::config_with_help(
            format!("Cannot read configuration file {}: {source}", path.display()),
            "Pass an existing file with --config or unset THIRDPARTY_CONFIG",
        ),
        other => CliError::from(other),
    })
}

fn discover_config() -> Result<Option<PathBuf>, CliError> {
    let cwd = std::env::current_dir()
        .map_err(|e| CliError::other(format!("Cannot determine working directory: {e}")))?;
    Ok(Config::discover(&cwd))
}
