//! thirdparty CLI application
//!
//! Builds the third-party binaries addon, lists the build plan and verifies
//! built packages.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write;
use thirdparty::cli::{self, CliError, EXIT_OK, OkEnvelope, exit_code_for, render_error};
use thirdparty::commands::{self, CommandOutput};
use thirdparty::tracing::{TracingConfig, init_tracing};

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
    };
    if let Err(e) = init_tracing(tracing_config) {
        render_error(&e, cli.json);
        std::process::exit(exit_code_for(&e));
    }

    let exit_code = run_with_tokio(&cli);
    std::process::exit(exit_code);
}

/// Create the tokio runtime and run the selected command
fn run_with_tokio(cli: &cli::Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let err = CliError::other(format!("Failed to create tokio runtime: {e}"));
            render_error(&err, cli.json);
            return exit_code_for(&err);
        }
    };

    match rt.block_on(commands::run(cli)) {
        Ok(output) => {
            print_output(&output, cli.json);
            EXIT_OK
        }
        Err(e) => {
            tracing::debug!(error = %e, "Command failed");
            render_error(&e, cli.json);
            exit_code_for(&e)
        }
    }
}

fn print_output(output: &CommandOutput, json_mode: bool) {
    if json_mode {
        match serde_json::to_string(&OkEnvelope::new(&output.json)) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing response: {e}"),
        }
    } else {
        print!("{}", output.text);
    }
    let _ = std::io::stdout().flush();
}
