use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use matchcheck::commands::{
    list_backends_command, progress_command, verify_command, ProgressArgs, VerifyArgs,
};

/// Instruction-level match checker for decompilation projects.
///
/// This CLI is a thin wrapper around `matchcheck-core`. All substantive logic
/// lives in the library so it can be tested thoroughly and reused from other
/// frontends.
#[derive(Parser, Debug)]
#[command(
    name = "matchcheck",
    version,
    about = "Verify rebuilt functions against a reference binary",
    long_about = None
)]
struct Cli {
    /// Show debug logs on stderr (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare every registered function against its rebuilt object.
    ///
    /// Prints one line per function (OK, FAIL, SKIP, HW) and a summary. Exits
    /// non-zero when any function fails to match.
    Verify(VerifyArgs),

    /// Summarize progress from the registry alone, without comparing bytes.
    Progress(ProgressArgs),

    /// List the extraction backends compiled into this binary.
    Backends {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new()
        .filter_module("matchcheck_core", level)
        .filter_module("matchcheck", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match &cli.command {
        Command::Verify(args) => {
            let report = verify_command(args)?;
            if report.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Progress(args) => {
            progress_command(args)?;
        }
        Command::Backends { json } => list_backends_command(*json)?,
    }

    Ok(ExitCode::SUCCESS)
}
