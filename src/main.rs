//! clawpm command-line entry point.

use clap::Parser;
use clawpm::cli::{self, App, Cli, Command};
use clawpm::error::PmError;
use clawpm::format::{OutputFormat, error_json, error_text, to_json};
use clawpm::logging::{self, LogTarget};
use std::process::ExitCode;
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let serving = matches!(cli.command, Command::Serve { .. });
    let level = logging::default_level(cli.verbose, serving);
    if let Err(e) = logging::init(&LogTarget::parse(&cli.log), level) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    let format = cli.format;
    let result = match App::from_cli(&cli) {
        Ok(app) => {
            debug!(command = ?cli.command, "Running command");
            let mut stdout = std::io::stdout().lock();
            cli::run(&app, cli.command, &mut stdout).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let err = PmError::from(e);
            match format {
                OutputFormat::Json => eprintln!("{}", to_json(&error_json(&err))),
                OutputFormat::Text => eprintln!("{}", error_text(&err)),
            }
            ExitCode::FAILURE
        }
    }
}
