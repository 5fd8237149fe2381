//! Fitprobe CLI: end-to-end checks for the FitRecipes web app
//!
//! ## Usage
//!
//! ```bash
//! fitprobe list                              # Show the scenario catalogue
//! fitprobe run                               # Run every scenario
//! fitprobe run --filter recipe-detail        # Filter by name
//! fitprobe run -s submit-recipe-creates-recipe --format json -o report.json
//! fitprobe init-script                       # Print the interception script
//! ```

use clap::Parser;
use fitprobe_cli::{execute, logging, Cli, CliConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::from_cli(&cli);
    logging::init(&config);
    console::set_colors_enabled(config.color.should_color());

    match execute(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
