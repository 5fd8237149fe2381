//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use fitprobe::ScenarioId;
use std::path::PathBuf;

/// Fitprobe: end-to-end checks for the FitRecipes web app
#[derive(Parser, Debug)]
#[command(name = "fitprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios against a deployment
    Run(RunArgs),

    /// List the scenario catalogue
    List(ListArgs),

    /// Print the network interception init script
    InitScript,

    /// Show the resolved configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Run only scenarios whose name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Run exactly these scenarios (repeatable)
    #[arg(short, long = "scenario", value_parser = parse_scenario)]
    pub scenarios: Vec<ScenarioId>,

    /// Deployment to test (overrides BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium binary (overrides CHROMIUM_PATH)
    #[arg(long)]
    pub chromium_path: Option<PathBuf>,

    /// Per-scenario budget in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Stop after the first failed scenario
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormatArg,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the list command
#[derive(Parser, Debug, Default)]
pub struct ListArgs {
    /// Output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormatArg,
}

/// Arguments for the config command
#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Deployment to inspect (overrides BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Auto-detect terminal support
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn parse_scenario(name: &str) -> Result<ScenarioId, String> {
    ScenarioId::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = ScenarioId::ALL.iter().map(|id| id.name()).collect();
        format!("unknown scenario '{name}', expected one of: {}", known.join(", "))
    })
}
