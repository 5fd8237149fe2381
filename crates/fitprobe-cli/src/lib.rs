//! Fitprobe CLI library
//!
//! Command-line front end for the fitprobe scenario suite. Configuration
//! comes from the environment (`BASE_URL`, `TEST_EMAIL`, `TEST_PASSWORD`,
//! `CHROMIUM_PATH`, `HEADLESS`) with flags layered on top.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;

use fitprobe::{NetworkInterception, ProbeConfig, ProbeError, SuiteReport};
use tracing::info;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, ListArgs, OutputFormatArg, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{catalogue, render_catalogue, render_report, ScenarioInfo};

/// Dispatch a parsed subcommand
pub fn execute(command: Commands, config: &CliConfig) -> CliResult<()> {
    match command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run(config, &args))
        }
        Commands::List(args) => {
            list(config, &args)?;
            Ok(())
        }
        Commands::InitScript => {
            println!("{}", init_script()?);
            Ok(())
        }
        Commands::Config(args) => {
            println!("{}", show_config(&args)?);
            Ok(())
        }
    }
}

/// Resolve the run configuration: environment first, then flags
pub fn probe_config(args: &RunArgs) -> CliResult<ProbeConfig> {
    let mut probe = ProbeConfig::from_env()?;
    if let Some(ref base_url) = args.base_url {
        probe = probe.with_base_url(base_url.as_str())?;
    }
    if args.headed {
        probe = probe.with_headless(false);
    }
    if args.no_sandbox {
        probe.browser = probe.browser.with_no_sandbox();
    }
    if let Some(ref path) = args.chromium_path {
        probe.browser = probe.browser.with_chromium_path(path.to_string_lossy());
    }
    if let Some(ms) = args.timeout {
        if ms == 0 {
            return Err(CliError::invalid_argument("--timeout must be positive"));
        }
        probe.timeouts.scenario_ms = ms;
    }
    Ok(probe)
}

/// Run the selected scenarios and print the report
pub async fn run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let probe = probe_config(args)?;
    info!(base_url = %probe.base_url, headless = probe.browser.headless, "starting suite");
    let report = run_suite(probe, args).await?;

    match args.format {
        OutputFormatArg::Json => println!("{}", report.to_json()?),
        OutputFormatArg::Text if !config.verbosity.is_quiet() => {
            print!("{}", render_report(&report, config.color.should_color()));
        }
        OutputFormatArg::Text => {}
    }
    if let Some(ref path) = args.output {
        tokio::fs::write(path, report.to_json()?).await?;
        info!(path = %path.display(), "report written");
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::SuiteFailed {
            failed: report.failed(),
            total: report.results.len(),
        })
    }
}

#[cfg(feature = "browser")]
async fn run_suite(probe: ProbeConfig, args: &RunArgs) -> CliResult<SuiteReport> {
    use fitprobe::{ChromiumLauncher, ScenarioRunner};

    let launcher = ChromiumLauncher::new(probe.browser.clone());
    let mut runner = ScenarioRunner::new(launcher, probe).with_fail_fast(args.fail_fast);
    if !args.scenarios.is_empty() {
        runner = runner.with_scenarios(args.scenarios.iter().copied());
    }
    if let Some(ref filter) = args.filter {
        runner = runner.with_filter(filter.as_str());
    }
    if runner.selected().is_empty() {
        return Err(CliError::invalid_argument("no scenario matches the selection"));
    }
    Ok(runner.run().await)
}

#[cfg(not(feature = "browser"))]
async fn run_suite(_probe: ProbeConfig, _args: &RunArgs) -> CliResult<SuiteReport> {
    Err(CliError::config(
        "browser support not enabled. Rebuild with --features browser",
    ))
}

/// Print the scenario catalogue
pub fn list(config: &CliConfig, args: &ListArgs) -> CliResult<()> {
    match args.format {
        OutputFormatArg::Json => {
            let json = serde_json::to_string_pretty(&catalogue()).map_err(ProbeError::from)?;
            println!("{json}");
        }
        OutputFormatArg::Text => print!("{}", render_catalogue(config.color.should_color())),
    }
    Ok(())
}

/// The interception script installed before a submission
pub fn init_script() -> CliResult<String> {
    Ok(NetworkInterception::recipe_submission().init_script()?)
}

/// Resolved configuration as JSON; the password is never serialized
pub fn show_config(args: &ConfigArgs) -> CliResult<String> {
    let mut probe = ProbeConfig::from_env()?;
    if let Some(ref base_url) = args.base_url {
        probe = probe.with_base_url(base_url.as_str())?;
    }
    Ok(serde_json::to_string_pretty(&probe).map_err(ProbeError::from)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_init_script_guards_reinstall() {
        let script = init_script().unwrap();
        assert!(script.contains("__fitprobeIntercept"));
        assert!(script.contains(fitprobe::MOCKED_RECIPE_ID));
    }

    #[test]
    fn test_probe_config_rejects_bad_base_url() {
        let args = RunArgs {
            base_url: Some("ftp://example.com".to_string()),
            ..RunArgs::default()
        };
        assert!(matches!(probe_config(&args), Err(CliError::Probe(_))));
    }

    #[test]
    fn test_probe_config_applies_flags() {
        let args = RunArgs {
            base_url: Some("https://preview.app.test".to_string()),
            headed: true,
            no_sandbox: true,
            timeout: Some(90_000),
            ..RunArgs::default()
        };
        let probe = probe_config(&args).unwrap();
        assert_eq!(probe.base_url, "https://preview.app.test/");
        assert!(!probe.browser.headless);
        assert!(!probe.browser.sandbox);
        assert_eq!(probe.timeouts.scenario_ms, 90_000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = RunArgs {
            base_url: Some("https://app.test".to_string()),
            timeout: Some(0),
            ..RunArgs::default()
        };
        assert!(matches!(
            probe_config(&args),
            Err(CliError::InvalidArgument { .. })
        ));
    }
}
