//! Log subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Install the global subscriber; `RUST_LOG` overrides the verbosity flags.
///
/// Logs go to stderr so stdout stays parseable for `--format json`.
pub fn init(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    // Fails only when a subscriber is already installed
    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.with_ansi(config.color.should_color()).try_init()
    };
}
