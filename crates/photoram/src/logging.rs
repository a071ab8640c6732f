//! Logging initialization.
//!
//! All log output goes to stderr; stdout carries tagging results only.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `default_level`.
pub fn init(default_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` config section plus CLI flags.
///
/// `--verbose` wins over `--quiet`; quiet keeps warnings and errors only.
pub fn init_from_config(
    config: &photoram_core::Config,
    verbose: bool,
    json_logs: bool,
    quiet: bool,
) {
    let level = effective_level(&config.logging.level, verbose, quiet);
    let json_format = json_logs || config.logging.format == "json";
    init(level, json_format);
}

fn effective_level(configured: &str, verbose: bool, quiet: bool) -> &str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        match configured {
            "trace" | "debug" | "info" | "warn" | "error" => configured,
            _ => "info",
        }
    }
}
