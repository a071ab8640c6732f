//! photoram CLI - batch photo tagger with an open-set label vocabulary.
//!
//! Tags images with a pretrained classifier whose weights are verified
//! against pinned BLAKE3 digests before use. Results go to stdout (or a
//! file); logs and progress go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Tag a single image
//! photoram tag beach.jpg
//!
//! # Tag a directory tree as JSON Lines, with confidences
//! photoram tag ./album -r -f jsonl -c -o tags.jsonl
//!
//! # Fetch and verify the model
//! photoram models download
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use photoram_core::error::{
    CheckpointError, ConfigError, DiscoveryError, ModelError, PhotoramError, EXIT_INVALID_ARGS,
    EXIT_MODEL_ERROR, EXIT_NO_IMAGES, EXIT_RUNTIME_ERROR,
};

mod cli;
mod logging;

/// photoram - batch photo tagger.
#[derive(Parser, Debug)]
#[command(name = "photoram")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Tag one or more images or directories
    Tag(cli::tag::TagArgs),

    /// Download, verify and locate model checkpoints
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// Show version, device and checkpoint status
    Info,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go straight to stderr.
    let config = match photoram_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `photoram config path`."
            );
            photoram_core::Config::default()
        }
    };
    let quiet = matches!(&cli.command, Commands::Tag(args) if args.quiet);
    logging::init_from_config(&config, cli.verbose, cli.json_logs, quiet);

    tracing::debug!("photoram v{}", photoram_core::VERSION);

    let outcome = match cli.command {
        Commands::Tag(args) => cli::tag::execute(args).await,
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
        Commands::Info => cli::info::execute().await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

/// Map an error chain onto the documented exit codes.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<PhotoramError>() {
            return e.exit_code();
        }
        if cause.is::<ConfigError>() {
            return EXIT_INVALID_ARGS;
        }
        if cause.is::<DiscoveryError>() {
            return EXIT_NO_IMAGES;
        }
        if cause.is::<CheckpointError>() || cause.is::<ModelError>() {
            return EXIT_MODEL_ERROR;
        }
    }
    EXIT_RUNTIME_ERROR
}
