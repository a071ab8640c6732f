//! The `photoram models` command for managing classifier checkpoints.

use std::sync::Arc;

use clap::{Args, Subcommand};
use photoram_core::checkpoint::{ensure_model_artifacts, ArtifactSpec, HttpFetcher};
use photoram_core::error::CheckpointError;
use photoram_core::{ChecksumVerifier, Config, PhotoramError};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download missing artifacts and verify them against the pinned digests
    Download,

    /// Check cached artifacts against the pinned digests without downloading
    Verify,

    /// Show model directory path
    Path,
}

/// Local status of one cached artifact.
#[derive(Debug, PartialEq)]
enum ArtifactStatus {
    Missing,
    Unpinned { digest: String },
    Verified,
    Mismatch { actual: String },
}

fn check_artifact(config: &Config, spec: &ArtifactSpec) -> Result<ArtifactStatus, CheckpointError> {
    let path = config.model_dir().join(&spec.file_name);
    if !path.is_file() {
        return Ok(ArtifactStatus::Missing);
    }
    if spec.blake3.is_empty() {
        let digest =
            ChecksumVerifier::digest_hex(&path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        return Ok(ArtifactStatus::Unpinned { digest });
    }
    match ChecksumVerifier::verify(&path, &spec.blake3) {
        Ok(_) => Ok(ArtifactStatus::Verified),
        Err(CheckpointError::Integrity { actual, .. }) => Ok(ArtifactStatus::Mismatch { actual }),
        Err(e) => Err(e),
    }
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs) -> anyhow::Result<()> {
    let config = Config::load().map_err(PhotoramError::from)?;

    match args.command {
        ModelsCommand::Download => {
            config.validate().map_err(PhotoramError::from)?;
            let fetcher = Arc::new(HttpFetcher::new(&config.checkpoint).map_err(PhotoramError::from)?);
            let artifacts = ensure_model_artifacts(&config, fetcher)
                .await
                .map_err(PhotoramError::from)?;

            for ready in [&artifacts.weights, &artifacts.labels] {
                let size = std::fs::metadata(ready.local_path())
                    .map(|m| m.len())
                    .unwrap_or(0);
                println!(
                    "ready  {}  ({:.1} MB, blake3 {})",
                    ready.local_path().display(),
                    size as f64 / (1024.0 * 1024.0),
                    ready.digest()
                );
            }
        }

        ModelsCommand::Verify => {
            let mut mismatched = None;

            for spec in [ArtifactSpec::weights(&config), ArtifactSpec::labels(&config)] {
                let status = check_artifact(&config, &spec).map_err(PhotoramError::from)?;
                match &status {
                    ArtifactStatus::Missing => {
                        println!("{:24} not installed", spec.file_name);
                    }
                    ArtifactStatus::Unpinned { digest } => {
                        println!(
                            "{:24} present, no pinned digest (set checkpoint.{} = \"{}\")",
                            spec.file_name, spec.digest_key, digest
                        );
                    }
                    ArtifactStatus::Verified => {
                        println!("{:24} ok", spec.file_name);
                    }
                    ArtifactStatus::Mismatch { actual } => {
                        println!("{:24} MISMATCH (got {})", spec.file_name, actual);
                        mismatched.get_or_insert(CheckpointError::Integrity {
                            path: config.model_dir().join(&spec.file_name),
                            expected: spec.blake3.clone(),
                            actual: actual.clone(),
                        });
                    }
                }
            }

            if let Some(err) = mismatched {
                return Err(PhotoramError::from(err).into());
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}
