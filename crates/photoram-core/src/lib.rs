//! Photoram Core - batch photo tagging library.
//!
//! Tags photographs with labels from a large open-set vocabulary using a
//! pretrained image classifier, safely, over directories that may contain
//! hostile or malformed files.
//!
//! # Architecture
//!
//! ```text
//! inputs → discover → plan windows → safe load (per image) → infer (per window)
//!        → threshold / sort / top-N / overrides → ordered results
//! ```
//!
//! Checkpoints are verified against trusted BLAKE3 digests before the model
//! is constructed. Per-image failures are recorded on that image's result and
//! never abort a run.
//!
//! # Usage
//!
//! ```rust,ignore
//! use photoram_core::{Config, TaggingService};
//!
//! #[tokio::main]
//! async fn main() -> photoram_core::Result<()> {
//!     let config = Config::load()?;
//!     let service = TaggingService::initialize(config).await?;
//!
//!     let run = service.tag(&["./album".into()]).await?;
//!     for result in &run.results.results {
//!         println!("{}: {:?}", result.file_path.display(), result.tag_names());
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod inference;
pub mod math;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod service;
pub mod tagging;
pub mod types;

// Re-exports for convenient access
pub use checkpoint::{CheckpointManager, ChecksumVerifier, ReadyCheckpoint};
pub use config::Config;
pub use error::{
    CheckpointError, ConfigError, DiscoveryError, InferenceError, LoadError, PhotoramError, Result,
};
pub use inference::{Classifier, Device, InferenceEngine, LabelSet, ResolvedDevice};
pub use metadata::ExifToolWriter;
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{BatchPlanner, SafeImageLoader};
pub use service::{ProgressEvent, TagRun, TaggingService};
pub use tagging::OverrideMap;
pub use types::{BatchResult, FailureKind, ImageTask, RunStats, TagFailure, TagPrediction, TagResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
