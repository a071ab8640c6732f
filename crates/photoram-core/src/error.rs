//! Error types for the photoram tagging pipeline.
//!
//! Run-level failures (`PhotoramError`) abort the whole call and carry an exit
//! code. Per-item failures (`LoadError`, `InferenceError`) are recovered by the
//! service and recorded on the affected `TagResult` instead.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// No readable images were found for the given inputs.
pub const EXIT_NO_IMAGES: i32 = 1;
/// Invalid arguments or configuration.
pub const EXIT_INVALID_ARGS: i32 = 2;
/// Model or checkpoint could not be made ready.
pub const EXIT_MODEL_ERROR: i32 = 3;
/// Any other runtime failure.
pub const EXIT_RUNTIME_ERROR: i32 = 4;

/// Top-level error type for photoram operations.
#[derive(Error, Debug)]
pub enum PhotoramError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Nothing to tag
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Checkpoint acquisition or integrity errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Model construction errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PhotoramError {
    /// Exit code the binary should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_INVALID_ARGS,
            Self::Discovery(_) => EXIT_NO_IMAGES,
            Self::Checkpoint(_) | Self::Model(_) => EXIT_MODEL_ERROR,
            Self::Io(_) | Self::Json(_) => EXIT_RUNTIME_ERROR,
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Tag override file exists but cannot be used
    #[error("Invalid override file {path}: {message}")]
    Overrides { path: PathBuf, message: String },
}

/// Errors raised while turning user inputs into image tasks.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No supported images found in {} input path(s). Supported formats: {formats}", .inputs.len())]
    NoImages {
        inputs: Vec<PathBuf>,
        formats: String,
    },
}

/// Checkpoint acquisition errors. All of these are fatal for the run.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Network or storage failure while fetching an artifact
    #[error("Download of {file_name} failed: {message}")]
    Download { file_name: String, message: String },

    /// Digest mismatch persisted after the single permitted re-download
    #[error("Integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// No trusted digest is configured for an artifact
    #[error("No trusted BLAKE3 digest configured for {file_name} (set checkpoint.{key})")]
    MissingDigest { file_name: String, key: String },

    /// No artifact store is configured but the artifact is not cached
    #[error("{file_name} is not cached and checkpoint.base_url is not set")]
    MissingSource { file_name: String },

    /// Local filesystem failure around the cache
    #[error("Checkpoint I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors constructing the classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    /// ONNX session or label file could not be loaded
    #[error("Failed to load model from {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Requested compute device is not usable
    #[error("Device error: {0}")]
    Device(String),
}

/// Per-image load failure. Recorded on the image's result; never aborts a batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Path does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Path exists but cannot be read as a regular file
    #[error("Cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    /// Zero-byte file
    #[error("Empty file: {0}")]
    Empty(PathBuf),

    /// File exceeds the configured byte ceiling
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Declared dimensions exceed the pixel ceiling (decompression bomb guard)
    #[error("Image rejected for safety: {path} is {width}x{height} ({pixels} pixels; maximum allowed is {max_pixels})")]
    TooManyPixels {
        path: PathBuf,
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
    },

    /// Not decodable as a supported raster image
    #[error("Failed to decode {path}: {message}")]
    Undecodable { path: PathBuf, message: String },

    /// Decode did not finish in time
    #[error("Decode of {path} timed out after {timeout_ms}ms")]
    Timeout { path: PathBuf, timeout_ms: u64 },
}

/// Failure of a classifier forward pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Device/runtime failure (e.g., out of memory)
    #[error("Inference failed: {0}")]
    Runtime(String),

    /// Inputs could not be stacked into a batch tensor
    #[error("Input tensor shape mismatch: {0}")]
    InputShape(String),

    /// Classifier output does not align with the batch
    #[error("Unexpected classifier output: {0}")]
    OutputShape(String),

    /// The blocking inference task panicked
    #[error("Inference task aborted: {0}")]
    Aborted(String),
}

/// Failure writing tags into an image's metadata. Reported per image only.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The metadata tool could not be started
    #[error("{program} is not installed or not executable: {message}")]
    NotInstalled { program: String, message: String },

    /// The tool ran and reported failure
    #[error("{program} failed on {path} (exit code {code:?}): {stderr}")]
    Failed {
        program: String,
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Convenience type alias for photoram results.
pub type Result<T> = std::result::Result<T, PhotoramError>;
