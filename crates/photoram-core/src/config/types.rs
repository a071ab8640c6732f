//! Sub-configuration structs with defaults.

use crate::inference::{Activation, Device};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where checkpoint artifacts are cached
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.photoram/models"),
        }
    }
}

/// Input discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Recurse into subdirectories of directory inputs
    pub recursive: bool,

    /// Accepted file extensions (case-insensitive, without dot)
    pub supported_formats: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            supported_formats: [
                "jpg", "jpeg", "png", "tiff", "tif", "bmp", "webp", "heic", "heif", "gif",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Resource limits to protect against hostile or malformed inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum declared width x height accepted for decoding
    pub max_image_pixels: u64,

    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_pixels: 120_000_000,
            max_file_size_mb: 200,
            decode_timeout_ms: 10_000,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Square input resolution expected by the classifier
    pub image_size: u32,

    /// Compute device selection
    pub device: Device,

    /// Activation turning raw logits into confidences
    pub activation: Activation,

    /// Per-channel normalization mean (RGB)
    pub norm_mean: [f32; 3],

    /// Per-channel normalization std (RGB)
    pub norm_std: [f32; 3],

    /// Fixed artifact name of the ONNX weights
    pub weights_file: String,

    /// Fixed artifact name of the label list (one label per line)
    pub labels_file: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            device: Device::Auto,
            activation: Activation::Softmax,
            norm_mean: [0.5, 0.5, 0.5],
            norm_std: [0.5, 0.5, 0.5],
            weights_file: "vit_base_patch16_224_augreg_in21k.onnx".to_string(),
            labels_file: "imagenet21k_labels.txt".to_string(),
        }
    }
}

/// Checkpoint source and trust anchors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Artifact store root; artifacts are fetched from `{base_url}/{file}`
    pub base_url: String,

    /// Trusted BLAKE3 digest (hex) of the weights file
    pub weights_blake3: String,

    /// Trusted BLAKE3 digest (hex) of the label file
    pub labels_blake3: String,

    /// Whole-request download timeout in milliseconds
    pub download_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            weights_blake3: String::new(),
            labels_blake3: String::new(),
            download_timeout_ms: 900_000,
            connect_timeout_ms: 30_000,
        }
    }
}

/// Tagging and batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Minimum confidence for a tag to be kept (0.0 - 1.0)
    pub threshold: f32,

    /// Keep at most this many tags per image
    pub top_n: Option<usize>,

    /// Images per forward pass
    pub batch_size: usize,

    /// Tag override/translation JSON file
    pub overrides: Option<PathBuf>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.68,
            top_n: None,
            batch_size: 4,
            overrides: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: pretty or json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
