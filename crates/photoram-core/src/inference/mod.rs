//! Classifier wrapper: device placement, batching and label lookup.
//!
//! The forward pass is behind the `Classifier` trait so the orchestration
//! layer never depends on a concrete runtime. `OnnxClassifier` is the
//! production implementation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use photoram_core::inference::InferenceEngine;
//!
//! let engine = InferenceEngine::load(&artifacts, &config.model)?;
//! let confidences = engine.infer(&decoded_window)?;
//! ```

pub mod labels;
pub mod onnx;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array4, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::checkpoint::ModelArtifacts;
use crate::config::ModelConfig;
use crate::error::{InferenceError, ModelError};
use crate::pipeline::DecodedImage;

pub use labels::LabelSet;
pub use onnx::OnnxClassifier;

/// Opaque forward pass: `[N, 3, H, W]` tensor to `[N, classes]` confidences.
///
/// Implementations must be deterministic for identical inputs and weights.
pub trait Classifier: Send + Sync {
    fn forward(&self, batch: &Array4<f32>) -> Result<Array2<f32>, InferenceError>;
}

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Best available accelerator, else CPU
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "cuda", alias = "mps", alias = "gpu")]
    Accelerator,
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "accelerator" | "cuda" | "mps" | "gpu" => Ok(Self::Accelerator),
            other => Err(format!(
                "unknown device '{other}' (expected auto, cpu or accelerator)"
            )),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Accelerator => "accelerator",
        })
    }
}

/// Device the model actually runs on, fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedDevice {
    Cpu,
    Cuda,
    #[serde(rename = "coreml")]
    CoreMl,
}

impl fmt::Display for ResolvedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::CoreMl => "coreml",
        })
    }
}

impl Device {
    /// Pick a concrete device. `detect` reports the best usable accelerator.
    ///
    /// An explicit accelerator request with nothing available is an error
    /// rather than a silent CPU fallback.
    pub fn resolve(
        self,
        detect: impl FnOnce() -> Option<ResolvedDevice>,
    ) -> Result<ResolvedDevice, ModelError> {
        match self {
            Self::Cpu => Ok(ResolvedDevice::Cpu),
            Self::Auto => Ok(detect().unwrap_or(ResolvedDevice::Cpu)),
            Self::Accelerator => detect().ok_or_else(|| {
                ModelError::Device("accelerator requested but none is available".to_string())
            }),
        }
    }
}

/// Ask ONNX Runtime which accelerator execution providers are usable.
pub fn detect_accelerator() -> Option<ResolvedDevice> {
    use ort::execution_providers::{
        CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider,
    };

    if CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
    {
        return Some(ResolvedDevice::Cuda);
    }
    if cfg!(target_vendor = "apple")
        && CoreMLExecutionProvider::default()
            .is_available()
            .unwrap_or(false)
    {
        return Some(ResolvedDevice::CoreMl);
    }
    None
}

/// Maps raw classifier outputs to confidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Softmax,
    Sigmoid,
    /// Outputs are already confidences
    #[serde(rename = "none")]
    Identity,
}

impl Activation {
    pub fn apply(self, row: &mut [f32]) {
        match self {
            Self::Softmax => crate::math::softmax_in_place(row),
            Self::Sigmoid => crate::math::sigmoid_in_place(row),
            Self::Identity => {}
        }
    }
}

/// Owns the resident classifier and its label set.
///
/// Constructed once per service and passed in explicitly; there is no
/// process-wide model.
pub struct InferenceEngine {
    classifier: Box<dyn Classifier>,
    labels: LabelSet,
    device: ResolvedDevice,
}

impl InferenceEngine {
    /// Build the production engine from verified artifacts.
    pub fn load(artifacts: &ModelArtifacts, config: &ModelConfig) -> Result<Self, ModelError> {
        let device = config.device.resolve(detect_accelerator)?;
        tracing::info!(
            "Loading classifier from {:?} on {} (requested: {})",
            artifacts.weights.local_path(),
            device,
            config.device
        );

        let classifier =
            OnnxClassifier::load(artifacts.weights.local_path(), device, config.activation)?;
        let labels = LabelSet::load(artifacts.labels.local_path())?;

        tracing::info!("Classifier loaded ({} labels)", labels.len());
        Ok(Self::from_classifier(Box::new(classifier), labels, device))
    }

    /// Wrap any classifier implementation.
    pub fn from_classifier(
        classifier: Box<dyn Classifier>,
        labels: LabelSet,
        device: ResolvedDevice,
    ) -> Self {
        Self {
            classifier,
            labels,
            device,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn device(&self) -> ResolvedDevice {
        self.device
    }

    /// Run one forward pass over a window.
    ///
    /// Returns one confidence vector per image, aligned by position. Any
    /// failure covers the whole batch; the caller decides how to recover.
    pub fn infer(&self, batch: &[DecodedImage]) -> Result<Vec<Vec<f32>>, InferenceError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }

        let views: Vec<ArrayView3<'_, f32>> = batch.iter().map(|d| d.tensor.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| InferenceError::InputShape(e.to_string()))?;

        let start = std::time::Instant::now();
        let scores = self.classifier.forward(&stacked)?;
        tracing::trace!("  Forward pass ({} images): {:?}", batch.len(), start.elapsed());

        if scores.nrows() != batch.len() {
            return Err(InferenceError::OutputShape(format!(
                "{} rows for a batch of {}",
                scores.nrows(),
                batch.len()
            )));
        }
        if scores.ncols() == 0 {
            return Err(InferenceError::OutputShape("zero classes".to_string()));
        }

        Ok(scores.rows().into_iter().map(|row| row.to_vec()).collect())
    }
}
