//! ONNX Runtime classifier session.
//!
//! Loads an image classifier exported to ONNX and runs batched forward passes
//! producing one confidence row per image.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array4};
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider};
use ort::session::Session;
use ort::value::Value;

use crate::error::{InferenceError, ModelError};

use super::{Activation, Classifier, ResolvedDevice};

/// Wraps an ONNX Runtime session for classification.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
    activation: Activation,
}

impl OnnxClassifier {
    /// Load a classifier from an ONNX file onto `device`.
    pub fn load(
        model_path: &Path,
        device: ResolvedDevice,
        activation: Activation,
    ) -> Result<Self, ModelError> {
        let load_err = |message: String| ModelError::Load {
            path: model_path.to_path_buf(),
            message,
        };

        let builder = Session::builder()
            .map_err(|e| load_err(format!("Failed to create ONNX session builder: {e}")))?;

        let builder = match device {
            ResolvedDevice::Cpu => builder,
            ResolvedDevice::Cuda => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| ModelError::Device(format!("Failed to register CUDA: {e}")))?,
            ResolvedDevice::CoreMl => builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| ModelError::Device(format!("Failed to register CoreML: {e}")))?,
        };

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_err(format!("Failed to load ONNX model: {e}")))?;

        // Detect the input tensor name from model metadata.
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded classifier from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            activation,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn forward(&self, batch: &Array4<f32>) -> Result<Array2<f32>, InferenceError> {
        let batch_size = batch.shape()[0];

        // Convert ndarray to (shape, flat_data) for ort.
        let shape: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = batch.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| InferenceError::InputShape(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| InferenceError::Runtime(format!("ONNX inference failed: {e}")))?;

        // Prefer an output named "logits"; single-output exports name it freely.
        let logits = outputs
            .iter()
            .find(|(name, _)| *name == "logits")
            .or_else(|| outputs.iter().next())
            .ok_or_else(|| InferenceError::OutputShape("Model produced no outputs".to_string()))?;

        let (out_shape, data) = logits
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::OutputShape(format!("Failed to extract logits: {e}")))?;

        let classes = match out_shape.len() {
            2 if out_shape[0] as usize == batch_size => out_shape[1] as usize,
            _ => {
                return Err(InferenceError::OutputShape(format!(
                    "Expected [{batch_size}, classes], got {:?}",
                    out_shape
                )))
            }
        };

        let mut scores = Array2::from_shape_vec((batch_size, classes), data.to_vec())
            .map_err(|e| InferenceError::OutputShape(e.to_string()))?;

        for mut row in scores.rows_mut() {
            if let Some(slice) = row.as_slice_mut() {
                self.activation.apply(slice);
            }
        }

        Ok(scores)
    }
}
