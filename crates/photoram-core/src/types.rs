//! Core data types for the tagging pipeline.
//!
//! `TagResult` is the schema-stable output record: every field is always
//! serialized so downstream consumers see the same shape for successes and
//! failures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{InferenceError, LoadError};

/// One image to tag, in the caller's ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    /// Absolute, resolved path
    pub path: PathBuf,
    /// Position in the discovered ordering
    pub sequence_index: usize,
}

impl ImageTask {
    pub fn new(path: impl Into<PathBuf>, sequence_index: usize) -> Self {
        Self {
            path: path.into(),
            sequence_index,
        }
    }
}

/// A single tag produced for an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPrediction {
    /// Class index in the classifier's output vector
    pub tag_id: usize,

    /// Display name (after overrides)
    pub tag_name: String,

    /// Confidence score from 0.0 to 1.0
    pub confidence: f32,
}

/// Category of a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Unreadable,
    Empty,
    FileTooLarge,
    TooManyPixels,
    Undecodable,
    Timeout,
    Inference,
    Cancelled,
}

/// Typed, human-readable failure descriptor attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TagFailure {
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "Run cancelled before this image was processed".to_string(),
        }
    }
}

impl From<&LoadError> for TagFailure {
    fn from(err: &LoadError) -> Self {
        let kind = match err {
            LoadError::NotFound(_) => FailureKind::NotFound,
            LoadError::Unreadable { .. } => FailureKind::Unreadable,
            LoadError::Empty(_) => FailureKind::Empty,
            LoadError::FileTooLarge { .. } => FailureKind::FileTooLarge,
            LoadError::TooManyPixels { .. } => FailureKind::TooManyPixels,
            LoadError::Undecodable { .. } => FailureKind::Undecodable,
            LoadError::Timeout { .. } => FailureKind::Timeout,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<&InferenceError> for TagFailure {
    fn from(err: &InferenceError) -> Self {
        Self {
            kind: FailureKind::Inference,
            message: err.to_string(),
        }
    }
}

/// Outcome for one input image. Exactly one per `ImageTask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub sequence_index: usize,

    pub file_path: PathBuf,

    /// Ordered by descending confidence; empty on failure
    pub tags: Vec<TagPrediction>,

    /// Present only when the image could not be tagged
    pub error: Option<TagFailure>,

    /// Source resolution in megapixels, when the image decoded
    pub image_megapixels: Option<f64>,
}

impl TagResult {
    /// Build a failed result for a task.
    pub fn failed(task: &ImageTask, failure: TagFailure) -> Self {
        Self {
            sequence_index: task.sequence_index,
            file_path: task.path.clone(),
            tags: Vec::new(),
            error: Some(failure),
            image_megapixels: None,
        }
    }

    /// Whether tagging succeeded for this image.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Tag names in output order.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.tag_name.as_str()).collect()
    }
}

/// Counters for a single tagging run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub windows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Windows whose batched forward pass failed and were retried per image
    pub degraded_windows: usize,
    /// Highest number of decoded images held at once
    pub peak_resident_images: usize,
    pub total_seconds: f64,
}

/// Ordered results of a run. Serializes as a plain array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchResult {
    pub results: Vec<TagResult>,
}

impl BatchResult {
    pub fn succeeded(&self) -> impl Iterator<Item = &TagResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TagResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
