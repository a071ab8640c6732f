//! Tagging orchestration: discovery, windowed load/infer, post-processing.
//!
//! Windows run strictly one after another. Within a window, images are loaded
//! one at a time, the successfully decoded ones go through a single forward
//! pass, and every decoded image is dropped before the next window starts.
//! Resident decoded images therefore never exceed `batch_size`.
//!
//! If a window's batched forward pass fails, the window is retried one image
//! at a time. Images that still fail are recorded with an `inference`
//! failure; the rest of the run is unaffected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{ensure_model_artifacts, ArtifactFetcher, HttpFetcher};
use crate::config::Config;
use crate::error::{DiscoveryError, InferenceError, ModelError, Result};
use crate::inference::InferenceEngine;
use crate::pipeline::{BatchPlanner, BatchWindow, DecodedImage, FileDiscovery, SafeImageLoader};
use crate::tagging::{OverrideMap, TagFilter, TagPostProcessor};
use crate::types::{BatchResult, ImageTask, RunStats, TagFailure, TagResult};

/// Emitted once per task as soon as its result is settled.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    pub path: &'a Path,
    pub completed: usize,
    pub total: usize,
    pub success: bool,
}

/// Results of one run plus its counters.
#[derive(Debug, Clone, Default)]
pub struct TagRun {
    pub results: BatchResult,
    pub stats: RunStats,
}

/// High-level tagging orchestrator.
///
/// Owns its `InferenceEngine`; nothing is shared through globals.
pub struct TaggingService {
    config: Config,
    engine: Arc<InferenceEngine>,
    loader: SafeImageLoader,
    discovery: FileDiscovery,
    overrides: OverrideMap,
    filter: TagFilter,
}

impl TaggingService {
    /// Validate configuration, make checkpoints ready, then load the model.
    ///
    /// Configuration problems are reported before any network or disk access.
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(&config.checkpoint)?);
        Self::initialize_with(config, fetcher).await
    }

    /// Like [`initialize`](Self::initialize), fetching missing artifacts through `fetcher`.
    pub async fn initialize_with(config: Config, fetcher: Arc<dyn ArtifactFetcher>) -> Result<Self> {
        config.validate()?;
        let overrides = OverrideMap::for_config(&config)?;

        let artifacts = ensure_model_artifacts(&config, fetcher).await?;

        let model_config = config.model.clone();
        let weights_path = artifacts.weights.local_path().to_path_buf();
        let engine = tokio::task::spawn_blocking(move || {
            InferenceEngine::load(&artifacts, &model_config)
        })
        .await
        .map_err(|e| ModelError::Load {
            path: weights_path,
            message: format!("Model loading task failed: {e}"),
        })??;

        Self::new(config, engine, overrides)
    }

    /// Build a service around an already constructed engine.
    pub fn new(config: Config, engine: InferenceEngine, overrides: OverrideMap) -> Result<Self> {
        config.validate()?;
        let filter = TagFilter::new(config.tagging.threshold, config.tagging.top_n)?;

        Ok(Self {
            loader: SafeImageLoader::new(config.limits.clone(), &config.model)
                .with_decode_slots(config.tagging.batch_size),
            discovery: FileDiscovery::new(config.discovery.clone()),
            engine: Arc::new(engine),
            overrides,
            filter,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Expand inputs into ordered tasks.
    pub fn discover(&self, inputs: &[PathBuf]) -> std::result::Result<Vec<ImageTask>, DiscoveryError> {
        self.discovery.discover(inputs)
    }

    /// Discover and tag in one call, without cancellation or progress.
    pub async fn tag(&self, inputs: &[PathBuf]) -> Result<TagRun> {
        let tasks = self.discover(inputs)?;
        self.tag_tasks(&tasks, &CancellationToken::new(), |_| {})
            .await
    }

    /// Tag already-discovered tasks.
    ///
    /// Always returns exactly one result per task, sorted by sequence index.
    /// Cancellation is honoured between windows; tasks that never started are
    /// recorded as cancelled.
    pub async fn tag_tasks<F>(
        &self,
        tasks: &[ImageTask],
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TagRun>
    where
        F: FnMut(ProgressEvent<'_>),
    {
        let start = Instant::now();
        let planner = BatchPlanner::new(tasks, self.config.tagging.batch_size)?;
        let tracker = self.loader.tracker();
        tracker.reset_peak();

        tracing::info!(
            "Tagging {} image(s) in {} window(s) of up to {}",
            tasks.len(),
            planner.window_count(),
            planner.batch_size()
        );

        let total = tasks.len();
        let mut results: Vec<TagResult> = Vec::with_capacity(total);
        let mut stats = RunStats::default();

        let mut settle = |result: TagResult, results: &mut Vec<TagResult>| {
            on_progress(ProgressEvent {
                path: &result.file_path,
                completed: results.len() + 1,
                total,
                success: result.is_success(),
            });
            results.push(result);
        };

        for window in planner.windows() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Cancelled before window {}; {} image(s) not processed",
                    window.index,
                    total - results.len()
                );
                for task in window.tasks {
                    settle(TagResult::failed(task, TagFailure::cancelled()), &mut results);
                }
                continue;
            }

            let window_start = Instant::now();
            let settled = self.run_window(window, &mut stats).await;
            for result in settled {
                settle(result, &mut results);
            }
            stats.windows += 1;
            tracing::debug!(
                "Window {} ({} image(s)) done in {:?}",
                window.index,
                window.len(),
                window_start.elapsed()
            );
        }

        results.sort_by_key(|r| r.sequence_index);

        stats.succeeded = results.iter().filter(|r| r.is_success()).count();
        stats.cancelled = results
            .iter()
            .filter(|r| {
                r.error
                    .as_ref()
                    .is_some_and(|e| e.kind == crate::types::FailureKind::Cancelled)
            })
            .count();
        stats.failed = results.len() - stats.succeeded - stats.cancelled;
        stats.peak_resident_images = tracker.peak();
        stats.total_seconds = start.elapsed().as_secs_f64();

        tracing::info!(
            "Tagged {} of {} image(s) ({} failed, {} cancelled) in {:.2}s",
            stats.succeeded,
            total,
            stats.failed,
            stats.cancelled,
            stats.total_seconds
        );

        Ok(TagRun {
            results: BatchResult { results },
            stats,
        })
    }

    /// Load, infer and post-process one window. Decoded images do not
    /// outlive this call.
    async fn run_window(&self, window: BatchWindow<'_>, stats: &mut RunStats) -> Vec<TagResult> {
        let mut settled = Vec::with_capacity(window.len());
        let mut decoded: Vec<DecodedImage> = Vec::with_capacity(window.len());
        let mut pending: Vec<&ImageTask> = Vec::with_capacity(window.len());

        for task in window.tasks {
            match self.loader.load(task).await {
                Ok(image) => {
                    pending.push(task);
                    decoded.push(image);
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", task.path, e);
                    settled.push(TagResult::failed(task, TagFailure::from(&e)));
                }
            }
        }

        if decoded.is_empty() {
            return settled;
        }

        let megapixels: Vec<f64> = decoded.iter().map(|d| d.megapixels()).collect();

        let outcomes: Vec<std::result::Result<Vec<f32>, InferenceError>> =
            match infer_owned(Arc::clone(&self.engine), decoded).await {
                (Ok(rows), _) => rows.into_iter().map(Ok).collect(),
                (Err(e), leftover) => {
                    stats.degraded_windows += 1;
                    tracing::warn!(
                        "Batched inference failed for window {} ({}); retrying {} image(s) individually",
                        window.index,
                        e,
                        pending.len()
                    );
                    self.infer_one_by_one(leftover, pending.len(), e).await
                }
            };

        let post = TagPostProcessor::new(self.filter, self.engine.labels(), &self.overrides);
        for ((task, outcome), mp) in pending.into_iter().zip(outcomes).zip(megapixels) {
            match outcome {
                Ok(confidences) => settled.push(TagResult {
                    sequence_index: task.sequence_index,
                    file_path: task.path.clone(),
                    tags: post.process(&confidences),
                    error: None,
                    image_megapixels: Some(mp),
                }),
                Err(e) => {
                    tracing::warn!("Inference failed for {:?}: {}", task.path, e);
                    let mut failed = TagResult::failed(task, TagFailure::from(&e));
                    failed.image_megapixels = Some(mp);
                    settled.push(failed);
                }
            }
        }

        settled
    }

    /// Degraded path: one forward pass per image.
    ///
    /// `leftover` is empty when the batched task panicked and took the images
    /// with it; every image is then marked with the original error.
    async fn infer_one_by_one(
        &self,
        leftover: Vec<DecodedImage>,
        expected: usize,
        batch_error: InferenceError,
    ) -> Vec<std::result::Result<Vec<f32>, InferenceError>> {
        if leftover.len() != expected {
            return vec![Err(batch_error); expected];
        }

        let mut outcomes = Vec::with_capacity(expected);
        for image in leftover {
            let outcome = match infer_owned(Arc::clone(&self.engine), vec![image]).await {
                (Ok(mut rows), _) if rows.len() == 1 => Ok(rows.remove(0)),
                (Ok(rows), _) => Err(InferenceError::OutputShape(format!(
                    "{} rows for a single image",
                    rows.len()
                ))),
                (Err(e), _) => Err(e),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Run a forward pass on the blocking pool, taking ownership of the images.
///
/// On success the images are dropped inside the blocking task. On failure
/// they are handed back so the caller can retry them.
async fn infer_owned(
    engine: Arc<InferenceEngine>,
    images: Vec<DecodedImage>,
) -> (
    std::result::Result<Vec<Vec<f32>>, InferenceError>,
    Vec<DecodedImage>,
) {
    let joined = tokio::task::spawn_blocking(move || match engine.infer(&images) {
        Ok(rows) => {
            drop(images);
            (Ok(rows), Vec::new())
        }
        Err(e) => (Err(e), images),
    })
    .await;

    match joined {
        Ok(outcome) => outcome,
        Err(e) => (Err(InferenceError::Aborted(e.to_string())), Vec::new()),
    }
}
