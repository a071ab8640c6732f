//! End-to-end tagging runs against a deterministic in-process classifier.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array2, Array4, Axis};
use tokio_util::sync::CancellationToken;

use photoram_core::checkpoint::{ArtifactFetcher, ArtifactSpec};
use photoram_core::error::{CheckpointError, DiscoveryError, EXIT_INVALID_ARGS};
use photoram_core::{
    Classifier, Config, FailureKind, InferenceEngine, InferenceError, LabelSet, OverrideMap,
    PhotoramError, ResolvedDevice, TagRun, TaggingService,
};

/// Confidences derived from channel means: red, green, blue, "not red".
///
/// Any batch containing a strongly green image fails as a whole, which
/// stands in for a device error triggered by one input.
#[derive(Clone, Default)]
struct ColorClassifier {
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl ColorClassifier {
    fn channel_confidence(batch: &Array4<f32>, i: usize, c: usize) -> f32 {
        let mean = batch
            .index_axis(Axis(0), i)
            .index_axis(Axis(0), c)
            .mean()
            .unwrap_or(-1.0);
        ((mean + 1.0) / 2.0).clamp(0.0, 1.0)
    }
}

impl Classifier for ColorClassifier {
    fn forward(&self, batch: &Array4<f32>) -> Result<Array2<f32>, InferenceError> {
        let n = batch.shape()[0];
        self.batch_sizes.lock().unwrap().push(n);

        if (0..n).any(|i| Self::channel_confidence(batch, i, 1) > 0.9) {
            return Err(InferenceError::Runtime("simulated device fault".into()));
        }

        Ok(Array2::from_shape_fn((n, 4), |(i, c)| match c {
            3 => 1.0 - Self::channel_confidence(batch, i, 0),
            _ => Self::channel_confidence(batch, i, c),
        }))
    }
}

fn labels() -> LabelSet {
    LabelSet::from_lines(["red", "green", "blue", "not red"])
}

fn write_image(dir: &Path, name: &str, color: [u8; 3], size: u32, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(size, size, Rgb(color))
        .save_with_format(&path, format)
        .unwrap();
    path
}

fn config(batch_size: usize, threshold: f32) -> Config {
    let mut config = Config::default();
    config.tagging.batch_size = batch_size;
    config.tagging.threshold = threshold;
    config.model.image_size = 16;
    config
}

fn service_with(config: Config, classifier: ColorClassifier) -> TaggingService {
    let engine =
        InferenceEngine::from_classifier(Box::new(classifier), labels(), ResolvedDevice::Cpu);
    TaggingService::new(config, engine, OverrideMap::default()).unwrap()
}

fn service(config: Config) -> TaggingService {
    service_with(config, ColorClassifier::default())
}

/// Eight images of varied colors, none green.
fn album(dir: &Path) -> Vec<PathBuf> {
    let colors = [
        [250, 10, 10],
        [10, 10, 250],
        [250, 10, 250],
        [128, 40, 128],
        [200, 60, 20],
        [20, 60, 200],
        [255, 90, 160],
        [90, 40, 240],
    ];
    colors
        .iter()
        .enumerate()
        .map(|(i, c)| write_image(dir, &format!("img_{i}.png"), *c, 24, ImageFormat::Png))
        .collect()
}

fn tag_sets(run: &TagRun) -> Vec<Vec<String>> {
    run.results
        .results
        .iter()
        .map(|r| r.tags.iter().map(|t| t.tag_name.clone()).collect())
        .collect()
}

#[tokio::test]
async fn corrupt_file_in_the_middle_does_not_abort_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_image(dir.path(), "a.jpg", [250, 20, 200], 32, ImageFormat::Jpeg);
    let corrupt = dir.path().join("corrupt.jpg");
    std::fs::write(&corrupt, b"\xFF\xD8\xFF\xE0 truncated garbage").unwrap();
    let b = write_image(dir.path(), "b.jpg", [30, 20, 240], 32, ImageFormat::Jpeg);

    let svc = service(config(2, 0.68));
    let run = svc.tag(&[a, corrupt, b]).await.unwrap();
    let results = &run.results.results;

    assert_eq!(results.len(), 3);
    assert!(results[0].error.is_none());
    assert!(results[1].error.is_some());
    assert!(results[1].tags.is_empty());
    assert!(results[1].file_path.ends_with("corrupt.jpg"));
    assert!(results[2].error.is_none());

    for r in [&results[0], &results[2]] {
        assert!(!r.tags.is_empty());
        assert!(r
            .tags
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
        assert!(r.tags.iter().all(|t| t.confidence >= 0.68));
    }
    assert_eq!(results[0].tag_names()[0], "red");
    assert_eq!(results[2].tag_names(), vec!["blue", "not red"]);
}

#[tokio::test]
async fn oversized_image_is_rejected_and_later_images_still_tagged() {
    let dir = tempfile::tempdir().unwrap();
    let bomb = write_image(dir.path(), "bomb.png", [250, 10, 10], 200, ImageFormat::Png);
    let ok = write_image(dir.path(), "ok.png", [10, 10, 250], 50, ImageFormat::Png);

    let mut cfg = config(4, 0.5);
    cfg.limits.max_image_pixels = 10_000;
    let run = service(cfg).tag(&[bomb, ok]).await.unwrap();
    let results = &run.results.results;

    let failure = results[0].error.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::TooManyPixels);
    assert!(failure.message.contains("rejected for safety"));
    assert!(results[0].tags.is_empty());
    assert!(results[1].is_success());
    assert!(!results[1].tags.is_empty());
}

#[tokio::test]
async fn results_cover_every_task_in_order_and_memory_stays_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());

    let svc = service(config(3, 0.5));
    let tasks = svc.discover(&[dir.path().to_path_buf()]).unwrap();
    let run = svc
        .tag_tasks(&tasks, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(run.results.len(), paths.len());
    let indices: Vec<usize> = run.results.results.iter().map(|r| r.sequence_index).collect();
    assert_eq!(indices, (0..paths.len()).collect::<Vec<_>>());
    for (task, result) in tasks.iter().zip(&run.results.results) {
        assert_eq!(task.path, result.file_path);
    }

    assert_eq!(run.stats.windows, 3);
    assert_eq!(run.stats.succeeded, 8);
    assert!(run.stats.peak_resident_images <= 3);
    assert_eq!(run.stats.peak_resident_images, 3);
}

#[tokio::test]
async fn batch_size_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());

    let small = service(config(1, 0.5)).tag(&paths).await.unwrap();
    let large = service(config(8, 0.5)).tag(&paths).await.unwrap();

    assert_eq!(tag_sets(&small), tag_sets(&large));
    assert_eq!(small.stats.peak_resident_images, 1);
}

#[tokio::test]
async fn tagging_twice_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());
    let svc = service(config(4, 0.5));

    let first = svc.tag(&paths).await.unwrap();
    let second = svc.tag(&paths).await.unwrap();
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn higher_threshold_returns_a_subset() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());

    let low = service(config(4, 0.3)).tag(&paths).await.unwrap();
    let high = service(config(4, 0.7)).tag(&paths).await.unwrap();

    for (lo, hi) in tag_sets(&low).iter().zip(tag_sets(&high).iter()) {
        assert!(hi.iter().all(|t| lo.contains(t)), "{hi:?} not within {lo:?}");
    }
}

#[tokio::test]
async fn failed_window_degrades_to_single_image_retries() {
    let dir = tempfile::tempdir().unwrap();
    let red = write_image(dir.path(), "1_red.png", [250, 10, 10], 16, ImageFormat::Png);
    let green = write_image(dir.path(), "2_green.png", [10, 250, 10], 16, ImageFormat::Png);
    let blue = write_image(dir.path(), "3_blue.png", [10, 10, 250], 16, ImageFormat::Png);

    let classifier = ColorClassifier::default();
    let batch_sizes = Arc::clone(&classifier.batch_sizes);
    let svc = service_with(config(3, 0.5), classifier);
    let run = svc.tag(&[red, green, blue]).await.unwrap();
    let results = &run.results.results;

    assert!(results[0].is_success());
    assert_eq!(
        results[1].error.as_ref().map(|e| e.kind),
        Some(FailureKind::Inference)
    );
    assert!(results[2].is_success());
    assert_eq!(run.stats.degraded_windows, 1);
    assert_eq!(run.stats.failed, 1);
    assert_eq!(*batch_sizes.lock().unwrap(), vec![3, 1, 1, 1]);
}

#[tokio::test]
async fn cancellation_between_windows_keeps_results_complete() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());
    let svc = service(config(2, 0.5));
    let tasks = svc.discover(&paths).unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    let run = svc
        .tag_tasks(&tasks, &token, |event| {
            if event.completed == 2 {
                trigger.cancel();
            }
        })
        .await
        .unwrap();

    assert_eq!(run.results.len(), 8);
    assert!(run.results.results[..2].iter().all(|r| r.is_success()));
    assert!(run.results.results[2..]
        .iter()
        .all(|r| r.error.as_ref().map(|e| e.kind) == Some(FailureKind::Cancelled)));
    assert_eq!(run.stats.windows, 1);
    assert_eq!(run.stats.cancelled, 6);
}

#[tokio::test]
async fn all_failures_still_yield_a_full_result_list() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty.jpg");
    std::fs::write(&empty, b"").unwrap();
    let text = dir.path().join("notes.png");
    std::fs::write(&text, b"just some text").unwrap();
    let huge = dir.path().join("huge.jpg");
    std::fs::write(&huge, vec![0u8; 1024 * 1024 + 1]).unwrap();

    let mut cfg = config(2, 0.5);
    cfg.limits.max_file_size_mb = 1;
    let run = service(cfg).tag(&[empty, text, huge]).await.unwrap();

    let kinds: Vec<FailureKind> = run
        .results
        .results
        .iter()
        .map(|r| r.error.as_ref().unwrap().kind)
        .collect();
    assert_eq!(
        kinds,
        vec![FailureKind::Empty, FailureKind::Undecodable, FailureKind::FileTooLarge]
    );
    assert_eq!(run.stats.succeeded, 0);

    let json = serde_json::to_value(&run.results).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn progress_reports_every_task() {
    let dir = tempfile::tempdir().unwrap();
    let paths = album(dir.path());
    let svc = service(config(3, 0.5));
    let tasks = svc.discover(&paths).unwrap();

    let mut seen = Vec::new();
    svc.tag_tasks(&tasks, &CancellationToken::new(), |event| {
        seen.push((event.completed, event.total));
    })
    .await
    .unwrap();

    assert_eq!(seen.len(), 8);
    assert_eq!(seen.last(), Some(&(8, 8)));
}

#[test]
fn invalid_settings_are_rejected_before_any_io() {
    let engine = || {
        InferenceEngine::from_classifier(
            Box::new(ColorClassifier::default()),
            labels(),
            ResolvedDevice::Cpu,
        )
    };

    for cfg in [config(0, 0.5), config(2, 1.5), config(2, f32::NAN)] {
        let err = TaggingService::new(cfg, engine(), OverrideMap::default())
            .err()
            .unwrap();
        assert!(matches!(err, PhotoramError::Config(_)));
        assert_eq!(err.exit_code(), EXIT_INVALID_ARGS);
    }

    let mut cfg = config(2, 0.5);
    cfg.tagging.top_n = Some(0);
    assert!(TaggingService::new(cfg, engine(), OverrideMap::default()).is_err());
}

#[tokio::test]
async fn top_n_and_overrides_shape_the_tag_list() {
    let dir = tempfile::tempdir().unwrap();
    let purple = write_image(dir.path(), "p.png", [250, 10, 250], 16, ImageFormat::Png);

    let mut cfg = config(1, 0.5);
    cfg.tagging.top_n = Some(1);
    let overrides = OverrideMap::new(
        [("red".to_string(), "Rot".to_string())]
            .into_iter()
            .collect(),
    );
    let engine = InferenceEngine::from_classifier(
        Box::new(ColorClassifier::default()),
        labels(),
        ResolvedDevice::Cpu,
    );
    let svc = TaggingService::new(cfg, engine, overrides).unwrap();

    let run = svc.tag(&[purple]).await.unwrap();
    let tags = &run.results.results[0].tags;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_name, "Rot");
    assert_eq!(tags[0].tag_id, 0);
}

/// Writes a fixed payload for every request and records the URLs asked for.
struct RecordingFetcher {
    payload: Vec<u8>,
    urls: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    fn serving(payload: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.to_vec(),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for RecordingFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, CheckpointError> {
        self.urls.lock().unwrap().push(url.to_string());
        std::fs::write(dest, &self.payload).unwrap();
        Ok(self.payload.len() as u64)
    }
}

fn pinned_config(model_dir: &Path, base_url: &str) -> Config {
    let mut config = config(2, 0.5);
    config.general.model_dir = model_dir.to_path_buf();
    config.checkpoint.base_url = base_url.to_string();
    config.checkpoint.weights_blake3 = blake3::hash(b"trusted weights").to_hex().to_string();
    config.checkpoint.labels_blake3 = blake3::hash(b"red\ngreen\n").to_hex().to_string();
    config
}

#[tokio::test]
async fn tampered_weights_stop_initialization_before_labels_are_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let config = pinned_config(dir.path(), "https://artifacts.example");
    let weights_name = ArtifactSpec::weights(&config).file_name;
    let weights = dir.path().join(&weights_name);
    std::fs::write(&weights, b"tampered weights").unwrap();
    let fetcher = RecordingFetcher::serving(b"still not the trusted weights");

    let err = TaggingService::initialize_with(config, fetcher.clone())
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, PhotoramError::Checkpoint(CheckpointError::Integrity { .. })),
        "got {err:?}"
    );
    assert_eq!(err.exit_code(), photoram_core::error::EXIT_MODEL_ERROR);

    assert_eq!(
        fetcher.urls(),
        vec![format!("https://artifacts.example/{weights_name}")]
    );
    assert!(!weights.exists());
}

#[tokio::test]
async fn tampered_cache_without_a_source_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = pinned_config(dir.path(), "");
    let weights = dir.path().join(ArtifactSpec::weights(&config).file_name);
    std::fs::write(&weights, b"tampered weights").unwrap();
    let fetcher = RecordingFetcher::serving(b"");

    let err = TaggingService::initialize_with(config, fetcher.clone())
        .await
        .err()
        .unwrap();
    assert!(
        matches!(err, PhotoramError::Checkpoint(CheckpointError::Integrity { .. })),
        "got {err:?}"
    );
    assert!(fetcher.urls().is_empty());
}

#[test]
fn inputs_that_do_not_exist_leave_nothing_to_tag() {
    let dir = tempfile::tempdir().unwrap();
    let gone = [dir.path().join("gone1.jpg"), dir.path().join("gone2.png")];

    let err = service(config(2, 0.5)).discover(&gone).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoImages { .. }));
}
