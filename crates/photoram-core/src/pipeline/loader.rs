//! Bomb-safe image loading.
//!
//! Every check that can reject a file without decoding it runs first: existence,
//! emptiness, byte ceiling, magic bytes, then the declared dimensions read from
//! the header alone. Only files that pass all of these are decoded, on the
//! blocking pool, under a timeout and with allocation limits.
//!
//! A decode that outlives its timeout cannot be interrupted, so each blocking
//! decode holds a slot permit until it actually finishes. Abandoned decodes
//! therefore still count against the slot limit.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageReader};
use ndarray::Array3;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::{LimitsConfig, ModelConfig};
use crate::error::LoadError;
use crate::types::ImageTask;

use super::preprocess::{preprocess, Normalization};
use super::validate::sniff_format;

/// Bytes of allocation budget per accepted pixel (RGBA at 16 bits per channel).
const ALLOC_BYTES_PER_PIXEL: u64 = 8;

/// Counts live `DecodedImage` values and remembers the high-water mark.
#[derive(Debug, Default)]
pub struct ResidencyTracker {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl ResidencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Restart the high-water mark from the current live count.
    pub fn reset_peak(&self) {
        self.peak.store(self.live(), Ordering::SeqCst);
    }

    fn acquire(self: &Arc<Self>) -> ResidentGuard {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ResidentGuard {
            tracker: Arc::clone(self),
        }
    }
}

/// Decrements the tracker when the owning image is dropped.
#[derive(Debug)]
struct ResidentGuard {
    tracker: Arc<ResidencyTracker>,
}

impl Drop for ResidentGuard {
    fn drop(&mut self) {
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A loaded image, preprocessed to the classifier's input size.
///
/// Owned by the window that loaded it and dropped when that window's
/// inference call returns.
#[derive(Debug)]
pub struct DecodedImage {
    pub sequence_index: usize,
    /// Normalized CHW tensor at `image_size × image_size`
    pub tensor: Array3<f32>,
    /// Size of the source file in bytes
    pub byte_size: u64,
    /// Source width × height
    pub pixel_count: u64,
    pub width: u32,
    pub height: u32,
    _resident: ResidentGuard,
}

impl DecodedImage {
    /// Source resolution in megapixels.
    pub fn megapixels(&self) -> f64 {
        self.pixel_count as f64 / 1_000_000.0
    }
}

/// Loads images under a hard pixel ceiling, turning every failure into a `LoadError`.
pub struct SafeImageLoader {
    limits: LimitsConfig,
    image_size: u32,
    norm: Normalization,
    tracker: Arc<ResidencyTracker>,
    decode_slots: Arc<Semaphore>,
    decodes: Arc<ResidencyTracker>,
}

impl SafeImageLoader {
    pub fn new(limits: LimitsConfig, model: &ModelConfig) -> Self {
        Self {
            limits,
            image_size: model.image_size,
            norm: Normalization {
                mean: model.norm_mean,
                std: model.norm_std,
            },
            tracker: ResidencyTracker::new(),
            decode_slots: Arc::new(Semaphore::new(1)),
            decodes: ResidencyTracker::new(),
        }
    }

    /// Allow up to `slots` blocking decodes at once, timed-out ones included.
    pub fn with_decode_slots(mut self, slots: usize) -> Self {
        self.decode_slots = Arc::new(Semaphore::new(slots.max(1)));
        self
    }

    /// Shared counter of live decoded images produced by this loader.
    pub fn tracker(&self) -> Arc<ResidencyTracker> {
        Arc::clone(&self.tracker)
    }

    /// Counter of blocking decodes still running, including abandoned ones.
    pub fn decode_tracker(&self) -> Arc<ResidencyTracker> {
        Arc::clone(&self.decodes)
    }

    /// Load and preprocess one task.
    pub async fn load(&self, task: &ImageTask) -> Result<DecodedImage, LoadError> {
        let path = task.path.as_path();
        let start = std::time::Instant::now();

        let bytes = self.read_checked(path).await?;
        let byte_size = bytes.len() as u64;

        let (width, height) = declared_dimensions(&bytes, path)?;
        let pixel_count = width as u64 * height as u64;
        if pixel_count > self.limits.max_image_pixels {
            return Err(LoadError::TooManyPixels {
                path: path.to_path_buf(),
                width,
                height,
                pixels: pixel_count,
                max_pixels: self.limits.max_image_pixels,
            });
        }
        tracing::trace!("  Header: {}x{} for {:?}", width, height, path);

        let tensor = self
            .decode_and_preprocess(bytes, path, (width, height))
            .await?;
        tracing::trace!("  Loaded {:?} in {:?}", path, start.elapsed());

        Ok(DecodedImage {
            sequence_index: task.sequence_index,
            tensor,
            byte_size,
            pixel_count,
            width,
            height,
            _resident: self.tracker.acquire(),
        })
    }

    /// Existence, regular-file, emptiness, byte-ceiling and magic-byte checks.
    async fn read_checked(&self, path: &Path) -> Result<Vec<u8>, LoadError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(LoadError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        if !metadata.is_file() {
            return Err(LoadError::Unreadable {
                path: path.to_path_buf(),
                message: "not a regular file".to_string(),
            });
        }
        if metadata.len() == 0 {
            return Err(LoadError::Empty(path.to_path_buf()));
        }

        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if metadata.len() > max_bytes {
            return Err(LoadError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LoadError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        // The file may have been truncated between stat and read.
        if bytes.is_empty() {
            return Err(LoadError::Empty(path.to_path_buf()));
        }
        if sniff_format(&bytes[..bytes.len().min(super::validate::SNIFF_LEN)]).is_none() {
            return Err(LoadError::Undecodable {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }

        Ok(bytes)
    }

    /// Full decode plus resize, on the blocking pool under the decode timeout.
    ///
    /// The full-resolution image only exists inside the blocking task. Waiting
    /// for a free decode slot does not count against the timeout.
    async fn decode_and_preprocess(
        &self,
        bytes: Vec<u8>,
        path: &Path,
        declared: (u32, u32),
    ) -> Result<Array3<f32>, LoadError> {
        let path_owned = path.to_path_buf();
        let max_pixels = self.limits.max_image_pixels;
        let image_size = self.image_size;
        let norm = self.norm;
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let permit = Arc::clone(&self.decode_slots)
            .acquire_owned()
            .await
            .map_err(|e| LoadError::Undecodable {
                path: path.to_path_buf(),
                message: format!("Decoder unavailable: {}", e),
            })?;
        let decodes = Arc::clone(&self.decodes);

        let decode_result = timeout(
            timeout_duration,
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let _running = decodes.acquire();
                let image = decode_limited(bytes, &path_owned, max_pixels, declared)?;
                Ok::<_, LoadError>(preprocess(&image, image_size, &norm))
            }),
        )
        .await;

        match decode_result {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(LoadError::Undecodable {
                path: path.to_path_buf(),
                message: format!("Decoder task failed: {}", e),
            }),
            Err(_) => Err(LoadError::Timeout {
                path: path.to_path_buf(),
                timeout_ms: self.limits.decode_timeout_ms,
            }),
        }
    }
}

/// Read width and height from the header without decoding pixel data.
pub fn declared_dimensions(bytes: &[u8], path: &Path) -> Result<(u32, u32), LoadError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::Undecodable {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {}", e),
        })?
        .into_dimensions()
        .map_err(|e| LoadError::Undecodable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Decode with allocation limits as a second guard against lying headers.
fn decode_limited(
    bytes: Vec<u8>,
    path: &Path,
    max_pixels: u64,
    (width, height): (u32, u32),
) -> Result<DynamicImage, LoadError> {
    let mut limits = image::Limits::default();
    limits.max_alloc = Some(max_pixels.saturating_mul(ALLOC_BYTES_PER_PIXEL));

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::Undecodable {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {}", e),
        })?;
    reader.limits(limits);

    reader.decode().map_err(|e| match e {
        image::ImageError::Limits(_) => LoadError::TooManyPixels {
            path: path.to_path_buf(),
            width,
            height,
            pixels: width as u64 * height as u64,
            max_pixels,
        },
        other => LoadError::Undecodable {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::path::PathBuf;

    fn write_png(dir: &tempfile::TempDir, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(w, h, Rgb([200, 100, 50]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn loader(max_pixels: u64) -> SafeImageLoader {
        let limits = LimitsConfig {
            max_image_pixels: max_pixels,
            ..Default::default()
        };
        let model = ModelConfig {
            image_size: 16,
            ..Default::default()
        };
        SafeImageLoader::new(limits, &model)
    }

    #[tokio::test]
    async fn test_load_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "ok.png", 64, 48);

        let decoded = loader(120_000_000)
            .load(&ImageTask::new(&path, 3))
            .await
            .unwrap();
        assert_eq!(decoded.sequence_index, 3);
        assert_eq!(decoded.tensor.shape(), &[3, 16, 16]);
        assert_eq!((decoded.width, decoded.height), (64, 48));
        assert_eq!(decoded.pixel_count, 64 * 48);
        assert!(decoded.byte_size > 0);
    }

    #[tokio::test]
    async fn test_over_ceiling_rejected_before_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "big.png", 200, 200);

        let err = loader(10_000)
            .load(&ImageTask::new(&path, 0))
            .await
            .unwrap_err();
        match err {
            LoadError::TooManyPixels {
                width,
                height,
                pixels,
                max_pixels,
                ..
            } => {
                assert_eq!((width, height), (200, 200));
                assert_eq!(pixels, 40_000);
                assert_eq!(max_pixels, 10_000);
            }
            other => panic!("Expected TooManyPixels, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exactly_at_ceiling_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "edge.png", 100, 100);
        assert!(loader(10_000).load(&ImageTask::new(&path, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = loader(1_000)
            .load(&ImageTask::new("/nonexistent/photo.jpg", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let err = loader(1_000)
            .load(&ImageTask::new(&path, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Empty(_)));
    }

    #[tokio::test]
    async fn test_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader(1_000)
            .load(&ImageTask::new(dir.path(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.jpg");
        std::fs::write(&path, b"definitely not a jpeg file").unwrap();

        let err = loader(1_000_000)
            .load(&ImageTask::new(&path, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Undecodable { .. }));
    }

    #[tokio::test]
    async fn test_truncated_png_is_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let full = write_png(&dir, "full.png", 32, 32);
        let bytes = std::fs::read(&full).unwrap();
        let path = dir.path().join("truncated.png");
        std::fs::write(&path, &bytes[..40]).unwrap();

        let err = loader(1_000_000)
            .load(&ImageTask::new(&path, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Undecodable { .. }));
    }

    #[tokio::test]
    async fn test_file_size_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.jpg");
        std::fs::write(&path, vec![0u8; 2 * 1024 * 1024]).unwrap();

        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..Default::default()
        };
        let loader = SafeImageLoader::new(limits, &ModelConfig::default());
        let err = loader.load(&ImageTask::new(&path, 0)).await.unwrap_err();
        assert!(matches!(err, LoadError::FileTooLarge { max_mb: 1, .. }));
    }

    #[tokio::test]
    async fn test_unbounded_file_size_setting_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "small.png", 8, 8);

        let limits = LimitsConfig {
            max_file_size_mb: u64::MAX,
            ..Default::default()
        };
        let model = ModelConfig {
            image_size: 16,
            ..Default::default()
        };
        let loader = SafeImageLoader::new(limits, &model);
        assert!(loader.load(&ImageTask::new(&path, 0)).await.is_ok());
    }

    #[test]
    fn test_allocation_limit_reports_declared_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "wide.png", 64, 64);
        let bytes = std::fs::read(&path).unwrap();

        // A 16-pixel allocation budget cannot hold a 64x64 decode.
        let err = decode_limited(bytes, &path, 16, (64, 64)).unwrap_err();
        match err {
            LoadError::TooManyPixels {
                width,
                height,
                pixels,
                max_pixels,
                ..
            } => {
                assert_eq!((width, height), (64, 64));
                assert_eq!(pixels, 4096);
                assert_eq!(max_pixels, 16);
            }
            other => panic!("Expected TooManyPixels, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timed_out_decodes_keep_their_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "slow.png", 3000, 3000);

        let limits = LimitsConfig {
            max_image_pixels: 120_000_000,
            decode_timeout_ms: 1,
            ..Default::default()
        };
        let model = ModelConfig {
            image_size: 16,
            ..Default::default()
        };
        let loader = SafeImageLoader::new(limits, &model).with_decode_slots(1);
        let decodes = loader.decode_tracker();

        for index in 0..3 {
            let err = loader.load(&ImageTask::new(&path, index)).await.unwrap_err();
            assert!(matches!(err, LoadError::Timeout { .. }), "got {err:?}");
            assert!(decodes.live() <= 1);
        }
        assert_eq!(decodes.peak(), 1);
        assert_eq!(loader.tracker().live(), 0);
    }

    #[tokio::test]
    async fn test_tracker_counts_live_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "a.png", 8, 8);
        let loader = loader(1_000_000);
        let tracker = loader.tracker();

        let a = loader.load(&ImageTask::new(&path, 0)).await.unwrap();
        let b = loader.load(&ImageTask::new(&path, 1)).await.unwrap();
        assert_eq!(tracker.live(), 2);
        drop(a);
        drop(b);
        assert_eq!(tracker.live(), 0);
        assert_eq!(tracker.peak(), 2);
    }
}
