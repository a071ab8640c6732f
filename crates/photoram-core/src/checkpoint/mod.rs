//! Checkpoint acquisition: cache lookup, download, integrity check, promotion.
//!
//! Each artifact moves through an explicit state machine:
//!
//! ```text
//! Absent ──► Downloading ──► Downloaded ──► Verified ──► Ready
//!   │                            │
//!   └──(cached file)─────────────┤
//!                                ▼
//!                            Rejected ──(one re-download)──► Downloading
//! ```
//!
//! Downloads land in a `.part` file next to the canonical path and are only
//! renamed into place after verification, so the canonical path never holds
//! an unverified artifact. A second rejection is fatal.

pub mod fetch;
pub mod verify;

pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use verify::ChecksumVerifier;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::CheckpointError;

/// Number of integrity rejections after which acquisition gives up.
const MAX_REJECTIONS: u32 = 2;

/// Where an artifact comes from and what it must hash to.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    /// Fixed artifact name; also the cached file name
    pub file_name: String,
    /// Remote location, if an artifact store is configured
    pub url: Option<String>,
    /// Trusted hex BLAKE3 digest
    pub blake3: String,
    /// Config key holding the digest (for error messages)
    pub digest_key: &'static str,
}

impl ArtifactSpec {
    fn from_config(config: &Config, file_name: &str, blake3: &str, key: &'static str) -> Self {
        let base = config.checkpoint.base_url.trim_end_matches('/');
        Self {
            file_name: file_name.to_string(),
            url: (!base.is_empty()).then(|| format!("{base}/{file_name}")),
            blake3: blake3.to_string(),
            digest_key: key,
        }
    }

    /// The classifier weights artifact.
    pub fn weights(config: &Config) -> Self {
        Self::from_config(
            config,
            &config.model.weights_file,
            &config.checkpoint.weights_blake3,
            "weights_blake3",
        )
    }

    /// The label list artifact.
    pub fn labels(config: &Config) -> Self {
        Self::from_config(
            config,
            &config.model.labels_file,
            &config.checkpoint.labels_blake3,
            "labels_blake3",
        )
    }
}

/// Lifecycle state of one artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointState {
    Absent,
    Downloading { attempt: u32 },
    Downloaded { path: PathBuf, cached: bool },
    Verified { path: PathBuf },
    Ready { path: PathBuf },
    Rejected { path: PathBuf, reason: String },
}

impl CheckpointState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Downloading { .. } => "downloading",
            Self::Downloaded { .. } => "downloaded",
            Self::Verified { .. } => "verified",
            Self::Ready { .. } => "ready",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &CheckpointState) -> bool {
        use CheckpointState::*;
        matches!(
            (self, next),
            (Absent, Downloading { .. })
                | (Absent, Downloaded { cached: true, .. })
                | (Downloading { .. }, Downloaded { cached: false, .. })
                | (Downloaded { .. }, Verified { .. })
                | (Downloaded { .. }, Rejected { .. })
                | (Verified { .. }, Ready { .. })
                | (Rejected { .. }, Downloading { .. })
        )
    }
}

/// A verified artifact at its canonical path.
///
/// Only `CheckpointManager` can construct this, so holding one proves the
/// file passed its integrity check.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCheckpoint {
    local_path: PathBuf,
    digest: String,
}

impl ReadyCheckpoint {
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Both artifacts the classifier needs, verified.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub weights: ReadyCheckpoint,
    pub labels: ReadyCheckpoint,
}

/// Resolves, downloads, verifies and caches one artifact.
pub struct CheckpointManager {
    cache_dir: PathBuf,
    spec: ArtifactSpec,
    fetcher: Arc<dyn ArtifactFetcher>,
    state: CheckpointState,
    transitions: Vec<&'static str>,
}

impl CheckpointManager {
    pub fn new(cache_dir: PathBuf, spec: ArtifactSpec, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            cache_dir,
            spec,
            fetcher,
            state: CheckpointState::Absent,
            transitions: vec![CheckpointState::Absent.name()],
        }
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Names of every state visited, in order.
    pub fn transitions(&self) -> &[&'static str] {
        &self.transitions
    }

    /// Canonical cache location of the artifact.
    pub fn canonical_path(&self) -> PathBuf {
        self.cache_dir.join(&self.spec.file_name)
    }

    fn partial_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.part", self.spec.file_name))
    }

    fn transition(&mut self, next: CheckpointState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal checkpoint transition {} -> {}",
            self.state.name(),
            next.name()
        );
        tracing::debug!(
            "{}: {} -> {}",
            self.spec.file_name,
            self.state.name(),
            next.name()
        );
        self.transitions.push(next.name());
        self.state = next;
    }

    async fn reject(&mut self, path: &Path, err: &CheckpointError) {
        tracing::warn!(
            "Rejecting {:?}: {}. Removing file.",
            path,
            err
        );
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove rejected artifact {:?}: {}", path, e);
            }
        }
        self.transition(CheckpointState::Rejected {
            path: path.to_path_buf(),
            reason: err.to_string(),
        });
    }

    /// Make the artifact `Ready`, downloading and verifying as needed.
    ///
    /// A cached copy is always re-verified before it is trusted. After one
    /// rejection the artifact is fetched again; a second rejection returns
    /// `CheckpointError::Integrity`. A rejected cache with no configured
    /// source also returns the integrity error.
    pub async fn ensure_ready(&mut self) -> Result<ReadyCheckpoint, CheckpointError> {
        if self.spec.blake3.trim().is_empty() {
            return Err(CheckpointError::MissingDigest {
                file_name: self.spec.file_name.clone(),
                key: self.spec.digest_key.to_string(),
            });
        }

        let canonical = self.canonical_path();
        let mut rejections = 0u32;
        let mut cache_rejection = None;

        if tokio::fs::metadata(&canonical)
            .await
            .is_ok_and(|m| m.is_file())
        {
            self.transition(CheckpointState::Downloaded {
                path: canonical.clone(),
                cached: true,
            });
            match verify_off_thread(&canonical, &self.spec.blake3).await {
                Ok(digest) => {
                    tracing::info!("Using cached {} at {:?}", self.spec.file_name, canonical);
                    return self.promote(canonical.clone(), canonical, digest).await;
                }
                Err(err @ CheckpointError::Integrity { .. }) => {
                    self.reject(&canonical, &err).await;
                    rejections += 1;
                    cache_rejection = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let Some(url) = self.spec.url.clone() else {
            return Err(cache_rejection.unwrap_or_else(|| CheckpointError::MissingSource {
                file_name: self.spec.file_name.clone(),
            }));
        };

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| CheckpointError::Io {
                path: self.cache_dir.clone(),
                source,
            })?;

        let partial = self.partial_path();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.transition(CheckpointState::Downloading { attempt });
            tracing::info!("Downloading {}...", self.spec.file_name);
            tracing::info!("  Source: {}", url);

            if let Err(err) = self.fetcher.fetch(&url, &partial).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
            self.transition(CheckpointState::Downloaded {
                path: partial.clone(),
                cached: false,
            });

            match verify_off_thread(&partial, &self.spec.blake3).await {
                Ok(digest) => return self.promote(partial.clone(), canonical, digest).await,
                Err(err @ CheckpointError::Integrity { .. }) => {
                    self.reject(&partial, &err).await;
                    rejections += 1;
                    if rejections >= MAX_REJECTIONS {
                        tracing::error!(
                            "{} failed verification {} times; refusing to load",
                            self.spec.file_name,
                            rejections
                        );
                        return Err(err);
                    }
                }
                Err(err) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(err);
                }
            }
        }
    }

    async fn promote(
        &mut self,
        verified_path: PathBuf,
        canonical: PathBuf,
        digest: blake3::Hash,
    ) -> Result<ReadyCheckpoint, CheckpointError> {
        self.transition(CheckpointState::Verified {
            path: verified_path.clone(),
        });
        if verified_path != canonical {
            if let Err(source) = tokio::fs::rename(&verified_path, &canonical).await {
                let _ = tokio::fs::remove_file(&verified_path).await;
                return Err(CheckpointError::Io {
                    path: canonical,
                    source,
                });
            }
        }
        self.transition(CheckpointState::Ready {
            path: canonical.clone(),
        });
        let hex = digest.to_hex().to_string();
        tracing::info!("{} ready ({}…)", self.spec.file_name, &hex[..16]);
        Ok(ReadyCheckpoint {
            local_path: canonical,
            digest: hex,
        })
    }
}

/// Hash on the blocking pool; weights files run to hundreds of megabytes.
async fn verify_off_thread(path: &Path, expected: &str) -> Result<blake3::Hash, CheckpointError> {
    let owned = path.to_path_buf();
    let expected = expected.to_string();
    tokio::task::spawn_blocking(move || ChecksumVerifier::verify(&owned, &expected))
        .await
        .map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?
}

/// Ensure both classifier artifacts are ready, in order weights then labels.
pub async fn ensure_model_artifacts(
    config: &Config,
    fetcher: Arc<dyn ArtifactFetcher>,
) -> Result<ModelArtifacts, CheckpointError> {
    let model_dir = config.model_dir();

    let mut weights =
        CheckpointManager::new(model_dir.clone(), ArtifactSpec::weights(config), fetcher.clone());
    let weights = weights.ensure_ready().await?;

    let mut labels = CheckpointManager::new(model_dir, ArtifactSpec::labels(config), fetcher);
    let labels = labels.ensure_ready().await?;

    Ok(ModelArtifacts { weights, labels })
}
