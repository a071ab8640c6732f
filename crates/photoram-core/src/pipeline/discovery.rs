//! Expands user inputs into an ordered list of image tasks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::types::ImageTask;

/// Discovers image files from explicit paths and directories.
pub struct FileDiscovery {
    config: DiscoveryConfig,
}

impl FileDiscovery {
    /// Create a new file discovery instance.
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Turn inputs into `ImageTask`s with sequence indices assigned in order.
    ///
    /// Explicit file arguments come first, in the caller's order. Each
    /// directory is then expanded in the caller's order, its contents sorted
    /// lexicographically by path. Inputs that do not exist are skipped with a
    /// warning. A path that appears twice is only tagged once.
    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<ImageTask>, DiscoveryError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();

        for input in inputs {
            if input.is_dir() {
                dirs.push(input);
            } else if !input.exists() {
                tracing::warn!("Skipping {:?}: no such file or directory", input);
            } else if self.is_supported(input) {
                files.push(resolve(input));
            } else {
                tracing::warn!("Skipping {:?}: unsupported file type", input);
            }
        }

        for dir in dirs {
            files.extend(self.expand_dir(dir));
        }

        let mut seen = HashSet::new();
        let tasks: Vec<ImageTask> = files
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .enumerate()
            .map(|(i, path)| ImageTask::new(path, i))
            .collect();

        if tasks.is_empty() {
            return Err(DiscoveryError::NoImages {
                inputs: inputs.to_vec(),
                formats: self.config.supported_formats.join(", "),
            });
        }

        tracing::debug!("Discovered {} image(s) from {} input(s)", tasks.len(), inputs.len());
        Ok(tasks)
    }

    /// Supported files under `dir`, sorted. Symlinks are not followed.
    fn expand_dir(&self, dir: &Path) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(dir).follow_links(false);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        }

        let mut files: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", dir, err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .map(|entry| resolve(entry.path()))
            .collect();

        files.sort();
        files
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.to_lowercase() == ext_lower)
            })
            .unwrap_or(false)
    }
}

/// Absolute, symlink-resolved path where possible.
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
