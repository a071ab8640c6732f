//! Writing tags into image metadata with exiftool.
//!
//! Tags go to both `IPTC:Keywords` and `XMP:Subject`. The file path is always
//! passed as a discrete argument after `--`, never through a shell, so a file
//! name starting with `-` cannot be read as an option.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::MetadataError;

/// Runs `exiftool` to embed tags in image files.
#[derive(Debug, Clone)]
pub struct ExifToolWriter {
    program: PathBuf,
}

impl Default for ExifToolWriter {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifToolWriter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Argument vector for one file, excluding the program itself.
    pub fn build_args(path: &Path, tags: &[&str]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-overwrite_original".into()];
        for tag in tags {
            args.push(format!("-IPTC:Keywords={tag}").into());
            args.push(format!("-XMP:Subject={tag}").into());
        }
        args.push("--".into());
        args.push(path.as_os_str().to_owned());
        args
    }

    /// Whether the tool can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-ver")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Write `tags` into `path`, replacing the file in place.
    pub async fn write(&self, path: &Path, tags: &[&str]) -> Result<(), MetadataError> {
        let output = Command::new(&self.program)
            .args(Self::build_args(path, tags))
            .output()
            .await
            .map_err(|e| MetadataError::NotInstalled {
                program: self.program_name(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MetadataError::Failed {
                program: self.program_name(),
                path: path.to_path_buf(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!("Wrote {} tag(s) to {:?}", tags.len(), path);
        Ok(())
    }
}
