//! BLAKE3 content verification for cached and downloaded artifacts.
//!
//! Verification is pure: it reads the file and compares digests. Deleting a
//! rejected artifact is the caller's job.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::CheckpointError;

/// Verifies artifact files against trusted digests.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Stream a file through BLAKE3 without loading it into memory.
    pub fn digest_file(path: &Path) -> std::io::Result<blake3::Hash> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = blake3::Hasher::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize())
    }

    /// Hex digest of a file, for pinning new artifacts in configuration.
    pub fn digest_hex(path: &Path) -> std::io::Result<String> {
        Ok(Self::digest_file(path)?.to_hex().to_string())
    }

    /// Check `path` against `expected` (hex BLAKE3).
    ///
    /// Returns the verified digest, `CheckpointError::Integrity` on mismatch or
    /// `CheckpointError::Io` if the file cannot be read.
    pub fn verify(path: &Path, expected: &str) -> Result<blake3::Hash, CheckpointError> {
        let expected_hash =
            blake3::Hash::from_hex(expected.trim()).map_err(|_| CheckpointError::Integrity {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual: "<unparseable trusted digest>".to_string(),
            })?;

        let actual = Self::digest_file(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // blake3::Hash equality is constant-time.
        if actual != expected_hash {
            return Err(CheckpointError::Integrity {
                path: path.to_path_buf(),
                expected: expected_hash.to_hex().to_string(),
                actual: actual.to_hex().to_string(),
            });
        }

        tracing::debug!("Checksum verified for {:?}: {}…", path, &actual.to_hex()[..16]);
        Ok(actual)
    }
}
