//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// Check a confidence threshold: finite and within [0, 1].
pub fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::ValidationError(format!(
            "tagging.threshold must be between 0.0 and 1.0, got {threshold}"
        )));
    }
    Ok(())
}

/// Check an optional top-N limit.
pub fn validate_top_n(top_n: Option<usize>) -> Result<(), ConfigError> {
    if top_n == Some(0) {
        return Err(ConfigError::ValidationError(
            "tagging.top_n must be a positive integer".into(),
        ));
    }
    Ok(())
}

/// Check a mini-batch size.
pub fn validate_batch_size(batch_size: usize) -> Result<(), ConfigError> {
    if batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "tagging.batch_size must be a positive integer".into(),
        ));
    }
    Ok(())
}

fn validate_digest(key: &str, digest: &str) -> Result<(), ConfigError> {
    if digest.is_empty() {
        return Ok(());
    }
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::ValidationError(format!(
            "checkpoint.{key} must be a 64-character hex BLAKE3 digest"
        )));
    }
    Ok(())
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.tagging.threshold)?;
        validate_top_n(self.tagging.top_n)?;
        validate_batch_size(self.tagging.batch_size)?;

        if self.limits.max_image_pixels == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_pixels must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.model.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.image_size must be > 0".into(),
            ));
        }
        if self.model.norm_std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            return Err(ConfigError::ValidationError(
                "model.norm_std values must be positive".into(),
            ));
        }
        if self.checkpoint.download_timeout_ms == 0 || self.checkpoint.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "checkpoint timeouts must be > 0".into(),
            ));
        }
        validate_digest("weights_blake3", &self.checkpoint.weights_blake3)?;
        validate_digest("labels_blake3", &self.checkpoint.labels_blake3)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.tagging.threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("threshold"));

        config.tagging.threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan_threshold() {
        assert!(validate_threshold(f32::NAN).is_err());
        assert!(validate_threshold(f32::INFINITY).is_err());
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(1.0).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let mut config = Config::default();
        config.tagging.top_n = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("top_n"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.tagging.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_zero_pixel_ceiling() {
        let mut config = Config::default();
        config.limits.max_image_pixels = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_image_pixels"));
    }

    #[test]
    fn test_validate_rejects_malformed_digest() {
        let mut config = Config::default();
        config.checkpoint.weights_blake3 = "not-a-digest".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("weights_blake3"));

        config.checkpoint.weights_blake3 = "a".repeat(64);
        assert!(config.validate().is_ok());
    }
}
