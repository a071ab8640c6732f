//! The `photoram info` command: version, devices and checkpoint status.

use photoram_core::checkpoint::ArtifactSpec;
use photoram_core::inference::detect_accelerator;
use photoram_core::{Config, ExifToolWriter, PhotoramError};

/// Execute the info command.
pub async fn execute() -> anyhow::Result<()> {
    let config = Config::load().map_err(PhotoramError::from)?;

    println!("photoram v{}", photoram_core::VERSION);

    let accelerator = detect_accelerator();
    println!(
        "  Accelerator:     {}",
        accelerator.map_or_else(|| "none".to_string(), |d| d.to_string())
    );
    match config.model.device.resolve(|| accelerator) {
        Ok(device) => println!("  Device:          {} (configured: {})", device, config.model.device),
        Err(e) => println!("  Device:          unavailable ({e})"),
    }
    println!("  Image size:      {}px", config.model.image_size);
    println!("  Pixel ceiling:   {}", config.limits.max_image_pixels);

    println!("  Model dir:       {}", config.model_dir().display());
    for spec in [ArtifactSpec::weights(&config), ArtifactSpec::labels(&config)] {
        let path = config.model_dir().join(&spec.file_name);
        let status = match std::fs::metadata(&path) {
            Ok(meta) => format!("cached, {:.1} MB", meta.len() as f64 / (1024.0 * 1024.0)),
            Err(_) => "not cached".to_string(),
        };
        let pinned = if spec.blake3.is_empty() { "unpinned" } else { "pinned" };
        println!("    - {:24} {} ({})", spec.file_name, status, pinned);
    }

    println!("  Config file:     {}", Config::default_path().display());
    println!(
        "  exiftool:        {}",
        if ExifToolWriter::default().is_available().await {
            "available"
        } else {
            "not found"
        }
    );

    Ok(())
}
