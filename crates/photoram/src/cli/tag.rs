//! The `photoram tag` command.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use photoram_core::pipeline::FileDiscovery;
use photoram_core::{
    BatchResult, Config, Device, ExifToolWriter, OutputFormat, OutputWriter, PhotoramError,
    RunStats, TaggingService,
};
use tokio_util::sync::CancellationToken;

/// Arguments for the `tag` command.
///
/// Flags left unset fall back to the config file.
#[derive(Args, Debug)]
pub struct TagArgs {
    /// Image files or directories to tag
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Minimum confidence for a tag (0.0-1.0)
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Maximum number of tags per image
    #[arg(short = 'n', long)]
    pub top_n: Option<usize>,

    /// Images per forward pass (also the decoded-image memory bound)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show confidence scores in text output
    #[arg(short, long)]
    pub confidence: bool,

    /// Write tags into image metadata with exiftool
    #[arg(short, long)]
    pub write_metadata: bool,

    /// Tag override JSON file ({"raw name": "display name"})
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Compute device: auto, cpu or accelerator (cuda, mps, gpu)
    #[arg(long)]
    pub device: Option<Device>,

    /// Reject images whose declared width x height exceeds this
    #[arg(long, env = "PHOTORAM_MAX_IMAGE_PIXELS")]
    pub max_image_pixels: Option<u64>,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output formats accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    /// Pipe-separated tags; `path<TAB>tags` for several images
    Text,
    /// A single JSON array
    Json,
    /// One JSON object per line
    Jsonl,
    /// `file,tags,confidences,error` with a header row
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Jsonl => OutputFormat::JsonLines,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

impl TagArgs {
    /// Overlay command-line flags onto the loaded configuration.
    fn apply_to(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.tagging.threshold = threshold;
        }
        if self.top_n.is_some() {
            config.tagging.top_n = self.top_n;
        }
        if let Some(batch_size) = self.batch_size {
            config.tagging.batch_size = batch_size;
        }
        if self.recursive {
            config.discovery.recursive = true;
        }
        if let Some(path) = &self.overrides {
            config.tagging.overrides = Some(path.clone());
        }
        if let Some(device) = self.device {
            config.model.device = device;
        }
        if let Some(max) = self.max_image_pixels {
            config.limits.max_image_pixels = max;
        }
    }
}

/// Execute the tag command.
pub async fn execute(args: TagArgs) -> anyhow::Result<()> {
    let mut config = Config::load().map_err(PhotoramError::from)?;
    args.apply_to(&mut config);
    config.validate().map_err(PhotoramError::from)?;

    // Discover before touching the model so an empty input fails fast.
    let tasks = FileDiscovery::new(config.discovery.clone())
        .discover(&args.inputs)
        .map_err(PhotoramError::from)?;
    tracing::info!("Found {} image(s) to tag", tasks.len());

    let service = TaggingService::initialize(config).await?;
    tracing::info!(
        "Model ready on {} ({} labels)",
        service.engine().device(),
        service.engine().labels().len()
    );

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing the current window");
                cancel.cancel();
            }
        }
    });

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar(tasks.len() as u64)
    };
    let run = service
        .tag_tasks(&tasks, &cancel, |event| {
            progress.inc(1);
            if let Some(name) = event.path.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
        })
        .await?;
    progress.finish_and_clear();
    watcher.abort();

    for failed in run.results.failed() {
        if let Some(failure) = &failed.error {
            tracing::debug!("{}: {}", failed.file_path.display(), failure.message);
        }
    }

    write_results(&run.results, &args)?;

    if args.write_metadata && !cancel.is_cancelled() {
        write_metadata(&run.results).await;
    }

    if !args.quiet {
        print_summary(&run.stats, run.results.len());
    }

    if cancel.is_cancelled() {
        anyhow::bail!(
            "Interrupted: {} image(s) were not processed",
            run.stats.cancelled
        );
    }

    Ok(())
}

/// Render results to the output file or stdout.
fn write_results(results: &BatchResult, args: &TagArgs) -> anyhow::Result<()> {
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create output file {}", path.display()))?;
            render(BufWriter::new(file), results, args)?;
            if !args.quiet {
                eprintln!("Results written to {}", path.display());
            }
        }
        None => render(std::io::stdout().lock(), results, args)?,
    }
    Ok(())
}

fn render<W: Write>(writer: W, results: &BatchResult, args: &TagArgs) -> std::io::Result<()> {
    let mut writer =
        OutputWriter::new(writer, args.format.into(), args.pretty).with_confidence(args.confidence);
    writer.write_batch(results)?;
    writer.flush()
}

/// Embed tags into every successfully tagged image. Failures are warnings.
async fn write_metadata(results: &BatchResult) {
    let writer = ExifToolWriter::default();
    if !writer.is_available().await {
        tracing::warn!("exiftool is not installed; skipping metadata writes");
        return;
    }

    let mut written = 0usize;
    for result in results.succeeded().filter(|r| !r.tags.is_empty()) {
        match writer.write(&result.file_path, &result.tag_names()).await {
            Ok(()) => written += 1,
            Err(e) => tracing::warn!("Metadata write failed: {e}"),
        }
    }
    tracing::info!("Wrote metadata to {written} image(s)");
}

/// Create a progress bar for a tagging run.
fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("loading...");
    pb
}

fn print_summary(stats: &RunStats, total: usize) {
    let rate = if stats.total_seconds > 0.0 {
        stats.succeeded as f64 / stats.total_seconds
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Tagged:       {:>8}", stats.succeeded);
    if stats.failed > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed);
    }
    if stats.cancelled > 0 {
        eprintln!("    Cancelled:    {:>8}", stats.cancelled);
    }
    if stats.degraded_windows > 0 {
        eprintln!("    Retried wins: {:>8}", stats.degraded_windows);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", stats.total_seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("    Peak decoded: {:>8}", stats.peak_resident_images);
    eprintln!("  ====================================");
}
