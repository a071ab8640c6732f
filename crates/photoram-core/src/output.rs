//! Result rendering: plain text, JSON, JSON Lines and CSV.
//!
//! JSON output is always an array, even for a single image, so consumers see
//! one shape regardless of input count. CSV always carries the same four
//! columns: `file,tags,confidences,error`.

use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;

use crate::types::{BatchResult, TagResult};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pipe-separated tags, one line per image
    #[default]
    Text,
    /// A single JSON array
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
    /// A header row plus one record per image
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    /// Parse format from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(Self::JsonLines),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Serializes tagging results in the chosen format.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    show_confidence: bool,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer.
    ///
    /// `pretty` only affects JSON; `show_confidence` only affects text.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            show_confidence: false,
        }
    }

    pub fn with_confidence(mut self, show: bool) -> Self {
        self.show_confidence = show;
        self
    }

    /// Write a whole run.
    pub fn write_batch(&mut self, batch: &BatchResult) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                let single = batch.len() == 1;
                for result in &batch.results {
                    let line = format_text_line(result, single, self.show_confidence);
                    writeln!(self.writer, "{line}")?;
                }
                Ok(())
            }
            OutputFormat::Json => self.write_json(&batch.results),
            OutputFormat::JsonLines => {
                for result in &batch.results {
                    self.write_line(result)?;
                }
                Ok(())
            }
            OutputFormat::Csv => self.write_csv(&batch.results),
        }
    }

    fn write_csv(&mut self, results: &[TagResult]) -> io::Result<()> {
        let mut out = csv::Writer::from_writer(&mut self.writer);
        out.write_record(["file", "tags", "confidences", "error"])
            .map_err(io::Error::other)?;
        for result in results {
            let file = result.file_path.to_string_lossy();
            let tags = format_tags(result, false);
            let confidences = result
                .tags
                .iter()
                .map(|t| format!("{:.4}", t.confidence))
                .collect::<Vec<_>>()
                .join(" | ");
            let error = result.error.as_ref().map(|f| f.message.as_str()).unwrap_or("");
            out.write_record([&*file, tags.as_str(), confidences.as_str(), error])
                .map_err(io::Error::other)?;
        }
        out.flush()
    }

    fn write_json<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, items).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, items).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_line<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        // JSONL is never pretty-printed (one object per line)
        serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Pipe-separated tag list, optionally with percentages.
pub fn format_tags(result: &TagResult, show_confidence: bool) -> String {
    result
        .tags
        .iter()
        .map(|t| {
            if show_confidence {
                format!("{} ({:.2}%)", t.tag_name, t.confidence * 100.0)
            } else {
                t.tag_name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// One text line. A lone image prints just its tags; otherwise the path is
/// prefixed with a tab separator.
fn format_text_line(result: &TagResult, single: bool, show_confidence: bool) -> String {
    let body = match &result.error {
        Some(failure) => format!("[error: {}]", failure.message),
        None => format_tags(result, show_confidence),
    };
    if single {
        body
    } else {
        format!("{}\t{}", result.file_path.display(), body)
    }
}
