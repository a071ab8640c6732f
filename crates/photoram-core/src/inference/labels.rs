//! Class-index to tag-name mapping.
//!
//! The label file has one label per line, line N naming class N. Lines are
//! kept positionally, blank ones included, so indices stay aligned.

use std::path::Path;

use crate::error::ModelError;

/// Display names for every classifier output index.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Read and normalize a label file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: format!("Failed to read labels: {e}"),
        })?;
        let labels = Self::from_lines(content.lines());
        if labels.is_empty() {
            return Err(ModelError::Load {
                path: path.to_path_buf(),
                message: "Label file is empty".to_string(),
            });
        }
        tracing::debug!("Loaded {} labels from {:?}", labels.len(), path);
        Ok(labels)
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let names = lines
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| normalize(raw).unwrap_or_else(|| fallback_name(idx)))
            .collect();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a class index; `class_{idx}` when unnamed or out of range.
    pub fn name(&self, idx: usize) -> String {
        self.names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| fallback_name(idx))
    }
}

fn fallback_name(idx: usize) -> String {
    format!("class_{idx}")
}

/// Trim, first comma-separated synonym, underscores to spaces.
/// `None` for blanks and generated placeholders.
fn normalize(raw: &str) -> Option<String> {
    let first = raw.split(',').next().unwrap_or("").trim();
    let name = first.replace('_', " ").trim().to_string();
    if name.is_empty() || is_placeholder(&name) {
        None
    } else {
        Some(name)
    }
}

/// Matches `label 12`, `label_12`, `Label-12`, `label12`.
fn is_placeholder(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("label") else {
        return false;
    };
    let digits = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '_' || c == '-');
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
