//! Confidence vector to ordered tag list.

use std::cmp::Ordering;

use crate::error::ConfigError;
use crate::inference::LabelSet;
use crate::types::TagPrediction;

use super::overrides::OverrideMap;

/// Threshold, sort and top-N settings, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagFilter {
    threshold: f32,
    top_n: Option<usize>,
}

impl TagFilter {
    pub fn new(threshold: f32, top_n: Option<usize>) -> Result<Self, ConfigError> {
        crate::config::validate_threshold(threshold)?;
        crate::config::validate_top_n(top_n)?;
        Ok(Self { threshold, top_n })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn top_n(&self) -> Option<usize> {
        self.top_n
    }
}

/// Turns one image's confidences into its final tag list.
pub struct TagPostProcessor<'a> {
    filter: TagFilter,
    labels: &'a LabelSet,
    overrides: &'a OverrideMap,
}

impl<'a> TagPostProcessor<'a> {
    pub fn new(filter: TagFilter, labels: &'a LabelSet, overrides: &'a OverrideMap) -> Self {
        Self {
            filter,
            labels,
            overrides,
        }
    }

    /// Keep scores at or above the threshold, sort descending (ties by
    /// ascending tag id), truncate to top-N, then name each tag.
    ///
    /// Non-finite scores are dropped.
    pub fn process(&self, confidences: &[f32]) -> Vec<TagPrediction> {
        let mut kept: Vec<(usize, f32)> = confidences
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, c)| c.is_finite() && *c >= self.filter.threshold)
            .collect();

        kept.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        if let Some(n) = self.filter.top_n {
            kept.truncate(n);
        }

        kept.into_iter()
            .map(|(tag_id, confidence)| {
                let raw = self.labels.name(tag_id);
                TagPrediction {
                    tag_id,
                    tag_name: self.overrides.apply(&raw).to_string(),
                    confidence: confidence.clamp(0.0, 1.0),
                }
            })
            .collect()
    }
}
