//! Partitioning of ordered tasks into fixed-size inference windows.

use crate::config::validate_batch_size;
use crate::error::ConfigError;
use crate::types::ImageTask;

/// A contiguous group of at most `batch_size` tasks.
///
/// Borrows the tasks; holds no image data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchWindow<'a> {
    /// Position of this window in the plan
    pub index: usize,
    pub tasks: &'a [ImageTask],
}

impl BatchWindow<'_> {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Splits an ordered task list into windows, preserving order.
///
/// `windows()` can be called any number of times; each call starts over.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner<'a> {
    tasks: &'a [ImageTask],
    batch_size: usize,
}

impl<'a> BatchPlanner<'a> {
    /// Rejects a zero `batch_size` before any window is produced.
    pub fn new(tasks: &'a [ImageTask], batch_size: usize) -> Result<Self, ConfigError> {
        validate_batch_size(batch_size)?;
        Ok(Self { tasks, batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of windows the plan yields.
    pub fn window_count(&self) -> usize {
        self.tasks.len().div_ceil(self.batch_size)
    }

    /// Lazily yield windows in order. The last may be shorter.
    pub fn windows(&self) -> impl Iterator<Item = BatchWindow<'a>> + 'a {
        self.tasks
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, tasks)| BatchWindow { index, tasks })
    }
}
