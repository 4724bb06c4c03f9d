//! Per-match sample counts (`count.json`) and the match window selected from them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::error::DatasetError;

/// Ordered sample counts for every match in the corpus, indexed by match id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    counts: Vec<usize>,
}

impl Manifest {
    pub fn new(counts: Vec<usize>) -> Self {
        Self { counts }
    }

    /// Read a JSON array of non-negative integers.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let counts: Vec<usize> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        debug!(
            "manifest {}: {} matches, {} samples",
            path.display(),
            counts.len(),
            counts.iter().sum::<usize>()
        );
        Ok(Self { counts })
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of matches in the whole corpus.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Resolve fractional bounds against this manifest.
    pub fn window(&self, begin: f64, end: f64) -> Result<SelectionWindow> {
        Ok(SelectionWindow::from_fractions(begin, end, self.len())?)
    }
}

/// Contiguous range of matches `[begin_idx, end_idx)` backing one dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionWindow {
    pub begin_idx: usize,
    pub end_idx: usize,
}

impl SelectionWindow {
    /// Convert fractional bounds over `total_matches` into match indices,
    /// truncating toward zero.
    pub fn from_fractions(
        begin: f64,
        end: f64,
        total_matches: usize,
    ) -> Result<Self, DatasetError> {
        let invalid = |reason| DatasetError::InvalidWindow { begin, end, reason };
        if !begin.is_finite() || !end.is_finite() {
            return Err(invalid("bounds must be finite"));
        }
        if !(0.0..=1.0).contains(&begin) || !(0.0..=1.0).contains(&end) {
            return Err(invalid("bounds must lie in [0, 1]"));
        }
        if begin > end {
            return Err(invalid("begin must not exceed end"));
        }
        let to_idx = |frac: f64| ((frac * total_matches as f64) as usize).min(total_matches);
        Ok(Self {
            begin_idx: to_idx(begin),
            end_idx: to_idx(end),
        })
    }

    /// The full corpus.
    pub fn all(total_matches: usize) -> Self {
        Self {
            begin_idx: 0,
            end_idx: total_matches,
        }
    }

    /// Number of matches in the window.
    pub fn len(&self) -> usize {
        self.end_idx - self.begin_idx
    }

    pub fn is_empty(&self) -> bool {
        self.begin_idx == self.end_idx
    }

    /// Corpus-wide match id for an in-window position.
    pub fn absolute(&self, match_id: usize) -> usize {
        self.begin_idx + match_id
    }

    /// The counts belonging to this window.
    pub fn slice<'a>(&self, counts: &'a [usize]) -> &'a [usize] {
        &counts[self.begin_idx..self.end_idx]
    }
}
