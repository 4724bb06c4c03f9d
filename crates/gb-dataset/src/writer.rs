//! Helpers for writing corpora in the layout [`crate::store::NpzRecordStore`] reads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use npyz::WriterBuilder;
use npyz::npz::NpzWriter;

use crate::schema::MatchRecord;
use crate::store::record_path;

/// Name of the sample-count manifest inside a data directory.
pub const MANIFEST_FILE: &str = "count.json";

/// Write `counts` as a JSON array, atomically via a temp path.
pub fn write_manifest(path: &Path, counts: &[usize]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(counts)?;
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Write one match as `<root>/<match_id>.npz` with `obs`, `mask`, `act`.
pub fn write_match_record(root: &Path, match_id: usize, record: &MatchRecord) -> Result<PathBuf> {
    fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
    let final_path = record_path(root, match_id);
    let tmp_path = final_path.with_extension("npz.tmp");
    let n = record.len() as u64;
    let shape = record.obs_shape();
    {
        let mut npz = NpzWriter::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;

        let mut writer = npz
            .array("obs", Default::default())?
            .default_dtype()
            .shape(&[n, shape.rows as u64, shape.cols as u64])
            .begin_nd()?;
        writer.extend(record.obs_data().iter().copied())?;
        writer.finish()?;

        let mut writer = npz
            .array("mask", Default::default())?
            .default_dtype()
            .shape(&[n, record.mask_width() as u64])
            .begin_nd()?;
        writer.extend(record.mask_data().iter().copied())?;
        writer.finish()?;

        let mut writer = npz
            .array("act", Default::default())?
            .default_dtype()
            .shape(&[n])
            .begin_nd()?;
        writer.extend(record.act_data().iter().copied())?;
        writer.finish()?;
    }
    fs::rename(&tmp_path, &final_path).with_context(|| {
        format!(
            "failed to rename {} -> {}",
            tmp_path.display(),
            final_path.display()
        )
    })?;
    Ok(final_path)
}

/// Summary returned after a corpus is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSummary {
    pub matches: usize,
    pub samples: usize,
}

/// Writes matches with consecutive ids and the manifest that indexes them.
pub struct CorpusWriter {
    out_dir: PathBuf,
    counts: Vec<usize>,
}

impl CorpusWriter {
    /// Target `out_dir`, refusing to clobber an existing manifest unless
    /// `overwrite` is set.
    pub fn new(out_dir: &Path, overwrite: bool) -> Result<Self> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let manifest = out_dir.join(MANIFEST_FILE);
        if manifest.exists() {
            if !overwrite {
                bail!(
                    "{MANIFEST_FILE} already exists in {} (use overwrite option)",
                    out_dir.display()
                );
            }
            fs::remove_file(&manifest)
                .with_context(|| format!("failed to remove {}", manifest.display()))?;
        }
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            counts: Vec::new(),
        })
    }

    /// Append a match; returns its id.
    pub fn push(&mut self, record: &MatchRecord) -> Result<usize> {
        let match_id = self.counts.len();
        write_match_record(&self.out_dir, match_id, record)?;
        self.counts.push(record.len());
        Ok(match_id)
    }

    /// Write the manifest and return what was written.
    pub fn finish(self) -> Result<CorpusSummary> {
        write_manifest(&self.out_dir.join(MANIFEST_FILE), &self.counts)?;
        let summary = CorpusSummary {
            matches: self.counts.len(),
            samples: self.counts.iter().sum(),
        };
        info!(
            "Wrote {} matches ({} samples) to {}",
            summary.matches,
            summary.samples,
            self.out_dir.display()
        );
        Ok(summary)
    }
}
