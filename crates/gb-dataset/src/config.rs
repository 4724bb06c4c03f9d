use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::augment::Augmenter;
use crate::writer::MANIFEST_FILE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Load the whole window at construction.
    #[default]
    Eager,
    /// Keep at most `cache_capacity` matches resident.
    Lru,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct DatasetOptions {
    /// Directory holding `count.json` and `<match_id>.npz`.
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Fractional start of the match window, in [0, 1].
    #[serde(default)]
    pub begin: f64,
    /// Fractional end of the match window, in [0, 1].
    #[serde(default = "defaults::end")]
    pub end: f64,

    #[serde(default)]
    pub augment: bool,

    #[serde(default)]
    pub cache: CachePolicy,
    /// Resident match limit; only read under `CachePolicy::Lru`.
    #[serde(default = "defaults::cache_capacity")]
    pub cache_capacity: usize,
    /// Thread count for the eager preload (Rayon default when unset).
    #[serde(default)]
    pub preload_workers: Option<usize>,

    /// Enable the experimental hand shuffle on top of `augment`.
    #[serde(default)]
    pub shuffle_hand: bool,
    /// Half-open row range `[start, end)` the hand shuffle touches.
    #[serde(default = "defaults::hand_rows")]
    pub hand_rows: [usize; 2],

    /// Seed for reproducible augmentation in tools that draw their own RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            begin: 0.0,
            end: defaults::end(),
            augment: false,
            cache: CachePolicy::default(),
            cache_capacity: defaults::cache_capacity(),
            preload_workers: None,
            shuffle_hand: false,
            hand_rows: defaults::hand_rows(),
            seed: None,
        }
    }
}

impl DatasetOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn window(mut self, begin: f64, end: f64) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    pub fn augmented(mut self, augment: bool) -> Self {
        self.augment = augment;
        self
    }

    pub fn lru(mut self, capacity: usize) -> Self {
        self.cache = CachePolicy::Lru;
        self.cache_capacity = capacity;
        self
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE)
    }

    /// The augmentation pipeline these options ask for, if any.
    pub fn augmenter(&self) -> Option<Augmenter> {
        if !self.augment {
            return None;
        }
        Some(if self.shuffle_hand {
            Augmenter::with_hand_shuffle(self.hand_rows[0]..self.hand_rows[1])
        } else {
            Augmenter::new()
        })
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn data_dir() -> PathBuf { PathBuf::from("data") }
    pub fn end() -> f64 { 1.0 }
    pub fn cache_capacity() -> usize { 10 }
    pub fn hand_rows() -> [usize; 2] { [2, 6] }
}
