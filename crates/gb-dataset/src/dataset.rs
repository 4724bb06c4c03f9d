//! Flat, randomly indexable view over a window of recorded matches.

use anyhow::{Context, Result};
use log::info;
use rand::Rng;

use crate::augment::Augmenter;
use crate::cache::{EagerCache, LruCache, SampleCache};
use crate::config::{CachePolicy, DatasetOptions};
use crate::error::DatasetError;
use crate::index::MatchIndex;
use crate::manifest::{Manifest, SelectionWindow};
use crate::schema::Sample;
use crate::store::{NpzRecordStore, RecordStore};

/// Shape of an opened dataset, for logs and tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub total_matches: usize,
    pub window: SelectionWindow,
    pub samples: usize,
    pub policy: CachePolicy,
    pub resident: usize,
    pub augment: bool,
}

/// `len()` samples addressable by a global index in `[0, len())`.
///
/// Samples are numbered in match order, then by position within the match.
/// `get` copies the sample out of the cache before augmenting, so cached
/// records are never modified and repeated unaugmented reads are identical.
pub struct MatchDataset {
    total_matches: usize,
    window: SelectionWindow,
    index: MatchIndex,
    cache: Box<dyn SampleCache>,
    policy: CachePolicy,
    augmenter: Option<Augmenter>,
}

impl MatchDataset {
    /// Open `options.data_dir`: read `count.json`, select the window and
    /// populate the cache from `<match_id>.npz` files.
    pub fn open(options: &DatasetOptions) -> Result<Self> {
        let manifest_path = options.manifest_path();
        let manifest = Manifest::load(&manifest_path)?;
        let store = NpzRecordStore::new(&options.data_dir);
        Self::with_store(options, &manifest, store)
            .with_context(|| format!("failed to open dataset {}", options.data_dir.display()))
    }

    /// Build over an arbitrary record store. `options.data_dir` is ignored.
    pub fn with_store<S: RecordStore + 'static>(
        options: &DatasetOptions,
        manifest: &Manifest,
        store: S,
    ) -> Result<Self> {
        let window = manifest.window(options.begin, options.end)?;
        let counts = window.slice(manifest.counts());
        let index = MatchIndex::new(counts);

        let cache: Box<dyn SampleCache> = match options.cache {
            CachePolicy::Eager => Box::new(EagerCache::preload(
                &store,
                window,
                counts,
                options.preload_workers,
            )?),
            CachePolicy::Lru => Box::new(LruCache::new(
                store,
                window,
                counts,
                options.cache_capacity,
            )?),
        };

        info!(
            "Dataset ready: matches {}..{} of {}, {} samples, {:?} cache, augment={}",
            window.begin_idx,
            window.end_idx,
            manifest.len(),
            index.total_samples(),
            options.cache,
            options.augment
        );

        Ok(Self {
            total_matches: manifest.len(),
            window,
            index,
            cache,
            policy: options.cache,
            augmenter: options.augmenter(),
        })
    }

    pub fn len(&self) -> usize {
        self.index.total_samples()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch sample `index`, augmenting with a thread-local RNG when enabled.
    pub fn get(&self, index: usize) -> Result<Sample> {
        self.get_with_rng(index, &mut rand::thread_rng())
    }

    /// Fetch sample `index`, drawing augmentation randomness from `rng`.
    pub fn get_with_rng<R: Rng>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        let (match_id, offset) = self.index.resolve(index)?;
        let record = self.cache.get(match_id)?;
        let mut sample = record.sample(offset);
        if let Some(augmenter) = &self.augmenter {
            augmenter.augment(&mut sample.obs, rng);
        }
        Ok(sample)
    }

    /// [`MatchDataset::get`] for callers holding signed indices; negative
    /// indices are out of range.
    pub fn get_signed(&self, index: i64) -> Result<Sample> {
        let idx = usize::try_from(index).map_err(|_| DatasetError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        self.get(idx)
    }

    /// Resolve a global index to `(corpus match id, offset in match)`.
    pub fn locate(&self, index: usize) -> Result<(usize, usize)> {
        let (match_id, offset) = self.index.resolve(index)?;
        Ok((self.window.absolute(match_id), offset))
    }

    pub fn window(&self) -> SelectionWindow {
        self.window
    }

    pub fn index(&self) -> &MatchIndex {
        &self.index
    }

    pub fn cache(&self) -> &dyn SampleCache {
        self.cache.as_ref()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            total_matches: self.total_matches,
            window: self.window,
            samples: self.len(),
            policy: self.policy,
            resident: self.cache.resident(),
            augment: self.augmenter.is_some(),
        }
    }
}
