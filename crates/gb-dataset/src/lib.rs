//! Random-access training samples over recorded MahjongGB matches.
//!
//! A corpus is a directory with `count.json` (samples per match) and one
//! `<match_id>.npz` per match. [`MatchDataset`] selects a contiguous window of
//! matches, maps flat sample indices onto `(match, offset)` through a
//! prefix-sum [`MatchIndex`], serves records from a [`SampleCache`] and
//! optionally applies suit/rank symmetry augmentation to observations.
//!
//! ```no_run
//! use gb_dataset::{DatasetOptions, MatchDataset};
//!
//! let train = MatchDataset::open(&DatasetOptions::new("data").window(0.0, 0.9).augmented(true))?;
//! let sample = train.get(0)?;
//! println!("{} samples, obs {:?}", train.len(), sample.obs.shape());
//! # anyhow::Ok(())
//! ```

use indicatif::{ProgressBar, ProgressStyle};

pub mod augment;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod index;
pub mod manifest;
pub mod schema;
pub mod store;
pub mod writer;

pub use augment::{Applied, Augmenter};
pub use cache::{EagerCache, LruCache, SampleCache};
pub use config::{CachePolicy, DatasetOptions};
pub use dataset::{DatasetSummary, MatchDataset};
pub use error::DatasetError;
pub use index::MatchIndex;
pub use manifest::{Manifest, SelectionWindow};
pub use schema::{MatchRecord, ObsShape, Observation, Sample};
pub use store::{NpzRecordStore, RecordStore};
pub use writer::{CorpusSummary, CorpusWriter};

pub(crate) fn default_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}
