use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use gb_dataset::{
    DatasetError, DatasetOptions, LruCache, Manifest, MatchDataset, MatchRecord, NpzRecordStore,
    ObsShape, RecordStore, SampleCache, SelectionWindow,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::{TempDir, tempdir};

/// Writes a corpus where sample `k` of match `m` carries `act == 1000 * m + k`.
fn write_corpus(counts: &[usize]) -> TempDir {
    let dir = tempdir().unwrap();
    let mut writer = gb_dataset::CorpusWriter::new(dir.path(), false).unwrap();
    let shape = ObsShape::new(2, 34);
    for (m, &n) in counts.iter().enumerate() {
        let obs = (0..n * shape.numel()).map(|v| (v % 5) as f32).collect();
        let mask = vec![1.0; n * 4];
        let act = (0..n).map(|k| (1000 * m + k) as i64).collect();
        writer
            .push(&MatchRecord::new(shape, 4, obs, mask, act).unwrap())
            .unwrap();
    }
    writer.finish().unwrap();
    dir
}

struct CountingStore {
    inner: NpzRecordStore,
    loads: AtomicUsize,
}

impl RecordStore for CountingStore {
    fn load(&self, match_id: usize) -> Result<MatchRecord> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(match_id)
    }
}

#[test]
fn length_matches_window_sum_for_every_split() {
    let counts = [3, 0, 5, 2, 7, 1, 0, 4, 6, 2];
    let dir = write_corpus(&counts);
    for (begin, end) in [(0.0, 1.0), (0.0, 0.9), (0.9, 1.0), (0.25, 0.75), (0.5, 0.5)] {
        let opts = DatasetOptions::new(dir.path()).window(begin, end);
        let ds = MatchDataset::open(&opts).unwrap();
        let w = ds.window();
        let expected: usize = counts[w.begin_idx..w.end_idx].iter().sum();
        assert_eq!(ds.len(), expected, "window {begin}..{end}");

        let mut seen = Vec::new();
        for i in 0..ds.len() {
            let sample = ds.get(i).unwrap();
            let (m, k) = ds.locate(i).unwrap();
            assert_eq!(sample.act, (1000 * m + k) as i64);
            seen.push((m, k));
        }
        let all: Vec<(usize, usize)> = (w.begin_idx..w.end_idx)
            .flat_map(|m| (0..counts[m]).map(move |k| (m, k)))
            .collect();
        assert_eq!(seen, all);
    }
}

#[test]
fn train_and_validation_splits_partition_the_corpus() {
    let counts = [4, 4, 4, 4, 4, 4, 4, 4, 4, 4];
    let dir = write_corpus(&counts);
    let train = MatchDataset::open(&DatasetOptions::new(dir.path()).window(0.0, 0.9)).unwrap();
    let valid = MatchDataset::open(&DatasetOptions::new(dir.path()).window(0.9, 1.0)).unwrap();
    assert_eq!(train.len() + valid.len(), 40);
    assert_eq!(train.window().end_idx, valid.window().begin_idx);
}

#[test]
fn boundary_manifest_resolves_as_documented() {
    let dir = write_corpus(&[3, 5, 2]);
    let ds = MatchDataset::open(&DatasetOptions::new(dir.path())).unwrap();
    assert_eq!(ds.index().offsets(), &[0, 3, 8]);
    assert_eq!(ds.len(), 10);
    assert_eq!(ds.locate(0).unwrap(), (0, 0));
    assert_eq!(ds.locate(3).unwrap(), (1, 0));
    assert_eq!(ds.locate(9).unwrap(), (2, 1));

    for err in [ds.get(10).unwrap_err(), ds.get_signed(-1).unwrap_err()] {
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::IndexOutOfRange { .. })
        ));
    }
}

#[test]
fn lru_over_npz_follows_strict_recency() {
    let counts = [1, 1, 1];
    let dir = write_corpus(&counts);
    let store = Arc::new(CountingStore {
        inner: NpzRecordStore::new(dir.path()),
        loads: AtomicUsize::new(0),
    });
    let cache = LruCache::new(store.clone(), SelectionWindow::all(3), &counts, 2).unwrap();

    let mut loads_after = Vec::new();
    for id in [0, 1, 2, 0, 1] {
        cache.get(id).unwrap();
        loads_after.push(store.loads.load(Ordering::SeqCst));
    }
    assert_eq!(loads_after, vec![1, 2, 3, 4, 5]);
    assert_eq!(cache.resident_ids(), vec![0, 1]);
}

#[test]
fn lru_dataset_reports_missing_record_on_first_access() {
    let dir = write_corpus(&[2, 2]);
    std::fs::remove_file(dir.path().join("1.npz")).unwrap();

    let eager = MatchDataset::open(&DatasetOptions::new(dir.path()));
    assert!(eager.is_err(), "eager preload must fail up front");

    let lazy = MatchDataset::open(&DatasetOptions::new(dir.path()).lru(4)).unwrap();
    assert_eq!(lazy.get(1).unwrap().act, 1);
    let err = lazy.get(2).unwrap_err();
    assert!(format!("{err:#}").contains("1.npz"), "{err:#}");
}

#[test]
fn injected_store_and_concurrent_readers() {
    let counts = vec![6, 6, 6, 6];
    let dir = write_corpus(&counts);
    let store = Arc::new(CountingStore {
        inner: NpzRecordStore::new(dir.path()),
        loads: AtomicUsize::new(0),
    });
    let opts = DatasetOptions::new("unused").augmented(true);
    let ds = MatchDataset::with_store(&opts, &Manifest::new(counts), store.clone()).unwrap();
    assert_eq!(store.loads.load(Ordering::SeqCst), 4);

    std::thread::scope(|s| {
        for t in 0..4u64 {
            let ds = &ds;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                for i in 0..ds.len() {
                    let sample = ds.get_with_rng(i, &mut rng).unwrap();
                    assert_eq!(sample.obs.shape(), ObsShape::new(2, 34));
                    assert_eq!(sample.act % 1000, (i % 6) as i64);
                }
            });
        }
    });
    assert_eq!(store.loads.load(Ordering::SeqCst), 4);
}
