//! Resident match records behind one lookup interface.
//!
//! [`EagerCache`] loads the whole window up front and is read-only afterwards.
//! [`LruCache`] keeps at most `capacity` matches and loads the rest on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::DatasetError;
use crate::manifest::SelectionWindow;
use crate::schema::MatchRecord;
use crate::store::RecordStore;

/// Matches between preload progress log lines.
const LOG_EVERY: usize = 128;

/// Lookup of decoded records by in-window match position.
pub trait SampleCache: Send + Sync {
    fn get(&self, match_id: usize) -> Result<Arc<MatchRecord>>;

    /// Number of matches currently held in memory.
    fn resident(&self) -> usize;
}

fn check_count(record: &MatchRecord, match_id: usize, expected: usize) -> Result<()> {
    if record.len() != expected {
        return Err(DatasetError::CountMismatch {
            match_id,
            expected,
            found: record.len(),
        }
        .into());
    }
    Ok(())
}

/// Every match of the window, loaded once at construction.
pub struct EagerCache {
    records: Vec<Arc<MatchRecord>>,
}

impl EagerCache {
    /// Load all matches of `window` from `store`.
    ///
    /// `counts` are the manifest counts for the window; a record whose length
    /// disagrees fails the whole preload. Loads run on the Rayon pool (or a
    /// dedicated pool of `workers` threads) and land in match order.
    pub fn preload<S: RecordStore>(
        store: &S,
        window: SelectionWindow,
        counts: &[usize],
        workers: Option<usize>,
    ) -> Result<Self> {
        let total = window.len();
        info!(
            "Preloading {} matches ({}..{})",
            total, window.begin_idx, window.end_idx
        );
        let pb = crate::default_progress_bar(total as u64);
        pb.set_message("loading matches");
        let done = AtomicUsize::new(0);

        let process = || -> Result<Vec<Arc<MatchRecord>>> {
            (0..total)
                .into_par_iter()
                .map(|match_id| {
                    let absolute = window.absolute(match_id);
                    let record = store
                        .load(absolute)
                        .with_context(|| format!("failed to preload match {absolute}"))?;
                    check_count(&record, absolute, counts[match_id])?;
                    pb.inc(1);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % LOG_EVERY == 0 {
                        info!("loaded {n}/{total} matches");
                    }
                    Ok(Arc::new(record))
                })
                .collect()
        };

        let records = if let Some(n) = workers {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("failed to build rayon thread pool")?
                .install(process)?
        } else {
            process()?
        };

        pb.finish_with_message("matches loaded");
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SampleCache for EagerCache {
    fn get(&self, match_id: usize) -> Result<Arc<MatchRecord>> {
        self.records
            .get(match_id)
            .cloned()
            .ok_or_else(|| DatasetError::out_of_range(match_id, self.records.len()).into())
    }

    fn resident(&self) -> usize {
        self.records.len()
    }
}

/// Bounded cache evicting the least recently used match.
///
/// One mutex guards lookup, eviction, load and insert, so concurrent misses
/// are serialised. Hits only reorder the recency list. A full cache evicts
/// before loading, so a miss whose load fails still shrinks the resident set.
pub struct LruCache<S> {
    store: S,
    window: SelectionWindow,
    counts: Vec<usize>,
    capacity: usize,
    inner: Mutex<LruState>,
}

struct LruState {
    /// Front is least recently used.
    entries: IndexMap<usize, Arc<MatchRecord>>,
    loads: u64,
}

impl<S: RecordStore> LruCache<S> {
    pub fn new(
        store: S,
        window: SelectionWindow,
        counts: &[usize],
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(DatasetError::InvalidCapacity(capacity).into());
        }
        Ok(Self {
            store,
            window,
            counts: counts.to_vec(),
            capacity,
            inner: Mutex::new(LruState {
                entries: IndexMap::with_capacity(capacity),
                loads: 0,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total store loads performed so far.
    pub fn loads(&self) -> u64 {
        self.inner.lock().loads
    }

    /// Resident in-window match ids, least recently used first.
    pub fn resident_ids(&self) -> Vec<usize> {
        self.inner.lock().entries.keys().copied().collect()
    }
}

impl<S: RecordStore> SampleCache for LruCache<S> {
    fn get(&self, match_id: usize) -> Result<Arc<MatchRecord>> {
        let expected = *self
            .counts
            .get(match_id)
            .ok_or_else(|| DatasetError::out_of_range(match_id, self.counts.len()))?;

        let mut state = self.inner.lock();
        if let Some(record) = state.entries.shift_remove(&match_id) {
            state.entries.insert(match_id, record.clone());
            return Ok(record);
        }

        if state.entries.len() >= self.capacity {
            if let Some((evicted, _)) = state.entries.shift_remove_index(0) {
                debug!("evicting match {}", self.window.absolute(evicted));
            }
        }

        let absolute = self.window.absolute(match_id);
        state.loads += 1;
        let record = self
            .store
            .load(absolute)
            .with_context(|| format!("failed to load match {absolute}"))?;
        check_count(&record, absolute, expected)?;
        let record = Arc::new(record);
        state.entries.insert(match_id, record.clone());
        Ok(record)
    }

    fn resident(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObsShape;

    /// Synthesises a record of `counts[id]` samples and logs every load.
    struct CountingStore {
        counts: Vec<usize>,
        log: parking_lot::Mutex<Vec<usize>>,
    }

    impl CountingStore {
        fn new(counts: &[usize]) -> Self {
            Self {
                counts: counts.to_vec(),
                log: parking_lot::Mutex::new(Vec::new()),
            }
        }

        fn loads(&self) -> Vec<usize> {
            self.log.lock().clone()
        }
    }

    impl RecordStore for CountingStore {
        fn load(&self, match_id: usize) -> Result<MatchRecord> {
            self.log.lock().push(match_id);
            let n = *self
                .counts
                .get(match_id)
                .ok_or_else(|| anyhow::anyhow!("no match {match_id}"))?;
            let shape = ObsShape::new(1, 27);
            MatchRecord::new(
                shape,
                1,
                vec![match_id as f32; n * shape.numel()],
                vec![1.0; n],
                vec![match_id as i64; n],
            )
        }
    }

    #[test]
    fn eager_loads_each_match_once_in_window() {
        let counts = [2, 3, 1, 4];
        let store = CountingStore::new(&counts);
        let window = SelectionWindow {
            begin_idx: 1,
            end_idx: 4,
        };
        let cache = EagerCache::preload(&store, window, window.slice(&counts), Some(2)).unwrap();
        assert_eq!(cache.resident(), 3);
        let mut loads = store.loads();
        loads.sort();
        assert_eq!(loads, vec![1, 2, 3]);

        let rec = cache.get(0).unwrap();
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.act(0), 1);
        assert_eq!(cache.get(2).unwrap().act(0), 3);
        assert!(cache.get(3).is_err());
        assert_eq!(store.loads().len(), 3);
    }

    #[test]
    fn eager_rejects_count_mismatch() {
        let store = CountingStore::new(&[2, 3]);
        let window = SelectionWindow::all(2);
        let err = EagerCache::preload(&store, window, &[2, 4], None)
            .err()
            .expect("mismatch must fail");
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::CountMismatch {
                match_id: 1,
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn eager_propagates_load_failures() {
        let store = CountingStore::new(&[2]);
        let err = EagerCache::preload(&store, SelectionWindow::all(2), &[2, 2], None)
            .err()
            .expect("missing match must fail");
        assert!(format!("{err:#}").contains("no match 1"));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let counts = [1, 1, 1];
        let store = Arc::new(CountingStore::new(&counts));
        let cache = LruCache::new(store.clone(), SelectionWindow::all(3), &counts, 2).unwrap();

        for id in [0, 1, 2, 0, 1] {
            assert_eq!(cache.get(id).unwrap().act(0), id as i64);
        }
        // 2 evicts 0, then 0 evicts 1, then 1 evicts 2.
        assert_eq!(store.loads(), vec![0, 1, 2, 0, 1]);
        assert_eq!(cache.loads(), 5);
        assert_eq!(cache.resident_ids(), vec![0, 1]);
    }

    #[test]
    fn lru_hits_refresh_recency() {
        let counts = [1, 1, 1];
        let store = Arc::new(CountingStore::new(&counts));
        let cache = LruCache::new(store.clone(), SelectionWindow::all(3), &counts, 2).unwrap();

        for id in [0, 1, 0, 2, 0] {
            cache.get(id).unwrap();
        }
        // The hit on 0 makes 1 the eviction victim when 2 arrives.
        assert_eq!(store.loads(), vec![0, 1, 2]);
        assert_eq!(cache.resident_ids(), vec![2, 0]);
        assert_eq!(cache.resident(), 2);
    }

    #[test]
    fn lru_uses_absolute_ids_and_validates_counts() {
        let counts = [5, 1, 2];
        let store = Arc::new(CountingStore::new(&counts));
        let window = SelectionWindow {
            begin_idx: 1,
            end_idx: 3,
        };
        let cache = LruCache::new(store.clone(), window, &[1, 3], 1).unwrap();
        assert_eq!(cache.get(0).unwrap().act(0), 1);
        let err = cache.get(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::CountMismatch { match_id: 2, .. })
        ));
        assert_eq!(store.loads(), vec![1, 2]);
        assert!(cache.get(2).is_err());
    }

    #[test]
    fn lru_failed_load_still_evicts() {
        let store = Arc::new(CountingStore::new(&[1]));
        let cache = LruCache::new(store.clone(), SelectionWindow::all(2), &[1, 1], 1).unwrap();
        cache.get(0).unwrap();
        assert_eq!(cache.resident_ids(), vec![0]);

        let err = cache.get(1).unwrap_err();
        assert!(format!("{err:#}").contains("no match 1"), "{err:#}");
        assert_eq!(cache.resident(), 0);
        assert_eq!(store.loads(), vec![0, 1]);
    }

    #[test]
    fn lru_rejects_zero_capacity() {
        let store = CountingStore::new(&[1]);
        assert!(LruCache::new(store, SelectionWindow::all(1), &[1], 0).is_err());
    }
}
