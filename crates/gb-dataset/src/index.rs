//! Prefix-sum index from a flat sample index to `(match, offset)`.

use anyhow::Result;

use crate::error::DatasetError;

/// Cumulative sample offsets for the matches of one window.
///
/// `offsets[i]` is the number of samples in matches `0..i`, so `offsets[0]`
/// is always zero and the table never decreases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchIndex {
    offsets: Vec<usize>,
    total: usize,
}

impl MatchIndex {
    pub fn new(counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(counts.len());
        let mut total = 0usize;
        for &count in counts {
            offsets.push(total);
            total += count;
        }
        Self { offsets, total }
    }

    /// Map a global sample index to `(match_id, local_offset)` in
    /// O(log matches).
    ///
    /// Picks the rightmost match whose starting offset is `<= index`, so
    /// empty matches sharing an offset with their successor are skipped.
    pub fn resolve(&self, index: usize) -> Result<(usize, usize)> {
        if index >= self.total {
            return Err(DatasetError::out_of_range(index, self.total).into());
        }
        let match_id = self.offsets.partition_point(|&start| start <= index) - 1;
        Ok((match_id, index - self.offsets[match_id]))
    }

    /// Number of samples in `match_id`, or `None` past the last match.
    pub fn match_len(&self, match_id: usize) -> Option<usize> {
        let start = *self.offsets.get(match_id)?;
        let end = self
            .offsets
            .get(match_id + 1)
            .copied()
            .unwrap_or(self.total);
        Some(end - start)
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn num_matches(&self) -> usize {
        self.offsets.len()
    }

    pub fn total_samples(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_match_boundaries() {
        let index = MatchIndex::new(&[3, 5, 2]);
        assert_eq!(index.offsets(), &[0, 3, 8]);
        assert_eq!(index.total_samples(), 10);
        assert_eq!(index.num_matches(), 3);
        assert_eq!(index.resolve(0).unwrap(), (0, 0));
        assert_eq!(index.resolve(2).unwrap(), (0, 2));
        assert_eq!(index.resolve(3).unwrap(), (1, 0));
        assert_eq!(index.resolve(7).unwrap(), (1, 4));
        assert_eq!(index.resolve(8).unwrap(), (2, 0));
        assert_eq!(index.resolve(9).unwrap(), (2, 1));
    }

    #[test]
    fn resolve_is_a_bijection_onto_valid_offsets() {
        let counts = [4, 0, 1, 0, 0, 7, 2, 0];
        let index = MatchIndex::new(&counts);
        let expected: Vec<(usize, usize)> = counts
            .iter()
            .enumerate()
            .flat_map(|(m, &n)| (0..n).map(move |o| (m, o)))
            .collect();
        let resolved: Vec<(usize, usize)> = (0..index.total_samples())
            .map(|i| index.resolve(i).unwrap())
            .collect();
        assert_eq!(resolved, expected);
        for (m, &n) in counts.iter().enumerate() {
            assert_eq!(index.match_len(m), Some(n));
        }
        assert_eq!(index.match_len(counts.len()), None);
        assert_eq!(MatchIndex::new(&[]).match_len(0), None);
    }

    #[test]
    fn out_of_range_is_reported() {
        let index = MatchIndex::new(&[3, 5, 2]);
        let err = index.resolve(10).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DatasetError>(),
            Some(&DatasetError::IndexOutOfRange { index: 10, len: 10 })
        );
        assert!(MatchIndex::new(&[]).resolve(0).is_err());
        assert!(MatchIndex::new(&[0, 0]).resolve(0).is_err());
    }
}
