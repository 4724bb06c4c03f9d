use thiserror::Error;

/// Contract violations raised by the dataset.
///
/// These travel inside `anyhow::Error`; callers that need to tell them apart
/// from I/O failures use `err.downcast_ref::<DatasetError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatasetError {
    #[error("selection window [{begin}, {end}) is invalid: {reason}")]
    InvalidWindow {
        begin: f64,
        end: f64,
        reason: &'static str,
    },
    #[error("sample index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("match {match_id} holds {found} samples but the manifest lists {expected}")]
    CountMismatch {
        match_id: usize,
        expected: usize,
        found: usize,
    },
    #[error("cache capacity must be at least 1 (got {0})")]
    InvalidCapacity(usize),
    #[error("invalid observation: {0}")]
    InvalidObservation(String),
}

impl DatasetError {
    pub(crate) fn out_of_range(index: usize, len: usize) -> Self {
        DatasetError::IndexOutOfRange {
            index: i64::try_from(index).unwrap_or(i64::MAX),
            len,
        }
    }
}
