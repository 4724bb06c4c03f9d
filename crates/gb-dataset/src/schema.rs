//! In-memory layouts for match records and the samples handed to training.
//!
//! Observations are row-major `rows x cols` planes of `f32`. The first
//! [`SUIT_COLUMNS`] columns hold the three numbered suits (characters, dots,
//! bamboo), each spanning ranks 1-9 in order. Every column from
//! [`SUIT_COLUMNS`] on is auxiliary (winds, dragons, flowers, ...) and is
//! never moved by augmentation.

use anyhow::Result;

use crate::error::DatasetError;

/// Ranks per numbered suit.
pub const RANKS: usize = 9;
/// Numbered suits in an observation.
pub const SUITS: usize = 3;
/// Width of the suit region at the start of every observation row.
pub const SUIT_COLUMNS: usize = SUITS * RANKS;

/// Shape of one observation plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObsShape {
    pub rows: usize,
    pub cols: usize,
}

impl ObsShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of elements in one observation.
    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    fn validate(&self) -> Result<(), DatasetError> {
        if self.cols < SUIT_COLUMNS {
            return Err(DatasetError::InvalidObservation(format!(
                "observation has {} columns, expected at least {SUIT_COLUMNS}",
                self.cols
            )));
        }
        Ok(())
    }
}

/// A single owned observation tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    shape: ObsShape,
    data: Vec<f32>,
}

impl Observation {
    pub fn new(shape: ObsShape, data: Vec<f32>) -> Result<Self> {
        shape.validate()?;
        if data.len() != shape.numel() {
            return Err(DatasetError::InvalidObservation(format!(
                "expected {} values for a {}x{} observation, got {}",
                shape.numel(),
                shape.rows,
                shape.cols,
                data.len()
            ))
            .into());
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> ObsShape {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn row(&self, row: usize) -> &[f32] {
        let cols = self.shape.cols;
        &self.data[row * cols..(row + 1) * cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let cols = self.shape.cols;
        &mut self.data[row * cols..(row + 1) * cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.shape.cols + col]
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// One training example: the observation plus its legality mask and action.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub obs: Observation,
    pub mask: Vec<f32>,
    pub act: i64,
}

/// Decoded contents of one match file.
///
/// All three arrays share the leading dimension [`MatchRecord::len`]. Records
/// are immutable once built; samples are copied out of them.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchRecord {
    obs_shape: ObsShape,
    mask_width: usize,
    obs: Vec<f32>,
    mask: Vec<f32>,
    act: Vec<i64>,
}

impl MatchRecord {
    /// Build a record from flat row-major buffers, checking that every array
    /// agrees on the number of samples.
    pub fn new(
        obs_shape: ObsShape,
        mask_width: usize,
        obs: Vec<f32>,
        mask: Vec<f32>,
        act: Vec<i64>,
    ) -> Result<Self> {
        obs_shape.validate()?;
        let samples = act.len();
        if obs.len() != samples * obs_shape.numel() {
            return Err(DatasetError::InvalidObservation(format!(
                "obs holds {} values, expected {samples} x {} x {}",
                obs.len(),
                obs_shape.rows,
                obs_shape.cols
            ))
            .into());
        }
        if mask.len() != samples * mask_width {
            anyhow::bail!(
                "mask holds {} values, expected {samples} x {mask_width}",
                mask.len()
            );
        }
        Ok(Self {
            obs_shape,
            mask_width,
            obs,
            mask,
            act,
        })
    }

    /// Number of samples in the match.
    pub fn len(&self) -> usize {
        self.act.len()
    }

    pub fn is_empty(&self) -> bool {
        self.act.is_empty()
    }

    pub fn obs_shape(&self) -> ObsShape {
        self.obs_shape
    }

    pub fn mask_width(&self) -> usize {
        self.mask_width
    }

    pub fn obs(&self, offset: usize) -> &[f32] {
        let n = self.obs_shape.numel();
        &self.obs[offset * n..(offset + 1) * n]
    }

    pub fn mask(&self, offset: usize) -> &[f32] {
        let n = self.mask_width;
        &self.mask[offset * n..(offset + 1) * n]
    }

    pub fn act(&self, offset: usize) -> i64 {
        self.act[offset]
    }

    /// Copy one sample out of the record. `offset` must be `< len()`.
    pub fn sample(&self, offset: usize) -> Sample {
        Sample {
            obs: Observation {
                shape: self.obs_shape,
                data: self.obs(offset).to_vec(),
            },
            mask: self.mask(offset).to_vec(),
            act: self.act(offset),
        }
    }

    pub(crate) fn obs_data(&self) -> &[f32] {
        &self.obs
    }

    pub(crate) fn mask_data(&self) -> &[f32] {
        &self.mask
    }

    pub(crate) fn act_data(&self) -> &[i64] {
        &self.act
    }
}
