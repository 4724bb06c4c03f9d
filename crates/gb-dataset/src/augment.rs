//! Symmetry-preserving observation transforms.
//!
//! Swapping the three numbered suits, or reading every suit's ranks 9..1
//! instead of 1..9, yields another legal game with the same legal actions in
//! the action encoding, so both are applied to observations only. Auxiliary
//! columns (from [`SUIT_COLUMNS`] on) never move.

use std::ops::Range;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::schema::{Observation, RANKS, SUIT_COLUMNS, SUITS};

/// Probability of each independent transform firing.
pub const APPLY_PROB: f64 = 0.5;

/// Hand rows used by [`shuffle_hand`] unless configured otherwise.
pub const DEFAULT_HAND_ROWS: Range<usize> = 2..6;

/// Which transforms one [`Augmenter::augment`] call applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    /// New block `i` came from old block `suits[i]`.
    pub suits: Option<[usize; SUITS]>,
    pub mirrored: bool,
    pub hand_shuffled: bool,
}

/// Randomised augmentation pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Augmenter {
    hand_rows: Option<Range<usize>>,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Augmenter {
    /// Suit permutation and rank mirroring only.
    pub fn new() -> Self {
        Self { hand_rows: None }
    }

    /// Also shuffle nonzero hand entries within `rows`, with the same
    /// [`APPLY_PROB`] coin flip as the other transforms.
    ///
    /// Experimental: whether masks and actions stay valid under this
    /// transform has not been verified.
    pub fn with_hand_shuffle(rows: Range<usize>) -> Self {
        Self {
            hand_rows: Some(rows),
        }
    }

    pub fn hand_rows(&self) -> Option<&Range<usize>> {
        self.hand_rows.as_ref()
    }

    /// Apply each enabled transform with probability [`APPLY_PROB`], in the
    /// fixed order suits, mirror, hand.
    pub fn augment<R: Rng>(&self, obs: &mut Observation, rng: &mut R) -> Applied {
        let mut applied = Applied::default();
        if rng.gen_bool(APPLY_PROB) {
            applied.suits = Some(swap_suits(obs, rng));
        }
        if rng.gen_bool(APPLY_PROB) {
            mirror_ranks(obs);
            applied.mirrored = true;
        }
        if let Some(rows) = &self.hand_rows {
            if rng.gen_bool(APPLY_PROB) {
                shuffle_hand(obs, rows.clone(), rng);
                applied.hand_shuffled = true;
            }
        }
        applied
    }
}

/// Reorder suits by a uniformly random permutation; returns the order used.
pub fn swap_suits<R: Rng>(obs: &mut Observation, rng: &mut R) -> [usize; SUITS] {
    let mut order = [0, 1, 2];
    order.shuffle(rng);
    permute_suits(obs, order);
    order
}

/// Rewrite every row so suit block `i` holds what block `order[i]` held.
pub fn permute_suits(obs: &mut Observation, order: [usize; SUITS]) {
    debug_assert!({
        let mut sorted = order;
        sorted.sort_unstable();
        sorted == [0, 1, 2]
    });
    for r in 0..obs.rows() {
        let row = obs.row_mut(r);
        let mut suits = [0f32; SUIT_COLUMNS];
        suits.copy_from_slice(&row[..SUIT_COLUMNS]);
        for (dst, &src) in order.iter().enumerate() {
            row[dst * RANKS..(dst + 1) * RANKS]
                .copy_from_slice(&suits[src * RANKS..(src + 1) * RANKS]);
        }
    }
}

/// Reverse the ranks of all three suits (1 <-> 9, 2 <-> 8, ...).
pub fn mirror_ranks(obs: &mut Observation) {
    for r in 0..obs.rows() {
        let row = obs.row_mut(r);
        for block in row[..SUIT_COLUMNS].chunks_exact_mut(RANKS) {
            block.reverse();
        }
    }
}

/// Permute the nonzero values inside `rows` among themselves.
///
/// Zero entries keep their positions and rows outside the range are left
/// alone. The range is clamped to the observation.
pub fn shuffle_hand<R: Rng>(obs: &mut Observation, rows: Range<usize>, rng: &mut R) {
    let cols = obs.cols();
    let end = rows.end.min(obs.rows());
    let start = rows.start.min(end);
    let hand = &mut obs.as_mut_slice()[start * cols..end * cols];

    let positions: Vec<usize> = (0..hand.len()).filter(|&i| hand[i] != 0.0).collect();
    let mut values: Vec<f32> = positions.iter().map(|&i| hand[i]).collect();
    values.shuffle(rng);
    for (&pos, value) in positions.iter().zip(values) {
        hand[pos] = value;
    }
}
