//! Loading per-match records from disk.
//!
//! Every match lives in its own `<root>/<match_id>.npz` archive holding three
//! arrays with a shared leading dimension:
//!
//! - `obs`:  `[n, rows, cols]` observation planes (`[n, cols]` is read as one row)
//! - `mask`: `[n, width]` legality masks (`[n]` is read as width 1)
//! - `act`:  `[n]` action labels
//!
//! Numeric dtypes are widened on read (`obs`/`mask` to `f32`, `act` to `i64`)
//! so archives written by NumPy with `int8` masks or `float64` features load
//! without a conversion pass.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use npyz::npz::NpzArchive;
use npyz::{DType, NpyFile};

use crate::schema::{MatchRecord, ObsShape};

/// Source of decoded match records keyed by corpus-wide match id.
///
/// Loads must be repeatable: loading the same id twice yields equal records.
/// A failed load is final for that id.
pub trait RecordStore: Send + Sync {
    fn load(&self, match_id: usize) -> Result<MatchRecord>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn load(&self, match_id: usize) -> Result<MatchRecord> {
        (**self).load(match_id)
    }
}

/// Reads `<root>/<match_id>.npz`.
#[derive(Clone, Debug)]
pub struct NpzRecordStore {
    root: PathBuf,
}

impl NpzRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, match_id: usize) -> PathBuf {
        record_path(&self.root, match_id)
    }
}

/// File name convention shared by the reader and [`crate::writer`].
pub fn record_path(root: &Path, match_id: usize) -> PathBuf {
    root.join(format!("{match_id}.npz"))
}

impl RecordStore for NpzRecordStore {
    fn load(&self, match_id: usize) -> Result<MatchRecord> {
        let path = self.path_for(match_id);
        let mut npz = NpzArchive::open(&path)
            .with_context(|| format!("failed to open match record {}", path.display()))?;

        let (obs_dims, obs) = {
            let npy = member(&mut npz, "obs", &path)?;
            let dims = npy.shape().to_vec();
            (dims, decode_f32(npy, "obs", &path)?)
        };
        let (mask_dims, mask) = {
            let npy = member(&mut npz, "mask", &path)?;
            let dims = npy.shape().to_vec();
            (dims, decode_f32(npy, "mask", &path)?)
        };
        let (act_dims, act) = {
            let npy = member(&mut npz, "act", &path)?;
            let dims = npy.shape().to_vec();
            (dims, decode_i64(npy, "act", &path)?)
        };

        let samples = match act_dims.as_slice() {
            [n] => *n as usize,
            other => bail!("{}: act must be 1-D, got shape {other:?}", path.display()),
        };
        let obs_shape = match obs_dims.as_slice() {
            [n, rows, cols] if *n as usize == samples => ObsShape::new(*rows as usize, *cols as usize),
            [n, cols] if *n as usize == samples => ObsShape::new(1, *cols as usize),
            other => bail!(
                "{}: obs shape {other:?} does not match {samples} actions",
                path.display()
            ),
        };
        let mask_width = match mask_dims.as_slice() {
            [n, width] if *n as usize == samples => *width as usize,
            [n] if *n as usize == samples => 1,
            other => bail!(
                "{}: mask shape {other:?} does not match {samples} actions",
                path.display()
            ),
        };

        debug!(
            "loaded match {match_id}: {samples} samples, obs {}x{}, mask {mask_width}",
            obs_shape.rows, obs_shape.cols
        );
        MatchRecord::new(obs_shape, mask_width, obs, mask, act)
            .with_context(|| format!("invalid match record {}", path.display()))
    }
}

fn member<'a, R: Read + std::io::Seek>(
    npz: &'a mut NpzArchive<R>,
    name: &str,
    path: &Path,
) -> Result<NpyFile<impl Read + 'a>> {
    npz.by_name(name)
        .with_context(|| format!("failed to read '{name}' from {}", path.display()))?
        .ok_or_else(|| anyhow!("{} has no '{name}' array", path.display()))
}

/// Dtype code without its byte-order prefix, e.g. `f4` for `<f4`.
fn dtype_code(dtype: &DType, name: &str, path: &Path) -> Result<String> {
    match dtype {
        DType::Plain(ts) => {
            let full = ts.to_string();
            Ok(full.get(1..).unwrap_or_default().to_string())
        }
        other => bail!(
            "{}: '{name}' has unsupported structured dtype {other:?}",
            path.display()
        ),
    }
}

fn decode_f32<R: Read>(npy: NpyFile<R>, name: &str, path: &Path) -> Result<Vec<f32>> {
    let code = dtype_code(&npy.dtype(), name, path)?;
    let ctx = || format!("failed to decode '{name}' in {}", path.display());
    let out = match code.as_str() {
        "f4" => npy.into_vec::<f32>().with_context(ctx)?,
        "f8" => widen(npy.into_vec::<f64>().with_context(ctx)?, |v| v as f32),
        "b1" => widen(npy.into_vec::<bool>().with_context(ctx)?, |v| v as u8 as f32),
        "i1" => widen(npy.into_vec::<i8>().with_context(ctx)?, f32::from),
        "u1" => widen(npy.into_vec::<u8>().with_context(ctx)?, f32::from),
        "i2" => widen(npy.into_vec::<i16>().with_context(ctx)?, f32::from),
        "i4" => widen(npy.into_vec::<i32>().with_context(ctx)?, |v| v as f32),
        "i8" => widen(npy.into_vec::<i64>().with_context(ctx)?, |v| v as f32),
        other => bail!(
            "{}: '{name}' has unsupported dtype '{other}'",
            path.display()
        ),
    };
    Ok(out)
}

fn decode_i64<R: Read>(npy: NpyFile<R>, name: &str, path: &Path) -> Result<Vec<i64>> {
    let code = dtype_code(&npy.dtype(), name, path)?;
    let ctx = || format!("failed to decode '{name}' in {}", path.display());
    let out = match code.as_str() {
        "i8" => npy.into_vec::<i64>().with_context(ctx)?,
        "i4" => widen(npy.into_vec::<i32>().with_context(ctx)?, i64::from),
        "i2" => widen(npy.into_vec::<i16>().with_context(ctx)?, i64::from),
        "i1" => widen(npy.into_vec::<i8>().with_context(ctx)?, i64::from),
        "u1" => widen(npy.into_vec::<u8>().with_context(ctx)?, i64::from),
        "u2" => widen(npy.into_vec::<u16>().with_context(ctx)?, i64::from),
        "u4" => widen(npy.into_vec::<u32>().with_context(ctx)?, i64::from),
        other => bail!(
            "{}: '{name}' must hold integer labels, found dtype '{other}'",
            path.display()
        ),
    };
    Ok(out)
}

fn widen<T, U>(values: Vec<T>, f: impl Fn(T) -> U) -> Vec<U> {
    values.into_iter().map(f).collect()
}
