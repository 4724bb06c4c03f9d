use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use gb_dataset::{
    CachePolicy, CorpusWriter, DatasetOptions, MatchDataset, MatchRecord, ObsShape, Sample,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect and validate MahjongGB training corpora (count.json + <id>.npz)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the window, sample count and cache state of a dataset
    Info(DatasetArgs),
    /// Read every sample of the window and check masks and labels
    Scan {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Number of worker threads (defaults to the CPU count)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },
    /// Write a small synthetic corpus for smoke tests
    Synth {
        /// Output directory for count.json and <id>.npz
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Number of matches to generate
        #[arg(long, default_value_t = 16, value_name = "N")]
        matches: usize,

        /// Maximum samples per match
        #[arg(long, default_value_t = 64, value_name = "N")]
        max_samples: usize,

        /// Observation rows per sample
        #[arg(long, default_value_t = 6, value_name = "N")]
        rows: usize,

        /// Observation columns per sample (at least 27)
        #[arg(long, default_value_t = 34, value_name = "N")]
        cols: usize,

        /// Legality mask width
        #[arg(long, default_value_t = 235, value_name = "N")]
        actions: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Overwrite an existing count.json
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Debug, clap::Args)]
struct DatasetArgs {
    /// TOML file with dataset options; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding count.json and <id>.npz
    #[arg(long, value_name = "DIR")]
    data: Option<PathBuf>,

    /// Fractional start of the match window
    #[arg(long)]
    begin: Option<f64>,

    /// Fractional end of the match window
    #[arg(long)]
    end: Option<f64>,

    /// Apply suit/rank augmentation to returned observations
    #[arg(long)]
    augment: bool,

    /// Use a bounded LRU cache with this many resident matches
    #[arg(long, value_name = "N")]
    lru: Option<usize>,

    /// Seed for reproducible augmentation
    #[arg(long)]
    seed: Option<u64>,
}

impl DatasetArgs {
    fn options(&self) -> Result<DatasetOptions> {
        let mut opts = match &self.config {
            Some(path) => DatasetOptions::from_toml(path)?,
            None => DatasetOptions::default(),
        };
        if let Some(dir) = &self.data {
            opts.data_dir = dir.clone();
        }
        if let Some(begin) = self.begin {
            opts.begin = begin;
        }
        if let Some(end) = self.end {
            opts.end = end;
        }
        if self.augment {
            opts.augment = true;
        }
        if let Some(capacity) = self.lru {
            opts = opts.lru(capacity);
        }
        if self.seed.is_some() {
            opts.seed = self.seed;
        }
        Ok(opts)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match cli.command {
        Command::Info(args) => info_cmd(&args.options()?),
        Command::Scan { dataset, workers } => {
            let workers = workers.unwrap_or_else(num_cpus::get);
            scan_cmd(&dataset.options()?, workers)
        }
        Command::Synth {
            output,
            matches,
            max_samples,
            rows,
            cols,
            actions,
            seed,
            overwrite,
        } => synth_cmd(
            &output,
            matches,
            max_samples,
            ObsShape::new(rows, cols),
            actions,
            seed,
            overwrite,
        ),
    }
}

fn info_cmd(opts: &DatasetOptions) -> Result<()> {
    let ds = MatchDataset::open(opts)?;
    let summary = ds.summary();
    info!(
        "matches {}..{} of {} | samples {} | cache {:?} ({} resident) | augment {}",
        summary.window.begin_idx,
        summary.window.end_idx,
        summary.total_matches,
        summary.samples,
        summary.policy,
        summary.resident,
        summary.augment
    );
    if opts.cache == CachePolicy::Lru {
        info!("LRU capacity {}", opts.cache_capacity);
    }
    if let Some(first) = (!ds.is_empty()).then(|| ds.get(0)).transpose()? {
        info!(
            "sample 0: obs {}x{}, mask width {}, act {}",
            first.obs.rows(),
            first.obs.cols(),
            first.mask.len(),
            first.act
        );
    }
    Ok(())
}

#[derive(Default)]
struct ScanStats {
    shapes: BTreeMap<(usize, usize, usize), usize>,
    illegal_labels: usize,
}

impl ScanStats {
    fn observe(mut self, sample: &Sample) -> Self {
        let key = (sample.obs.rows(), sample.obs.cols(), sample.mask.len());
        *self.shapes.entry(key).or_default() += 1;
        let legal = usize::try_from(sample.act)
            .ok()
            .and_then(|a| sample.mask.get(a))
            .is_some_and(|&m| m > 0.0);
        if !legal {
            self.illegal_labels += 1;
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (k, v) in other.shapes {
            *self.shapes.entry(k).or_default() += v;
        }
        self.illegal_labels += other.illegal_labels;
        self
    }
}

fn scan_cmd(opts: &DatasetOptions, workers: usize) -> Result<()> {
    let ds = MatchDataset::open(opts)?;
    let total = ds.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
        )
        .unwrap()
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    let nonfinite = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("failed to build rayon thread pool")?;
    let stats = pool.install(|| -> Result<ScanStats> {
        (0..total)
            .into_par_iter()
            .map(|i| {
                let sample = match opts.seed {
                    Some(seed) => ds.get_with_rng(i, &mut StdRng::seed_from_u64(seed ^ i as u64)),
                    None => ds.get(i),
                }?;
                if sample.obs.as_slice().iter().any(|v| !v.is_finite()) {
                    nonfinite.fetch_add(1, Ordering::Relaxed);
                }
                pb.inc(1);
                Ok(ScanStats::default().observe(&sample))
            })
            .try_reduce(ScanStats::default, |a, b| Ok(a.merge(b)))
    })?;
    pb.finish_with_message("scan complete");

    info!("Scanned {total} samples");
    for ((rows, cols, mask), count) in &stats.shapes {
        info!("  obs {rows}x{cols}, mask {mask}: {count} samples");
    }
    if stats.illegal_labels > 0 {
        warn!(
            "{} samples have an action the mask marks illegal",
            stats.illegal_labels
        );
    }
    let nonfinite = nonfinite.into_inner();
    if nonfinite > 0 {
        bail!("{nonfinite} samples contain non-finite observation values");
    }
    Ok(())
}

fn synth_cmd(
    output: &Path,
    matches: usize,
    max_samples: usize,
    shape: ObsShape,
    actions: usize,
    seed: u64,
    overwrite: bool,
) -> Result<()> {
    if actions == 0 {
        bail!("--actions must be > 0");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut writer = CorpusWriter::new(output, overwrite)?;
    for _ in 0..matches {
        let n = rng.gen_range(0..=max_samples);
        let obs = (0..n * shape.numel())
            .map(|_| if rng.gen_bool(0.25) { 1.0 } else { 0.0 })
            .collect();
        let mut mask = vec![0f32; n * actions];
        let mut act = Vec::with_capacity(n);
        for k in 0..n {
            let a = rng.gen_range(0..actions);
            mask[k * actions + a] = 1.0;
            mask[k * actions + rng.gen_range(0..actions)] = 1.0;
            act.push(a as i64);
        }
        writer.push(&MatchRecord::new(shape, actions, obs, mask, act)?)?;
    }
    let summary = writer.finish()?;
    info!(
        "Synthesised {} matches, {} samples in {}",
        summary.matches,
        summary.samples,
        output.display()
    );
    Ok(())
}
