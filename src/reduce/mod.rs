//! Collapse the baselines of a visibility table into a dynamic spectrum.
//!
//! The table is streamed in chunks of whole integrations so that memory use is
//! bounded. Each integration is reduced independently, so the result doesn't
//! depend on how the table was chunked.

mod error;
mod spectrum;

pub use error::ReduceError;
pub use spectrum::DynamicSpectrum;

use std::path::PathBuf;

use indicatif::ProgressBar;
use log::{debug, info, trace, warn};
use marlu::c64;
use ndarray::prelude::*;

use crate::{
    math::{is_nan_c64, nanmean_c64, nanmedian_c64, nanstd_c64},
    read::{VisRows, VisTable},
    store,
};

/// The default memory budget for a chunk of visibilities \[bytes\].
pub const DEFAULT_MAX_MEM_BYTES: usize = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct ReduceParams {
    /// The most memory a chunk of visibilities may occupy \[bytes\].
    pub max_mem_bytes: usize,

    /// If set, read exactly this many integrations per chunk instead of
    /// deriving the count from the memory budget.
    pub chunk_integrations: Option<usize>,

    /// Subtract the model visibilities before reducing.
    pub subtract_model: bool,

    /// Where to write the intermediate store after every chunk.
    pub checkpoint: Option<PathBuf>,

    /// Continue from the checkpoint, if it exists, rather than starting over.
    pub resume: bool,
}

impl Default for ReduceParams {
    fn default() -> Self {
        ReduceParams {
            max_mem_bytes: DEFAULT_MAX_MEM_BYTES,
            chunk_integrations: None,
            subtract_model: false,
            checkpoint: None,
            resume: false,
        }
    }
}

/// Counts of flagged visibilities (one per row, channel and polarisation).
/// Each visibility is attributed to the first reason it was flagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagStats {
    pub num_visibilities: usize,

    /// Flagged in the table's FLAG column.
    pub table: usize,

    /// NaN in the data.
    pub nan: usize,

    /// Exactly zero in the data.
    pub zero: usize,

    /// Flagged because another polarisation of the same visibility was.
    pub spread: usize,
}

impl FlagStats {
    pub fn num_flagged(&self) -> usize {
        self.table + self.nan + self.zero + self.spread
    }

    pub fn fraction(&self, count: usize) -> f64 {
        if self.num_visibilities == 0 {
            0.0
        } else {
            count as f64 / self.num_visibilities as f64
        }
    }

    pub fn fraction_flagged(&self) -> f64 {
        self.fraction(self.num_flagged())
    }

    fn merge(&mut self, other: &FlagStats) {
        self.num_visibilities += other.num_visibilities;
        self.table += other.table;
        self.nan += other.nan;
        self.zero += other.zero;
        self.spread += other.spread;
    }

    pub fn report(&self) {
        info!(
            "Flagged {} of {} visibilities ({:.1}%)",
            self.num_flagged(),
            self.num_visibilities,
            100.0 * self.fraction_flagged()
        );
        info!("  FLAG column: {:.1}%", 100.0 * self.fraction(self.table));
        info!("  NaN:         {:.1}%", 100.0 * self.fraction(self.nan));
        info!("  Zeroed:      {:.1}%", 100.0 * self.fraction(self.zero));
        info!("  Spread:      {:.1}%", 100.0 * self.fraction(self.spread));
    }
}

/// Reduce every integration of `table` into a [`DynamicSpectrum`].
pub fn reduce_visibilities(
    table: &mut dyn VisTable,
    params: &ReduceParams,
    progress: Option<ProgressBar>,
) -> Result<(DynamicSpectrum, FlagStats), ReduceError> {
    let metadata = table.get_obs_metadata().clone();
    let num_baselines = metadata.num_available_baselines();
    let num_integrations = metadata.num_integrations();
    let num_rows = table.num_rows();
    if num_rows != num_integrations * num_baselines {
        return Err(ReduceError::RowCountMismatch {
            rows: num_rows,
            num_integrations,
            num_baselines,
        });
    }
    if params.subtract_model {
        if !table.has_model_data() {
            return Err(ReduceError::NoModelData);
        }
        info!("Will subtract the model visibilities");
    }
    let apply_flags = !table.reading_model_column();
    if !apply_flags {
        debug!("Reading the model column; flags won't be applied");
    }

    let chunk_integrations = match params.chunk_integrations {
        Some(n) => n,
        None => {
            // A single row tells us the footprint of a visibility; a whole
            // integration is the smallest amount we'll read.
            let row_bytes = table.read_rows(0, 1, params.subtract_model)?.num_bytes();
            let integration_bytes = row_bytes * num_baselines;
            debug!("Size of a single integration: {integration_bytes} bytes");
            params.max_mem_bytes / integration_bytes
        }
    };
    if chunk_integrations == 0 {
        return Err(ReduceError::ZeroChunkSize {
            max_mem_bytes: params.max_mem_bytes,
        });
    }
    let chunk_integrations = chunk_integrations.min(num_integrations);
    info!(
        "Reading {} rows ({} integrations) per chunk",
        chunk_integrations * num_baselines,
        chunk_integrations
    );

    let (mut spectrum, mut flag_stats, first_integration) = match params.checkpoint.as_ref() {
        Some(checkpoint) if params.resume && checkpoint.exists() => {
            let stored = store::read_store(checkpoint)?;
            for (thing, expected, got) in [
                (
                    "integrations",
                    num_integrations,
                    stored.spectrum.num_integrations(),
                ),
                ("channels", metadata.num_channels(), stored.spectrum.num_channels()),
                ("polarisations", metadata.num_pols(), stored.spectrum.num_pols()),
            ] {
                if expected != got {
                    return Err(ReduceError::IncompatibleCheckpoint {
                        thing,
                        expected,
                        got,
                    });
                }
            }
            info!(
                "Resuming from {}: {} of {num_integrations} integrations already reduced",
                checkpoint.display(),
                stored.num_done
            );
            (stored.spectrum, stored.flag_stats, stored.num_done)
        }
        _ => (
            DynamicSpectrum::new_flagged(
                metadata.channel_freqs().to_vec(),
                metadata.timestamps().to_vec(),
                metadata.pols().to_vec(),
            ),
            FlagStats::default(),
            0,
        ),
    };

    if let Some(progress) = progress.as_ref() {
        progress.set_length(num_integrations as u64);
        progress.set_position(first_integration as u64);
    }

    let mut i_int = first_integration;
    while i_int < num_integrations {
        let chunk_len = chunk_integrations.min(num_integrations - i_int);
        trace!("Reducing integrations {i_int}..{}", i_int + chunk_len);
        let rows = table.read_rows(
            i_int * num_baselines,
            chunk_len * num_baselines,
            params.subtract_model,
        )?;
        let (vis, chunk_stats) = flag_visibilities(rows, apply_flags);
        debug!(
            "Integrations {i_int}..{}: flagged {:.1}%",
            i_int + chunk_len,
            100.0 * chunk_stats.fraction_flagged()
        );
        flag_stats.merge(&chunk_stats);

        let (_, num_chans, num_pols) = vis.dim();
        let vis = vis.into_shape_with_order((chunk_len, num_baselines, num_chans, num_pols))?;
        collapse_baselines(
            vis.view(),
            spectrum.mean.slice_mut(s![i_int..i_int + chunk_len, .., ..]),
            spectrum.median.slice_mut(s![i_int..i_int + chunk_len, .., ..]),
            spectrum.std.slice_mut(s![i_int..i_int + chunk_len, .., ..]),
        );
        i_int += chunk_len;

        if let Some(checkpoint) = params.checkpoint.as_ref() {
            store::write_store(checkpoint, &metadata, &spectrum, i_int, &flag_stats)?;
        }
        if let Some(progress) = progress.as_ref() {
            progress.inc(chunk_len as u64);
        }
    }
    if let Some(progress) = progress {
        progress.abandon_with_message("Finished reducing");
    }

    flag_stats.report();
    if !metadata.missing_antennas().is_empty() {
        warn!(
            "Antennas without data were excluded: {:?}",
            metadata.missing_antennas()
        );
    }

    Ok((spectrum, flag_stats))
}

/// Flag NaN and zeroed samples, spread each visibility's flags across its
/// polarisations, blank the flagged samples and subtract any model.
fn flag_visibilities(rows: VisRows, apply_flags: bool) -> (Array3<c64>, FlagStats) {
    let VisRows {
        data,
        mut flags,
        model,
        ..
    } = rows;
    let mut vis = data.mapv(|v| c64::new(v.re.into(), v.im.into()));

    let mut stats = FlagStats {
        num_visibilities: vis.len(),
        table: flags.iter().filter(|f| **f).count(),
        ..Default::default()
    };
    for (f, v) in flags.iter_mut().zip(vis.iter()) {
        if !*f && is_nan_c64(*v) {
            *f = true;
            stats.nan += 1;
        }
    }
    for (f, v) in flags.iter_mut().zip(vis.iter()) {
        if !*f && v.re == 0.0 && v.im == 0.0 {
            *f = true;
            stats.zero += 1;
        }
    }
    for mut pol_flags in flags.lanes_mut(Axis(2)) {
        if pol_flags.iter().any(|f| *f) {
            for f in pol_flags.iter_mut() {
                if !*f {
                    *f = true;
                    stats.spread += 1;
                }
            }
        }
    }

    if apply_flags {
        let nan = c64::new(f64::NAN, f64::NAN);
        vis.zip_mut_with(&flags, |v, &f| {
            if f {
                *v = nan;
            }
        });
    }
    if let Some(model) = model {
        vis.zip_mut_with(&model, |v, m| *v -= c64::new(m.re.into(), m.im.into()));
    }

    (vis, stats)
}

/// Reduce `[time][baseline][channel][polarisation]` visibilities over the
/// baseline axis.
fn collapse_baselines(
    vis: ArrayView4<c64>,
    mut mean: ArrayViewMut3<c64>,
    mut median: ArrayViewMut3<c64>,
    mut std: ArrayViewMut3<f64>,
) {
    let (num_times, num_baselines, num_chans, num_pols) = vis.dim();
    let mut lane = Vec::with_capacity(num_baselines);
    for t in 0..num_times {
        for c in 0..num_chans {
            for p in 0..num_pols {
                lane.clear();
                lane.extend(vis.slice(s![t, .., c, p]).iter().copied());
                mean[(t, c, p)] = nanmean_c64(&lane);
                median[(t, c, p)] = nanmedian_c64(&lane);
                std[(t, c, p)] = nanstd_c64(&lane);
            }
        }
    }
}
