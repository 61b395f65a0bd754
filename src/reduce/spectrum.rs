use hifitime::Epoch;
use marlu::c64;
use ndarray::prelude::*;

use crate::metadata::median_time_step;

/// Baseline-collapsed visibilities, one value per integration, channel and
/// instrumental polarisation. NaN marks a cell with no unflagged data.
///
/// The axes live here rather than in the observation metadata because
/// averaging rewrites them.
#[derive(Debug, Clone)]
pub struct DynamicSpectrum {
    /// The mean over baselines, arranged `[time][channel][polarisation]`.
    pub mean: Array3<c64>,

    /// The median over baselines, taken separately on the real and imaginary
    /// components.
    pub median: Array3<c64>,

    /// The population standard deviation over baselines.
    pub std: Array3<f64>,

    /// Channel centre frequencies \[Hz\].
    pub freqs: Vec<f64>,

    pub timestamps: Vec<Epoch>,

    /// Instrumental polarisation labels, e.g. "XX".
    pub pols: Vec<String>,
}

impl DynamicSpectrum {
    /// A spectrum with every cell flagged.
    pub fn new_flagged(freqs: Vec<f64>, timestamps: Vec<Epoch>, pols: Vec<String>) -> Self {
        let shape = (timestamps.len(), freqs.len(), pols.len());
        let nan = c64::new(f64::NAN, f64::NAN);
        DynamicSpectrum {
            mean: Array3::from_elem(shape, nan),
            median: Array3::from_elem(shape, nan),
            std: Array3::from_elem(shape, f64::NAN),
            freqs,
            timestamps,
            pols,
        }
    }

    pub fn num_integrations(&self) -> usize {
        self.mean.len_of(Axis(0))
    }

    pub fn num_channels(&self) -> usize {
        self.mean.len_of(Axis(1))
    }

    pub fn num_pols(&self) -> usize {
        self.mean.len_of(Axis(2))
    }

    pub fn pol_index(&self, label: &str) -> Option<usize> {
        self.pols.iter().position(|p| p == label)
    }

    /// The median time between integrations \[seconds\].
    pub fn integration_time(&self) -> Option<f64> {
        median_time_step(&self.timestamps)
    }

    /// Flag a block of integrations and channels across every polarisation
    /// and statistic. Ranges are clamped to the spectrum.
    pub fn flag(&mut self, times: std::ops::Range<usize>, chans: std::ops::Range<usize>) {
        let t = times.start.min(self.num_integrations())..times.end.min(self.num_integrations());
        let c = chans.start.min(self.num_channels())..chans.end.min(self.num_channels());
        let nan = c64::new(f64::NAN, f64::NAN);
        self.mean.slice_mut(s![t.clone(), c.clone(), ..]).fill(nan);
        self.median.slice_mut(s![t.clone(), c.clone(), ..]).fill(nan);
        self.std.slice_mut(s![t, c, ..]).fill(f64::NAN);
    }

    /// Apply a `[time][channel]` mask, flagging the masked cells.
    pub fn apply_mask(&mut self, mask: ArrayView2<bool>) {
        let nan = c64::new(f64::NAN, f64::NAN);
        for ((t, c), &m) in mask.indexed_iter() {
            if m {
                self.mean.slice_mut(s![t, c, ..]).fill(nan);
                self.median.slice_mut(s![t, c, ..]).fill(nan);
                self.std.slice_mut(s![t, c, ..]).fill(f64::NAN);
            }
        }
    }
}
