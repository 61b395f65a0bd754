//! RFI flagging of dynamic spectra.
//!
//! Automatic passes look for outliers in the Stokes parameters; manual
//! flagging blanks out channel, time or time-channel ranges. Flagged cells
//! become NaN in every polarisation and statistic.

#[cfg(test)]
mod tests;

use std::ops::Range;

use log::{debug, info};
use ndarray::prelude::*;

use crate::{
    math::{is_nan_c64, nanmedian, nanstd},
    reduce::DynamicSpectrum,
    stokes::{PolarizationConvention, StokesCube, StokesError},
};

/// Channels with more than this fraction of their integrations flagged are
/// worth flagging entirely.
pub const DEFAULT_HEAVILY_FLAGGED_FRACTION: f64 = 0.05;

/// An automatic flagging pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagPass {
    /// |V| above `nsigma` times the standard deviation of V. Without intrinsic
    /// circular polarisation, this is mostly RFI.
    V,

    /// |Q| or |U| above `nsigma` times their standard deviations.
    QU,

    /// |I| above `nsigma` times the standard deviation of I.
    I,

    /// Whole channels whose V standard deviation (over time) is above `nsigma`
    /// times the median channel standard deviation.
    NoisyVChannels,
}

impl FlagPass {
    pub fn name(self) -> &'static str {
        match self {
            FlagPass::V => "V",
            FlagPass::QU => "QU",
            FlagPass::I => "I",
            FlagPass::NoisyVChannels => "noisy V channels",
        }
    }

    /// The `[time][channel]` cells of a Stokes cube this pass would flag.
    pub fn mask(self, stokes: &StokesCube, nsigma: f64) -> Array2<bool> {
        match self {
            FlagPass::V => outlier_mask(stokes.v.view(), nsigma),
            FlagPass::QU => {
                let mut mask = outlier_mask(stokes.q.view(), nsigma);
                mask.zip_mut_with(&outlier_mask(stokes.u.view(), nsigma), |a, &b| *a |= b);
                mask
            }
            FlagPass::I => outlier_mask(stokes.i.view(), nsigma),
            FlagPass::NoisyVChannels => {
                let bad_chans = noisy_channels(stokes.v.view(), nsigma);
                let mut mask = Array2::from_elem(stokes.v.dim(), false);
                for &c in &bad_chans {
                    mask.column_mut(c).fill(true);
                }
                mask
            }
        }
    }
}

/// Cells whose magnitude exceeds `nsigma` times the standard deviation of the
/// whole plane. Already-flagged cells aren't included.
pub fn outlier_mask(plane: ArrayView2<f64>, nsigma: f64) -> Array2<bool> {
    let values: Vec<f64> = plane.iter().copied().collect();
    let threshold = nsigma * nanstd(&values);
    plane.mapv(|v| v.abs() > threshold)
}

/// The channels whose standard deviation over time exceeds `nsigma` times the
/// median of all channel standard deviations.
pub fn noisy_channels(plane: ArrayView2<f64>, nsigma: f64) -> Vec<usize> {
    let stds: Vec<f64> = plane
        .columns()
        .into_iter()
        .map(|col| nanstd(&col.to_vec()))
        .collect();
    let threshold = nsigma * nanmedian(&stds);
    stds.iter()
        .enumerate()
        .filter(|(_, &s)| s > threshold)
        .map(|(c, _)| c)
        .collect()
}

/// The number of cells in a mask that aren't already flagged in the spectrum.
fn count_new(spectrum: &DynamicSpectrum, mask: ArrayView2<bool>) -> usize {
    mask.indexed_iter()
        .filter(|(_, &m)| m)
        .filter(|((t, c), _)| !is_flagged(spectrum, *t, *c))
        .count()
}

/// A cell is flagged when the mean of every polarisation is NaN.
fn is_flagged(spectrum: &DynamicSpectrum, t: usize, c: usize) -> bool {
    spectrum
        .mean
        .slice(s![t, c, ..])
        .iter()
        .all(|&v| is_nan_c64(v))
}

/// Run an automatic pass over a dynamic spectrum, with Stokes parameters
/// formed from the baseline means. Returns the number of newly flagged cells.
pub fn flag_spectrum(
    spectrum: &mut DynamicSpectrum,
    convention: PolarizationConvention,
    pass: FlagPass,
    nsigma: f64,
) -> Result<usize, StokesError> {
    let stokes = StokesCube::from_dynamic_spectrum(spectrum, convention)?;
    let mask = pass.mask(&stokes, nsigma);
    let num_new = count_new(spectrum, mask.view());
    spectrum.apply_mask(mask.view());
    info!(
        "Flagging on {} ({nsigma} sigma) flagged {num_new} more cells",
        pass.name()
    );
    Ok(num_new)
}

/// Run an automatic pass over a Stokes cube. Returns the number of newly
/// flagged cells.
pub fn flag_stokes(stokes: &mut StokesCube, pass: FlagPass, nsigma: f64) -> usize {
    let mask = pass.mask(stokes, nsigma);
    let num_new = mask
        .iter()
        .zip(stokes.i.iter())
        .filter(|(&m, i)| m && !i.is_nan())
        .count();
    stokes.apply_mask(mask.view());
    debug!(
        "Flagging Stokes on {} ({nsigma} sigma) flagged {num_new} more cells",
        pass.name()
    );
    num_new
}

/// Channels in which more than `fraction` of the integrations are flagged.
pub fn heavily_flagged_channels(spectrum: &DynamicSpectrum, fraction: f64) -> Vec<usize> {
    let num_ints = spectrum.num_integrations();
    if num_ints == 0 {
        return vec![];
    }
    (0..spectrum.num_channels())
        .filter(|&c| {
            let num_flagged = (0..num_ints).filter(|&t| is_flagged(spectrum, t, c)).count();
            num_flagged as f64 / num_ints as f64 > fraction
        })
        .collect()
}

/// Flag a range of channels in every integration.
pub fn flag_channels(spectrum: &mut DynamicSpectrum, chans: Range<usize>) {
    debug!("Flagging channels {chans:?}");
    spectrum.flag(0..spectrum.num_integrations(), chans);
}

/// Flag a range of integrations in every channel.
pub fn flag_times(spectrum: &mut DynamicSpectrum, times: Range<usize>) {
    debug!("Flagging integrations {times:?}");
    spectrum.flag(times, 0..spectrum.num_channels());
}

/// Flag a window of integrations and channels.
pub fn flag_window(spectrum: &mut DynamicSpectrum, times: Range<usize>, chans: Range<usize>) {
    debug!("Flagging integrations {times:?}, channels {chans:?}");
    spectrum.flag(times, chans);
}
