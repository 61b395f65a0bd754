//! Block averaging of dynamic spectra in time and frequency.

mod error;
#[cfg(test)]
mod tests;

pub use error::AveragingError;

use hifitime::{Duration, Epoch};
use log::{debug, warn};
use marlu::c64;
use ndarray::prelude::*;

use crate::{
    math::{block_nanmean, nanmean},
    reduce::DynamicSpectrum,
};

fn check_factor(axis: &'static str, factor: usize, len: usize) -> Result<(), AveragingError> {
    if factor == 0 {
        return Err(AveragingError::ZeroFactor { axis });
    }
    if factor > len {
        return Err(AveragingError::FactorTooLarge { axis, factor, len });
    }
    Ok(())
}

/// The mean epoch of each block of `factor` timestamps.
fn average_timestamps(timestamps: &[Epoch], factor: usize) -> Vec<Epoch> {
    timestamps
        .chunks_exact(factor)
        .map(|block| {
            let first = block[0];
            let offsets: Vec<f64> = block.iter().map(|&t| (t - first).to_seconds()).collect();
            first + Duration::from_seconds(nanmean(&offsets))
        })
        .collect()
}

/// Block-average one real `[time][channel]` plane along `axis`.
fn average_axis(plane: ArrayView2<f64>, axis: Axis, factor: usize) -> Array2<f64> {
    let (num_ints, num_chans) = plane.dim();
    let shape = if axis == Axis(0) {
        (num_ints / factor, num_chans)
    } else {
        (num_ints, num_chans / factor)
    };
    let mut out = Array2::zeros(shape);
    for (lane, mut out_lane) in plane
        .lanes(axis)
        .into_iter()
        .zip(out.lanes_mut(axis).into_iter())
    {
        let averaged = block_nanmean(&lane.to_vec(), factor);
        out_lane
            .iter_mut()
            .zip(averaged)
            .for_each(|(o, a)| *o = a);
    }
    out
}

/// Average a `[time][channel][pol]` cube, channels first and then time.
fn average_cube(cube: ArrayView3<f64>, time_factor: usize, freq_factor: usize) -> Array3<f64> {
    let (num_ints, num_chans, num_pols) = cube.dim();
    let mut out = Array3::zeros((num_ints / time_factor, num_chans / freq_factor, num_pols));
    for (plane, mut out_plane) in cube.axis_iter(Axis(2)).zip(out.axis_iter_mut(Axis(2))) {
        let chans_averaged = average_axis(plane, Axis(1), freq_factor);
        out_plane.assign(&average_axis(chans_averaged.view(), Axis(0), time_factor));
    }
    out
}

fn average_complex_cube(cube: &Array3<c64>, time_factor: usize, freq_factor: usize) -> Array3<c64> {
    let re = average_cube(cube.mapv(|v| v.re).view(), time_factor, freq_factor);
    let im = average_cube(cube.mapv(|v| v.im).view(), time_factor, freq_factor);
    let mut out = re.mapv(|re| c64::new(re, 0.0));
    out.zip_mut_with(&im, |v, &im| v.im = im);
    out
}

/// Average a dynamic spectrum by integer factors in time and frequency.
/// Integrations and channels that don't fill a whole block are cropped from
/// the end. Flagged cells are ignored; a block with no unflagged cells stays
/// flagged. The frequency and time axes are averaged along with the data.
pub fn average(
    spectrum: &mut DynamicSpectrum,
    time_factor: usize,
    freq_factor: usize,
) -> Result<(), AveragingError> {
    check_factor("integrations", time_factor, spectrum.num_integrations())?;
    check_factor("channels", freq_factor, spectrum.num_channels())?;
    if time_factor == 1 && freq_factor == 1 {
        return Ok(());
    }

    let cropped_ints = spectrum.num_integrations() % time_factor;
    let cropped_chans = spectrum.num_channels() % freq_factor;
    if cropped_ints > 0 || cropped_chans > 0 {
        warn!(
            "Cropping {cropped_ints} integrations and {cropped_chans} channels so the averaging factors divide evenly"
        );
    }

    spectrum.mean = average_complex_cube(&spectrum.mean, time_factor, freq_factor);
    spectrum.median = average_complex_cube(&spectrum.median, time_factor, freq_factor);
    spectrum.std = average_cube(spectrum.std.view(), time_factor, freq_factor);
    spectrum.freqs = block_nanmean(&spectrum.freqs, freq_factor);
    spectrum.timestamps = average_timestamps(&spectrum.timestamps, time_factor);

    debug!(
        "Averaged by {time_factor} in time and {freq_factor} in frequency; now {} integrations and {} channels",
        spectrum.num_integrations(),
        spectrum.num_channels()
    );
    Ok(())
}
