//! Incoherent dedispersion of dynamic spectra.
//!
//! Each channel's time series is shifted by the cold-plasma delay relative to
//! the highest channel frequency. Shifts are fractional and circular.

mod error;
#[cfg(test)]
mod tests;

pub use error::DedisperseError;

use log::debug;
use marlu::c64;
use ndarray::prelude::*;

use crate::{math::FourierShifter, reduce::DynamicSpectrum, stokes::StokesCube};

/// The dispersion constant in ms GHz² cm³ pc⁻¹.
pub const DISPERSION_CONSTANT_MS: f64 = 4.149;

/// The delay of each channel relative to the highest frequency \[ms\]. Lower
/// frequencies arrive later, so their delays are negative (they must move
/// earlier to line up).
pub fn dispersion_delays_ms(freqs: &[f64], dm: f64) -> Result<Vec<f64>, DedisperseError> {
    if let Some(&f) = freqs.iter().find(|f| !(**f > 0.0)) {
        return Err(DedisperseError::BadFrequency(f));
    }
    let f_ref = freqs
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !f_ref.is_finite() {
        return Err(DedisperseError::NoChannels);
    }
    let f_ref_ghz = f_ref / 1e9;
    Ok(freqs
        .iter()
        .map(|f| {
            let f_ghz = f / 1e9;
            DISPERSION_CONSTANT_MS * dm * (1.0 / (f_ref_ghz * f_ref_ghz) - 1.0 / (f_ghz * f_ghz))
        })
        .collect())
}

/// The channel shifts in samples, given the sampling time \[seconds\].
fn sample_shifts(
    freqs: &[f64],
    integration_time: Option<f64>,
    dm: f64,
) -> Result<Vec<f64>, DedisperseError> {
    let tint_ms = match integration_time {
        None => return Err(DedisperseError::TooFewIntegrations),
        Some(t) if !(t > 0.0) => return Err(DedisperseError::BadIntegrationTime(t)),
        Some(t) => t * 1000.0,
    };
    let delays = dispersion_delays_ms(freqs, dm)?;
    debug!(
        "DM {dm}: channel delays span {:.3} ms ({:.2} samples)",
        delays.iter().copied().fold(0.0, f64::min),
        delays.iter().copied().fold(0.0, f64::min) / tint_ms
    );
    Ok(delays.into_iter().map(|d| d / tint_ms).collect())
}

fn zero_nans_c64(series: &mut [c64]) {
    for v in series.iter_mut() {
        if v.re.is_nan() || v.im.is_nan() {
            *v = c64::default();
        }
    }
}

fn zero_nans(series: &mut [f64]) {
    for v in series.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        }
    }
}

/// Dedisperse every polarisation and statistic of a dynamic spectrum. Flagged
/// (NaN) samples become zero. A DM of zero leaves the spectrum untouched.
pub fn dedisperse(spectrum: &mut DynamicSpectrum, dm: f64) -> Result<(), DedisperseError> {
    if dm == 0.0 {
        return Ok(());
    }
    let shifts = sample_shifts(&spectrum.freqs, spectrum.integration_time(), dm)?;
    let num_ints = spectrum.num_integrations();
    let mut shifter = FourierShifter::new(num_ints);
    let mut complex_series = vec![c64::default(); num_ints];
    let mut real_series = vec![0.0; num_ints];

    for (c, &shift) in shifts.iter().enumerate() {
        for p in 0..spectrum.num_pols() {
            for cube in [&mut spectrum.mean, &mut spectrum.median] {
                let mut lane = cube.slice_mut(s![.., c, p]);
                complex_series
                    .iter_mut()
                    .zip(lane.iter())
                    .for_each(|(s, v)| *s = *v);
                zero_nans_c64(&mut complex_series);
                shifter.shift(&mut complex_series, shift);
                lane.iter_mut()
                    .zip(complex_series.iter())
                    .for_each(|(v, s)| *v = *s);
            }

            let mut lane = spectrum.std.slice_mut(s![.., c, p]);
            real_series
                .iter_mut()
                .zip(lane.iter())
                .for_each(|(s, v)| *s = *v);
            zero_nans(&mut real_series);
            shifter.shift_real(&mut real_series, shift);
            lane.iter_mut()
                .zip(real_series.iter())
                .for_each(|(v, s)| *v = *s);
        }
    }
    Ok(())
}

/// Dedisperse the four planes of a Stokes cube.
pub fn dedisperse_stokes(cube: &mut StokesCube, dm: f64) -> Result<(), DedisperseError> {
    if dm == 0.0 {
        return Ok(());
    }
    let shifts = sample_shifts(
        &cube.freqs,
        crate::metadata::median_time_step(&cube.timestamps),
        dm,
    )?;
    let num_ints = cube.num_integrations();
    let mut shifter = FourierShifter::new(num_ints);
    let mut series = vec![0.0; num_ints];
    for plane in [&mut cube.i, &mut cube.q, &mut cube.u, &mut cube.v] {
        for (mut lane, &shift) in plane.axis_iter_mut(Axis(1)).zip(shifts.iter()) {
            series.iter_mut().zip(lane.iter()).for_each(|(s, v)| *s = *v);
            zero_nans(&mut series);
            shifter.shift_real(&mut series, shift);
            lane.iter_mut().zip(series.iter()).for_each(|(v, s)| *v = *s);
        }
    }
    Ok(())
}
