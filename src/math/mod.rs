//! Robust statistics and Fourier helpers shared by the analysis stages.
//!
//! Everything here treats NaN as "flagged": NaN-aware reductions skip those
//! samples, and a reduction over nothing but NaNs is itself NaN.

#[cfg(test)]
mod tests;

use std::{cmp::Ordering, sync::Arc};

use marlu::c64;
use rustfft::{Fft, FftPlanner};

/// The factor turning an inter-quartile range into a Gaussian-equivalent
/// standard deviation, `sqrt(2) * erfinv(0.5)`.
pub const IQR_CORRECTION: f64 = 0.674_489_750_196_081_7;

/// Is either component of this complex number NaN?
#[inline]
pub fn is_nan_c64(c: c64) -> bool {
    c.re.is_nan() || c.im.is_nan()
}

/// Applies sub-sample shifts to series of a fixed length. The FFT plans are
/// made once and reused, which matters when shifting every channel of a
/// dynamic spectrum.
pub struct FourierShifter {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<c64>,
    buffer: Vec<c64>,
}

impl FourierShifter {
    pub fn new(len: usize) -> FourierShifter {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        FourierShifter {
            len,
            forward,
            inverse,
            scratch: vec![c64::default(); scratch_len],
            buffer: vec![c64::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shift `series` later in time by `delta` samples (negative values
    /// advance it). The shift is circular.
    ///
    /// # Panics
    ///
    /// Panics if `series` isn't as long as this shifter.
    pub fn shift(&mut self, series: &mut [c64], delta: f64) {
        assert_eq!(series.len(), self.len, "series length doesn't match the FFT plan");
        if delta == 0.0 || self.len == 0 {
            return;
        }

        self.forward
            .process_with_scratch(series, &mut self.scratch);

        let n = self.len;
        let n_f64 = n as f64;
        for (i, x) in series.iter_mut().enumerate() {
            // Bin indices are folded into [-N/2, N/2).
            let k = if 2 * i < n {
                i as f64
            } else {
                i as f64 - n_f64
            };
            let arg = -2.0 * std::f64::consts::PI * delta * k / n_f64;
            let mut ramp = c64::new(arg.cos(), arg.sin());
            // The Nyquist bin of an even-length series has no negative
            // partner; keeping it real preserves conjugate symmetry.
            if n % 2 == 0 && i == n / 2 {
                ramp.im = 0.0;
            }
            *x *= ramp;
        }

        self.inverse
            .process_with_scratch(series, &mut self.scratch);
        let norm = 1.0 / n_f64;
        series.iter_mut().for_each(|x| *x *= norm);
    }

    /// As [`FourierShifter::shift`], but for a real series. The imaginary
    /// residual of the inverse transform is discarded.
    pub fn shift_real(&mut self, series: &mut [f64], delta: f64) {
        assert_eq!(series.len(), self.len, "series length doesn't match the FFT plan");
        if delta == 0.0 || self.len == 0 {
            return;
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        for (b, &x) in buffer.iter_mut().zip(series.iter()) {
            *b = c64::new(x, 0.0);
        }
        self.shift(&mut buffer, delta);
        for (x, b) in series.iter_mut().zip(buffer.iter()) {
            *x = b.re;
        }
        self.buffer = buffer;
    }
}

/// Shift a complex series by a (possibly fractional) number of samples.
pub fn fourier_shift(series: &mut [c64], delta: f64) {
    FourierShifter::new(series.len()).shift(series, delta)
}

/// Shift a real series by a (possibly fractional) number of samples.
pub fn fourier_shift_real(series: &mut [f64], delta: f64) {
    FourierShifter::new(series.len()).shift_real(series, delta)
}

pub fn nanmean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population (ddof = 0) standard deviation of the non-NaN values.
pub fn nanstd(values: &[f64]) -> f64 {
    let mean = nanmean(values);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (sum_sq, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + (v - mean).powi(2), c + 1));
    (sum_sq / count as f64).sqrt()
}

pub fn nanmedian(values: &[f64]) -> f64 {
    let mut good: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    median_in_place(&mut good)
}

/// Median of a buffer containing no NaNs. The buffer gets sorted.
fn median_in_place(good: &mut [f64]) -> f64 {
    if good.is_empty() {
        return f64::NAN;
    }
    good.sort_unstable_by(f64::total_cmp);
    let n = good.len();
    if n % 2 == 1 {
        good[n / 2]
    } else {
        0.5 * (good[n / 2 - 1] + good[n / 2])
    }
}

/// The `q`th percentile (0 to 100) of already-sorted, NaN-free values, with
/// linear interpolation between the closest ranks.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted {
        [] => f64::NAN,
        [v] => *v,
        _ => {
            let rank = q / 100.0 * (sorted.len() - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Inter-quartile range of the non-NaN values.
pub fn iqr(values: &[f64]) -> f64 {
    let mut good: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    good.sort_unstable_by(f64::total_cmp);
    percentile_sorted(&good, 75.0) - percentile_sorted(&good, 25.0)
}

/// Robust standard deviation from the inter-quartile range of the non-NaN
/// values, scaled by [`IQR_CORRECTION`].
pub fn std_iqr(values: &[f64]) -> f64 {
    IQR_CORRECTION * iqr(values)
}

/// Standard deviation after discarding values further than `nsigma` times the
/// unclipped standard deviation from the median (one clipping pass).
pub fn sigma_clipped_std(values: &[f64], nsigma: f64) -> f64 {
    let std = nanstd(values);
    let median = nanmedian(values);
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - median).abs() <= nsigma * std)
        .collect();
    nanstd(&kept)
}

/// Orders numbers normally and puts every NaN after them, whatever its sign.
fn nan_last_cmp(a: &f64, b: &f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(b),
    }
}

/// Median filter with a zero-padded edge, matching the behaviour of the
/// usual scientific-library `medfilt`. `window` must be odd.
pub fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    assert!(window % 2 == 1, "median filter windows must be odd");
    let half = window / 2;
    let n = values.len();
    let mut buffer = Vec::with_capacity(window);
    (0..n)
        .map(|i| {
            buffer.clear();
            for j in 0..window {
                let idx = i as isize + j as isize - half as isize;
                let v = if idx < 0 || idx >= n as isize {
                    0.0
                } else {
                    values[idx as usize]
                };
                buffer.push(v);
            }
            // NaNs of either sign sort to the end, so they only win the
            // median when they make up most of the window.
            buffer.sort_unstable_by(nan_last_cmp);
            buffer[half]
        })
        .collect()
}

/// NaN-aware mean of complex values. A value is skipped if either component
/// is NaN.
pub fn nanmean_c64(values: &[c64]) -> c64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !is_nan_c64(**v))
        .fold((c64::default(), 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        c64::new(f64::NAN, f64::NAN)
    } else {
        sum / count as f64
    }
}

/// Median of complex values, taken independently on the real and imaginary
/// components of the non-NaN samples.
pub fn nanmedian_c64(values: &[c64]) -> c64 {
    let mut re: Vec<f64> = Vec::with_capacity(values.len());
    let mut im: Vec<f64> = Vec::with_capacity(values.len());
    for v in values.iter().filter(|v| !is_nan_c64(**v)) {
        re.push(v.re);
        im.push(v.im);
    }
    if re.is_empty() {
        return c64::new(f64::NAN, f64::NAN);
    }
    c64::new(median_in_place(&mut re), median_in_place(&mut im))
}

/// Population standard deviation of complex values, i.e.
/// `sqrt(mean(|x - mean(x)|^2))` over the non-NaN samples.
pub fn nanstd_c64(values: &[c64]) -> f64 {
    let mean = nanmean_c64(values);
    if is_nan_c64(mean) {
        return f64::NAN;
    }
    let (sum_sq, count) = values
        .iter()
        .filter(|v| !is_nan_c64(**v))
        .fold((0.0, 0usize), |(s, c), &v| (s + (v - mean).norm_sqr(), c + 1));
    (sum_sq / count as f64).sqrt()
}

/// The mean of the non-NaN values in each consecutive block of `factor`
/// samples. Trailing samples that don't fill a block are dropped.
pub fn block_nanmean(values: &[f64], factor: usize) -> Vec<f64> {
    values.chunks_exact(factor).map(nanmean).collect()
}
