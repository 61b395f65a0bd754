//! RM synthesis and a bounded CLEAN of the Faraday dispersion function.
//!
//! The FDF is computed with uniform weights (Brentjens & de Bruyn 2005). Peak
//! finding subtracts the shifted and scaled RMSF at the brightest Faraday
//! depth, up to `max_iterations` times, then restores the recorded components
//! with a Gaussian of the RMSF's width.

mod error;
#[cfg(test)]
mod tests;

pub use error::FaradayError;

use log::{debug, info, trace};
use marlu::{c64, constants::VEL_C};

use crate::{math::nanmean, stokes::StokesCube};

/// The FWHM of a Gaussian is this many standard deviations.
const FWHM_PER_SIGMA: f64 = 2.355;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmSynthesisParams {
    /// The first trial Faraday depth \[rad m^-2\]. The range is symmetric, so
    /// the last is `-start_phi`.
    pub start_phi: f64,

    /// The Faraday depth step \[rad m^-2\].
    pub dphi: f64,

    /// A component is only extracted when it's this many standard deviations
    /// of |FDF| above zero.
    pub nsigma: f64,

    /// Only report detections with an SNR above this.
    pub min_snr: f64,

    pub max_iterations: usize,
}

impl Default for RmSynthesisParams {
    fn default() -> Self {
        RmSynthesisParams {
            start_phi: -1000.0,
            dphi: 1.0,
            nsigma: 6.0,
            min_snr: 10.0,
            max_iterations: 1,
        }
    }
}

impl RmSynthesisParams {
    /// The (exclusive) end of the trial Faraday depth range.
    fn stop_phi(&self) -> f64 {
        -self.start_phi + self.dphi
    }
}

/// A CLEAN component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaradayComponent {
    /// \[rad m^-2\]
    pub phi: f64,
    pub peak: f64,
}

/// The outcome of [`find_peaks`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSearch {
    /// Components in extraction order.
    pub components: Vec<FaradayComponent>,

    /// The standard deviation of |FDF| after subtraction.
    pub sigma: f64,
}

/// A polarised detection in one integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetection {
    pub time_index: usize,

    /// The Faraday depth of the peak \[rad m^-2\].
    pub phi: f64,

    pub polarised_intensity: f64,
    pub snr: f64,

    /// `FWHM / (2 SNR)` \[rad m^-2\].
    pub phi_err: f64,

    /// The polarised intensity over the band-averaged Stokes I.
    pub fractional_pol: f64,
}

/// The cleaned FDF of one integration with its peak search.
#[derive(Debug, Clone)]
pub struct IntegrationFdf {
    pub fdf: Vec<c64>,
    pub phi: Vec<f64>,
    pub search: PeakSearch,

    /// The band-averaged Stokes I.
    pub i_mean: f64,

    /// The FWHM of the RMSF \[rad m^-2\].
    pub fwhm: f64,
}

impl IntegrationFdf {
    /// The first component as a detection, if any.
    pub fn detection(&self, time_index: usize) -> Option<PeakDetection> {
        let first = self.search.components.first()?;
        let snr = first.peak / self.search.sigma;
        Some(PeakDetection {
            time_index,
            phi: first.phi,
            polarised_intensity: first.peak,
            snr,
            phi_err: self.fwhm / (2.0 * snr),
            fractional_pol: first.peak / self.i_mean,
        })
    }
}

/// Trial Faraday depths from `start` up to (but excluding) `stop`.
pub fn phi_axis(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, FaradayError> {
    let n = ((stop - start) / step).ceil();
    if !(step > 0.0 && n.is_finite() && n >= 1.0) {
        return Err(FaradayError::BadPhiRange { start, stop, step });
    }
    Ok((0..n as usize).map(|i| start + i as f64 * step).collect())
}

fn lambda_squared(freqs: &[f64]) -> Result<Vec<f64>, FaradayError> {
    if freqs.is_empty() {
        return Err(FaradayError::NoChannels);
    }
    freqs
        .iter()
        .map(|&f| {
            if f > 0.0 {
                Ok((VEL_C / f).powi(2))
            } else {
                Err(FaradayError::BadFrequency(f))
            }
        })
        .collect()
}

/// The FWHM of the RMSF, `2√3 / (λ²max - λ²min)` \[rad m^-2\].
pub fn rmsf_fwhm(freqs: &[f64]) -> Result<f64, FaradayError> {
    let lambda2 = lambda_squared(freqs)?;
    let (min, max) = lambda2
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &l| {
            (lo.min(l), hi.max(l))
        });
    Ok(2.0 * 3f64.sqrt() / (max - min))
}

/// The Faraday dispersion function of `Q + iU` over the trial depths
/// `[start, stop)`. Flagged (NaN) channels contribute nothing, but the
/// normalisation still counts them.
pub fn get_fdf(
    q: &[f64],
    u: &[f64],
    freqs: &[f64],
    start: f64,
    stop: f64,
    dphi: f64,
) -> Result<(Vec<c64>, Vec<f64>), FaradayError> {
    if q.len() != freqs.len() || u.len() != freqs.len() {
        return Err(FaradayError::LengthMismatch {
            num_q: q.len(),
            num_u: u.len(),
            num_freqs: freqs.len(),
        });
    }
    let phi = phi_axis(start, stop, dphi)?;
    let lambda2 = lambda_squared(freqs)?;
    let k = 1.0 / lambda2.len() as f64;
    let lambda2_0 = k * lambda2.iter().sum::<f64>();

    let fdf = phi
        .iter()
        .map(|&p| {
            let sum = q
                .iter()
                .zip(u)
                .zip(&lambda2)
                .map(|((&q, &u), &l2)| c64::new(q, u) * c64::from_polar(1.0, -2.0 * p * (l2 - lambda2_0)))
                .filter(|v| !v.re.is_nan() && !v.im.is_nan())
                .sum::<c64>();
            k * sum
        })
        .collect();
    Ok((fdf, phi))
}

/// The rotation measure spread function: the FDF of unit Q and zero U.
pub fn get_rmsf(
    freqs: &[f64],
    start: f64,
    stop: f64,
    dphi: f64,
) -> Result<(Vec<c64>, Vec<f64>), FaradayError> {
    let ones = vec![1.0; freqs.len()];
    let zeros = vec![0.0; freqs.len()];
    get_fdf(&ones, &zeros, freqs, start, stop, dphi)
}

fn std_of_abs(fdf: &[c64]) -> f64 {
    let n = fdf.len() as f64;
    let mean = fdf.iter().map(|v| v.norm()).sum::<f64>() / n;
    (fdf.iter().map(|v| (v.norm() - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Find and extract peaks in an FDF. Each iteration takes the largest |FDF|;
/// if it's above `nsigma` times the standard deviation of |FDF|, the RMSF
/// centred on it and scaled by the FDF there is subtracted. Iteration stops at
/// the first peak that isn't significant. Extracted components are restored
/// into `fdf` with a Gaussian of the RMSF's FWHM.
///
/// `rmsf` must span twice the range of `fdf` with the same step, so that it
/// can be centred on any FDF sample.
pub fn find_peaks(
    freqs: &[f64],
    fdf: &mut [c64],
    phi: &[f64],
    rmsf: &[c64],
    rmsf_phi: &[f64],
    nsigma: f64,
    max_iterations: usize,
) -> Result<PeakSearch, FaradayError> {
    let fdf_len = fdf.len();
    if fdf_len == 0 {
        return Err(FaradayError::EmptyFdf);
    }
    if rmsf.len() < 2 * fdf_len - 1 {
        return Err(FaradayError::RmsfTooShort {
            rmsf_len: rmsf.len(),
            fdf_len,
        });
    }
    if rmsf_phi.len() != rmsf.len() {
        return Err(FaradayError::RmsfAxisMismatch {
            rmsf_len: rmsf.len(),
            phi_len: rmsf_phi.len(),
        });
    }
    let width = rmsf_fwhm(freqs)?;
    let gauss_sigma = width / FWHM_PER_SIGMA;
    let gauss: Vec<f64> = rmsf_phi
        .iter()
        .map(|p| (-p * p / (2.0 * gauss_sigma * gauss_sigma)).exp())
        .collect();

    let rmsf_centre = (rmsf.len() - 1) / 2;
    let mut components = vec![0.0; fdf_len];
    let mut extracted = vec![];
    let mut sigma = std_of_abs(fdf);
    for iteration in 0..max_iterations {
        let (pos, peak) = fdf
            .iter()
            .map(|v| v.norm())
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, a)| {
                if a > best.1 {
                    (i, a)
                } else {
                    best
                }
            });
        if !(peak > nsigma * sigma) {
            trace!("Iteration {iteration}: peak {peak} isn't above {nsigma} x {sigma}");
            break;
        }

        let scale = fdf[pos];
        let shifted = &rmsf[rmsf_centre - pos..rmsf_centre - pos + fdf_len];
        fdf.iter_mut()
            .zip(shifted)
            .for_each(|(f, r)| *f -= r * scale);
        components[pos] += peak;
        extracted.push(FaradayComponent {
            phi: phi[pos],
            peak,
        });
        sigma = std_of_abs(fdf);
        trace!(
            "Iteration {iteration}: extracted {peak} at phi = {}; sigma now {sigma}",
            phi[pos]
        );
    }

    // Restore; the "valid" convolution of the components with the Gaussian.
    let gauss_centre = (gauss.len() - 1) / 2;
    for (m, &comp) in components.iter().enumerate().filter(|(_, &c)| c != 0.0) {
        for (n, f) in fdf.iter_mut().enumerate() {
            if let Some(g) = gauss.get(gauss_centre + n - m) {
                *f += comp * g;
            }
        }
    }

    Ok(PeakSearch {
        components: extracted,
        sigma,
    })
}

/// The RMSF over twice the FDF's Faraday-depth range. It only depends on the
/// channel frequencies and the trial depths, so one serves every integration.
#[derive(Debug, Clone)]
pub struct Rmsf {
    pub rmsf: Vec<c64>,
    pub phi: Vec<f64>,

    /// \[rad m^-2\]
    pub fwhm: f64,
}

impl Rmsf {
    pub fn new(freqs: &[f64], params: &RmSynthesisParams) -> Result<Rmsf, FaradayError> {
        let (rmsf, phi) = get_rmsf(
            freqs,
            2.0 * params.start_phi,
            2.0 * params.stop_phi() - params.dphi,
            params.dphi,
        )?;
        Ok(Rmsf {
            rmsf,
            phi,
            fwhm: rmsf_fwhm(freqs)?,
        })
    }
}

/// RM synthesis and peak finding for one integration of a Stokes cube.
/// `rmsf` must have been made for the cube's frequencies and `params`.
pub fn integration_fdf(
    stokes: &StokesCube,
    time_index: usize,
    params: &RmSynthesisParams,
    rmsf: &Rmsf,
) -> Result<IntegrationFdf, FaradayError> {
    if time_index >= stokes.num_integrations() {
        return Err(FaradayError::BadIntegration {
            index: time_index,
            num_integrations: stokes.num_integrations(),
        });
    }
    let i = stokes.i.row(time_index).to_vec();
    let q = stokes.q.row(time_index).to_vec();
    let u = stokes.u.row(time_index).to_vec();

    let (mut fdf, phi) = get_fdf(
        &q,
        &u,
        &stokes.freqs,
        params.start_phi,
        params.stop_phi(),
        params.dphi,
    )?;
    let search = find_peaks(
        &stokes.freqs,
        &mut fdf,
        &phi,
        &rmsf.rmsf,
        &rmsf.phi,
        params.nsigma,
        params.max_iterations,
    )?;
    Ok(IntegrationFdf {
        fdf,
        phi,
        search,
        i_mean: nanmean(&i),
        fwhm: rmsf.fwhm,
    })
}

/// Search every integration for polarised emission, returning detections with
/// an SNR above `params.min_snr`.
pub fn find_fdf_peaks(
    stokes: &StokesCube,
    params: &RmSynthesisParams,
) -> Result<Vec<PeakDetection>, FaradayError> {
    let rmsf = Rmsf::new(&stokes.freqs, params)?;
    debug!(
        "RM synthesis over phi in [{}, {}) step {}; RMSF FWHM {:.2} rad/m^2",
        params.start_phi,
        params.stop_phi(),
        params.dphi,
        rmsf.fwhm
    );
    let mut detections = vec![];
    for t in 0..stokes.num_integrations() {
        let result = integration_fdf(stokes, t, params, &rmsf)?;
        if let Some(detection) = result.detection(t) {
            if detection.snr > params.min_snr {
                info!(
                    "Integration {t}: PI {:.3e} (SNR {:.1}) at phi {:.3} +/- {:.1}, {:.1}% polarised",
                    detection.polarised_intensity,
                    detection.snr,
                    detection.phi,
                    detection.phi_err,
                    100.0 * detection.fractional_pol
                );
                detections.push(detection);
            }
        }
    }
    Ok(detections)
}
