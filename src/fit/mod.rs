//! Power-law fits of spectra, `S = S0 ν^α`, done as a line fit in log space.
//!
//! The intercept of a weighted line fit is linear given the slope, so the
//! Nelder-Mead search only runs over the spectral index.

mod error;

pub use error::FitError;

use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;
use log::debug;

const MAX_ITERS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawFit {
    /// The flux density at 1 Hz; `10^intercept`.
    pub amplitude: f64,
    pub amplitude_err: f64,
    pub index: f64,
    pub index_err: f64,
}

impl PowerLawFit {
    pub fn flux_at(&self, freq: f64) -> f64 {
        self.amplitude * freq.powf(self.index)
    }
}

/// log10 frequencies and fluxes with their weights.
#[derive(Clone)]
struct LogSpectrum {
    x: Vec<f64>,
    y: Vec<f64>,
    w: Vec<f64>,
}

impl LogSpectrum {
    /// The weighted least-squares intercept for a given slope.
    fn intercept(&self, slope: f64) -> f64 {
        let (num, den) = self
            .x
            .iter()
            .zip(&self.y)
            .zip(&self.w)
            .fold((0.0, 0.0), |(n, d), ((x, y), w)| (n + w * (y - slope * x), d + w));
        num / den
    }
}

impl CostFunction for LogSpectrum {
    type Param = f64;
    type Output = f64;

    fn cost(&self, slope: &Self::Param) -> Result<Self::Output, Error> {
        let intercept = self.intercept(*slope);
        Ok(self
            .x
            .iter()
            .zip(&self.y)
            .zip(&self.w)
            .map(|((x, y), w)| w * (y - (intercept + slope * x)).powi(2))
            .sum())
    }
}

/// Fit `S = S0 ν^α` to flux densities with uncertainties. Points with a NaN
/// or non-positive flux density (or a non-positive uncertainty) are skipped.
/// The uncertainties weight the log-space residuals as given.
pub fn fit_power_law(freqs: &[f64], fluxes: &[f64], errs: &[f64]) -> Result<PowerLawFit, FitError> {
    if freqs.len() != fluxes.len() || freqs.len() != errs.len() {
        return Err(FitError::LengthMismatch {
            num_freqs: freqs.len(),
            num_fluxes: fluxes.len(),
            num_errs: errs.len(),
        });
    }
    let mut spectrum = LogSpectrum {
        x: vec![],
        y: vec![],
        w: vec![],
    };
    for ((&f, &s), &e) in freqs.iter().zip(fluxes).zip(errs) {
        if f > 0.0 && s > 0.0 && e > 0.0 {
            spectrum.x.push(f.log10());
            spectrum.y.push(s.log10());
            spectrum.w.push(1.0 / (e * e));
        }
    }
    let n = spectrum.x.len();
    if n < 2 {
        return Err(FitError::TooFewPoints(n));
    }

    // Unscaled covariance of the line parameters.
    let sw: f64 = spectrum.w.iter().sum();
    let swx: f64 = spectrum.w.iter().zip(&spectrum.x).map(|(w, x)| w * x).sum();
    let swxx: f64 = spectrum
        .w
        .iter()
        .zip(&spectrum.x)
        .map(|(w, x)| w * x * x)
        .sum();
    let delta = sw * swxx - swx * swx;
    if !(delta > f64::EPSILON * sw * swxx) {
        return Err(FitError::Degenerate);
    }

    let solver = NelderMead::new(vec![-1.0, -0.9])
        .with_sd_tolerance(1e-14)
        .map_err(|e| FitError::Solver(e.to_string()))?;
    let res = Executor::new(spectrum.clone(), solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run()
        .map_err(|e| FitError::Solver(e.to_string()))?;
    let iters = res.state.get_iter();
    let index = match res.state.get_best_param() {
        Some(&p) if p.is_finite() && iters < MAX_ITERS => p,
        _ => return Err(FitError::NotConverged(iters)),
    };
    let amplitude = 10f64.powf(spectrum.intercept(index));

    let fit = PowerLawFit {
        amplitude,
        amplitude_err: (swxx / delta).sqrt() * amplitude,
        index,
        index_err: (sw / delta).sqrt(),
    };
    debug!(
        "Power-law fit after {iters} iterations: S0 = {:e} (+/- {:e}), alpha = {} (+/- {})",
        fit.amplitude, fit.amplitude_err, fit.index, fit.index_err
    );
    Ok(fit)
}
