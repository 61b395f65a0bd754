//! Band-averaged light curves and their peaks.

#[cfg(test)]
mod tests;

use hifitime::Epoch;
use log::{debug, info};
use ndarray::prelude::*;

use crate::{
    math::{median_filter, nanmean, std_iqr},
    stokes::StokesCube,
};

/// The window of the running median subtracted from light curves.
pub const MEDIAN_FILTER_WINDOW: usize = 11;

/// An integration whose band-averaged flux stands out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCurvePoint {
    pub time_index: usize,
    pub flux: f64,
}

/// Band-averaged Stokes parameters and polarised intensity over time.
#[derive(Debug, Clone)]
pub struct LightCurves {
    pub timestamps: Vec<Epoch>,
    pub i: Vec<f64>,
    pub q: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub p: Vec<f64>,
}

fn band_average(plane: &Array2<f64>) -> Vec<f64> {
    plane
        .rows()
        .into_iter()
        .map(|row| nanmean(&row.to_vec()))
        .collect()
}

impl LightCurves {
    pub fn new(stokes: &StokesCube) -> LightCurves {
        LightCurves {
            timestamps: stokes.timestamps.clone(),
            i: band_average(&stokes.i),
            q: band_average(&stokes.q),
            u: band_average(&stokes.u),
            v: band_average(&stokes.v),
            p: band_average(&stokes.polarised_intensity()),
        }
    }

    /// The curves with their labels.
    pub fn curves(&self) -> [(&'static str, &[f64]); 5] {
        [
            ("I", self.i.as_slice()),
            ("Q", self.q.as_slice()),
            ("U", self.u.as_slice()),
            ("V", self.v.as_slice()),
            ("P", self.p.as_slice()),
        ]
    }

    /// Subtract a running median from every curve.
    pub fn subtract_median(&mut self) {
        for curve in [
            &mut self.i,
            &mut self.q,
            &mut self.u,
            &mut self.v,
            &mut self.p,
        ] {
            *curve = subtract_running_median(curve);
        }
    }
}

/// `values` minus their [`MEDIAN_FILTER_WINDOW`]-sample running median.
pub fn subtract_running_median(values: &[f64]) -> Vec<f64> {
    let baseline = median_filter(values, MEDIAN_FILTER_WINDOW);
    values.iter().zip(baseline).map(|(v, b)| v - b).collect()
}

/// The points of a light curve above `nsigma` times its IQR-derived standard
/// deviation, and that standard deviation.
pub fn find_lc_peaks(curve: &[f64], nsigma: f64) -> (Vec<LightCurvePoint>, f64) {
    let std = std_iqr(curve);
    let points = curve
        .iter()
        .enumerate()
        .filter(|(_, &flux)| flux > nsigma * std)
        .map(|(time_index, &flux)| LightCurvePoint { time_index, flux })
        .collect();
    (points, std)
}

/// Find peaks in the band-averaged Stokes I light curve, optionally after
/// subtracting a running median.
pub fn lc_peaks(stokes: &StokesCube, nsigma: f64, subtract_median: bool) -> Vec<LightCurvePoint> {
    let mut curve = LightCurves::new(stokes).i;
    if subtract_median {
        curve = subtract_running_median(&curve);
    }
    let (points, std) = find_lc_peaks(&curve, nsigma);
    debug!("Light curve robust std {std:.3e}; threshold {nsigma} sigma");
    for point in &points {
        info!(
            "{},{},{:.3e}",
            stokes.timestamps[point.time_index], point.time_index, point.flux
        );
    }
    points
}
