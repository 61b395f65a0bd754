//! Conversion of instrumental polarisations into Stokes parameters.
//!
//! Every telescope convention reduces to the same arithmetic with different
//! parameters (normalisation, feed swap and feed rotation), so conversion is a
//! lookup in [`PolarizationConvention::params`] followed by one formula.

mod error;

pub use error::StokesError;

use hifitime::Epoch;
use log::debug;
use marlu::c64;
use ndarray::prelude::*;

use crate::{math::nanmean, metadata::Telescope, reduce::DynamicSpectrum};

/// The default ASKAP polarisation axis angle \[degrees\].
pub const DEFAULT_ASKAP_POL_AXIS_DEG: f64 = -45.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PolarizationConvention {
    /// CASA-calibrated linear feeds (MWA, MeerKAT, GMRT):
    /// I = (XX+YY)/2, Q = (XX-YY)/2, U = (XY+YX)/2, V = Im(XY-YX)/2.
    Linear,

    /// ASKAP data that haven't been through CASA. Q and U are rotated by twice
    /// the polarisation axis angle, and there's no factor of 1/2.
    AskapUncalibrated { pol_axis_deg: f64, swap_xy: bool },

    /// CASA-calibrated ASKAP data; as [`Self::AskapUncalibrated`], but with
    /// the 1/2 normalisation.
    AskapCasa { pol_axis_deg: f64, swap_xy: bool },

    /// I = XX+YY, Q = XX-YY, U = XY+YX, V = Im(XY-YX), with no calibration
    /// assumptions.
    Raw,
}

/// How ASKAP data should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AskapPolarization {
    /// Were the data calibrated with CASA?
    pub casa_calibrated: bool,
    pub pol_axis_deg: f64,

    /// Swap the X and Y feeds.
    pub swap_xy: bool,
}

impl Default for AskapPolarization {
    fn default() -> Self {
        AskapPolarization {
            casa_calibrated: true,
            pol_axis_deg: DEFAULT_ASKAP_POL_AXIS_DEG,
            swap_xy: true,
        }
    }
}

/// The parameters shared by all conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConversionParams {
    scale: f64,
    swap_xy: bool,

    /// Twice the polarisation axis angle \[radians\], if Q and U are rotated.
    rotation: Option<f64>,
}

impl PolarizationConvention {
    /// The convention to use for a telescope. Unknown telescopes are refused;
    /// callers wanting no assumptions should ask for [`Self::Raw`].
    pub fn for_telescope(
        telescope: &Telescope,
        askap: &AskapPolarization,
    ) -> Result<PolarizationConvention, StokesError> {
        match telescope {
            Telescope::Mwa | Telescope::MeerKat | Telescope::Gmrt => {
                Ok(PolarizationConvention::Linear)
            }
            Telescope::Askap if askap.casa_calibrated => Ok(PolarizationConvention::AskapCasa {
                pol_axis_deg: askap.pol_axis_deg,
                swap_xy: askap.swap_xy,
            }),
            Telescope::Askap => Ok(PolarizationConvention::AskapUncalibrated {
                pol_axis_deg: askap.pol_axis_deg,
                swap_xy: askap.swap_xy,
            }),
            Telescope::Other(name) => Err(StokesError::UnknownTelescope(name.clone())),
        }
    }

    fn params(&self) -> ConversionParams {
        match *self {
            PolarizationConvention::Linear => ConversionParams {
                scale: 0.5,
                swap_xy: false,
                rotation: None,
            },
            PolarizationConvention::AskapUncalibrated {
                pol_axis_deg,
                swap_xy,
            } => ConversionParams {
                scale: 1.0,
                swap_xy,
                rotation: Some(2.0 * pol_axis_deg.to_radians()),
            },
            PolarizationConvention::AskapCasa {
                pol_axis_deg,
                swap_xy,
            } => ConversionParams {
                scale: 0.5,
                swap_xy,
                rotation: Some(2.0 * pol_axis_deg.to_radians()),
            },
            PolarizationConvention::Raw => ConversionParams {
                scale: 1.0,
                swap_xy: false,
                rotation: None,
            },
        }
    }

    /// Convert one set of instrumental correlations `[XX, XY, YX, YY]` into
    /// `[I, Q, U, V]`.
    pub fn to_stokes(&self, [xx, xy, yx, yy]: [c64; 4]) -> [f64; 4] {
        let ConversionParams {
            scale,
            swap_xy,
            rotation,
        } = self.params();
        let (xx, xy, yx, yy) = if swap_xy {
            (yy, yx, xy, xx)
        } else {
            (xx, xy, yx, yy)
        };

        let i = (xx + yy).re;
        let (q, u) = match rotation {
            None => ((xx - yy).re, (xy + yx).re),
            Some(theta) => {
                let (sin, cos) = theta.sin_cos();
                (
                    (cos * (xy + yx) - sin * (xx - yy)).re,
                    (sin * (xy + yx) + cos * (xx - yy)).re,
                )
            }
        };
        let v = (xy - yx).im;
        [scale * i, scale * q, scale * u, scale * v]
    }
}

/// Indices of XX, XY, YX and YY in a list of polarisation labels.
fn linear_pol_indices(pols: &[String]) -> Result<[usize; 4], StokesError> {
    let mut indices = [0; 4];
    for (index, label) in indices.iter_mut().zip(["XX", "XY", "YX", "YY"]) {
        *index = pols
            .iter()
            .position(|p| p == label)
            .ok_or_else(|| StokesError::MissingPolarisations(pols.to_vec()))?;
    }
    Ok(indices)
}

/// Divide out the primary-beam response of each feed: XX by x², XY and YX by
/// xy and YY by y². Every statistic is corrected. Polarisations that aren't
/// present are skipped.
pub fn primary_beam_correct(
    spectrum: &mut DynamicSpectrum,
    pbcor_x: f64,
    pbcor_y: f64,
) -> Result<(), StokesError> {
    for f in [pbcor_x, pbcor_y] {
        if !(f.is_finite() && f > 0.0) {
            return Err(StokesError::BadBeamFactor(f));
        }
    }
    for (label, factor) in [
        ("XX", pbcor_x * pbcor_x),
        ("XY", pbcor_x * pbcor_y),
        ("YX", pbcor_y * pbcor_x),
        ("YY", pbcor_y * pbcor_y),
    ] {
        if let Some(p) = spectrum.pol_index(label) {
            spectrum
                .mean
                .slice_mut(s![.., .., p])
                .mapv_inplace(|v| v / factor);
            spectrum
                .median
                .slice_mut(s![.., .., p])
                .mapv_inplace(|v| v / factor);
            spectrum
                .std
                .slice_mut(s![.., .., p])
                .mapv_inplace(|v| v / factor);
        }
    }
    debug!("Applied primary-beam correction (x = {pbcor_x}, y = {pbcor_y})");
    Ok(())
}

/// Stokes parameters, each arranged `[time][channel]`.
#[derive(Debug, Clone)]
pub struct StokesCube {
    pub i: Array2<f64>,
    pub q: Array2<f64>,
    pub u: Array2<f64>,
    pub v: Array2<f64>,
    pub freqs: Vec<f64>,
    pub timestamps: Vec<Epoch>,
}

impl StokesCube {
    /// Form Stokes parameters from the baseline means of a dynamic spectrum.
    pub fn from_dynamic_spectrum(
        spectrum: &DynamicSpectrum,
        convention: PolarizationConvention,
    ) -> Result<StokesCube, StokesError> {
        Self::from_correlations(spectrum.mean.view(), spectrum, convention)
    }

    /// Form Stokes parameters from the baseline medians of a dynamic spectrum.
    pub fn from_median(
        spectrum: &DynamicSpectrum,
        convention: PolarizationConvention,
    ) -> Result<StokesCube, StokesError> {
        Self::from_correlations(spectrum.median.view(), spectrum, convention)
    }

    fn from_correlations(
        correlations: ArrayView3<c64>,
        spectrum: &DynamicSpectrum,
        convention: PolarizationConvention,
    ) -> Result<StokesCube, StokesError> {
        let [xx, xy, yx, yy] = linear_pol_indices(&spectrum.pols)?;
        let (num_ints, num_chans, _) = correlations.dim();
        let mut cube = StokesCube {
            i: Array2::zeros((num_ints, num_chans)),
            q: Array2::zeros((num_ints, num_chans)),
            u: Array2::zeros((num_ints, num_chans)),
            v: Array2::zeros((num_ints, num_chans)),
            freqs: spectrum.freqs.clone(),
            timestamps: spectrum.timestamps.clone(),
        };
        for ((t, c), i) in cube.i.indexed_iter_mut() {
            let corr = correlations.slice(s![t, c, ..]);
            let [si, sq, su, sv] = convention.to_stokes([corr[xx], corr[xy], corr[yx], corr[yy]]);
            *i = si;
            cube.q[(t, c)] = sq;
            cube.u[(t, c)] = su;
            cube.v[(t, c)] = sv;
        }
        Ok(cube)
    }

    pub fn num_integrations(&self) -> usize {
        self.i.len_of(Axis(0))
    }

    pub fn num_channels(&self) -> usize {
        self.i.len_of(Axis(1))
    }

    /// The four planes with their labels.
    pub fn planes(&self) -> [(&'static str, &Array2<f64>); 4] {
        [("I", &self.i), ("Q", &self.q), ("U", &self.u), ("V", &self.v)]
    }

    /// Flag the cells of a `[time][channel]` mask in all four planes.
    pub fn apply_mask(&mut self, mask: ArrayView2<bool>) {
        for plane in [&mut self.i, &mut self.q, &mut self.u, &mut self.v] {
            plane.zip_mut_with(&mask, |v, &m| {
                if m {
                    *v = f64::NAN;
                }
            });
        }
    }

    /// Linearly polarised intensity, sqrt(Q² + U²).
    pub fn polarised_intensity(&self) -> Array2<f64> {
        let mut p = self.q.clone();
        p.zip_mut_with(&self.u, |q, &u| *q = q.hypot(u));
        p
    }

    /// P / I. Cells where I is zero are NaN.
    pub fn fractional_polarisation(&self) -> Array2<f64> {
        ratio(&self.polarised_intensity(), &self.i)
    }

    /// The leakage ratios (Q/I, U/I, V/I). Cells where I is zero are NaN.
    pub fn leakage(&self) -> (Array2<f64>, Array2<f64>, Array2<f64>) {
        (
            ratio(&self.q, &self.i),
            ratio(&self.u, &self.i),
            ratio(&self.v, &self.i),
        )
    }

    /// The spectra (I, Q, U, V) of one integration.
    pub fn sed(&self, t: usize) -> Result<[Array1<f64>; 4], StokesError> {
        if t >= self.num_integrations() {
            return Err(StokesError::BadIntegration {
                index: t,
                num_integrations: self.num_integrations(),
            });
        }
        Ok([
            self.i.row(t).to_owned(),
            self.q.row(t).to_owned(),
            self.u.row(t).to_owned(),
            self.v.row(t).to_owned(),
        ])
    }

    /// The time-averaged spectra (I, Q, U, V), ignoring flagged cells.
    pub fn sed_average(&self) -> [Array1<f64>; 4] {
        let average = |plane: &Array2<f64>| {
            plane
                .columns()
                .into_iter()
                .map(|col| nanmean(&col.to_vec()))
                .collect::<Array1<f64>>()
        };
        [
            average(&self.i),
            average(&self.q),
            average(&self.u),
            average(&self.v),
        ]
    }
}

fn ratio(numerator: &Array2<f64>, denominator: &Array2<f64>) -> Array2<f64> {
    let mut out = numerator.clone();
    out.zip_mut_with(denominator, |n, &d| {
        *n = if d == 0.0 { f64::NAN } else { *n / d };
    });
    out
}
