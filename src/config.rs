//! Per-run processing configuration.

use marlu::{LatLngHeight, RADec};

use crate::{
    faraday::RmSynthesisParams,
    flagging::DEFAULT_HEAVILY_FLAGGED_FRACTION,
    metadata::Telescope,
    pipeline::Step,
    reduce::ReduceParams,
    stokes::{AskapPolarization, PolarizationConvention, StokesError},
};

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub reduce: ReduceParams,

    /// Ignore the telescope and form Stokes parameters without any
    /// calibration assumptions.
    pub raw_stokes: bool,
    pub askap: AskapPolarization,

    /// Form Stokes parameters from the baseline medians rather than the means.
    pub use_median: bool,

    /// Primary-beam correction factors of the X and Y feeds.
    pub pbcor: Option<(f64, f64)>,

    /// Dispersion measure \[pc cm^-3\].
    pub dm: f64,

    pub time_average: usize,
    pub freq_average: usize,

    /// The threshold of the automatic flagging passes.
    pub flag_nsigma: f64,

    /// Channels with more than this fraction of integrations flagged are
    /// reported after flagging on Stokes V.
    pub heavily_flagged_fraction: f64,

    pub rm: RmSynthesisParams,

    pub lc_nsigma: f64,
    pub lc_subtract_median: bool,

    /// Fit a power law to the time-averaged Stokes I spectrum.
    pub fit_spectrum: bool,

    /// Overrides the telescope's known location.
    pub site: Option<LatLngHeight>,

    /// The source direction, needed for barycentric corrections.
    pub source: Option<RADec>,

    /// Analysis steps run on the dynamic spectrum, in order.
    pub steps: Vec<Step>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            reduce: ReduceParams::default(),
            raw_stokes: false,
            askap: AskapPolarization::default(),
            use_median: false,
            pbcor: None,
            dm: 0.0,
            time_average: 1,
            freq_average: 1,
            flag_nsigma: 3.0,
            heavily_flagged_fraction: DEFAULT_HEAVILY_FLAGGED_FRACTION,
            rm: RmSynthesisParams::default(),
            lc_nsigma: 5.0,
            lc_subtract_median: true,
            fit_spectrum: false,
            site: None,
            source: None,
            steps: vec![],
        }
    }
}

impl ProcessingConfig {
    /// The polarisation convention for data from `telescope`.
    pub fn convention(&self, telescope: &Telescope) -> Result<PolarizationConvention, StokesError> {
        if self.raw_stokes {
            Ok(PolarizationConvention::Raw)
        } else {
            PolarizationConvention::for_telescope(telescope, &self.askap)
        }
    }

    /// The observatory location, preferring the configured override.
    pub fn site(&self, telescope: &Telescope) -> Option<LatLngHeight> {
        self.site.or_else(|| telescope.site())
    }
}
