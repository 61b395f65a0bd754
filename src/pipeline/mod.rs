//! Running a sequence of steps over a dynamic spectrum, then the analyses.

mod error;

pub use error::StepParseError;

use std::ops::Range;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::{
    averaging::average,
    barycentre::{BarycentricCorrector, LowPrecisionEphemeris},
    config::ProcessingConfig,
    dedisperse::dedisperse,
    faraday::{find_fdf_peaks, PeakDetection},
    fit::{fit_power_law, PowerLawFit},
    flagging::{
        flag_channels, flag_spectrum, flag_times, flag_window, heavily_flagged_channels, FlagPass,
    },
    lightcurve::{lc_peaks, LightCurvePoint},
    math::{nanmedian, sigma_clipped_std},
    metadata::Telescope,
    reduce::DynamicSpectrum,
    stokes::{primary_beam_correct, StokesCube},
    DynspecError,
};

/// One operation on a dynamic spectrum. Numeric parameters of the automatic
/// steps come from the [`ProcessingConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Dedisperse,
    Average,
    PrimaryBeam,
    Flag(FlagPass),
    FlagChannels(Range<usize>),
    FlagTimes(Range<usize>),
    FlagWindow {
        times: Range<usize>,
        chans: Range<usize>,
    },
}

fn parse_range(s: &str) -> Result<Range<usize>, StepParseError> {
    let bad = || StepParseError::BadRange(s.to_string());
    let (start, end) = s.split_once('-').ok_or_else(bad)?;
    let start: usize = start.trim().parse().map_err(|_| bad())?;
    let end: usize = end.trim().parse().map_err(|_| bad())?;
    if end < start {
        return Err(bad());
    }
    Ok(start..end)
}

impl FromStr for Step {
    type Err = StepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let step = match (name.to_ascii_lowercase().as_str(), arg) {
            ("dedisperse", None) => Step::Dedisperse,
            ("average", None) => Step::Average,
            ("pbcor", None) => Step::PrimaryBeam,
            ("flag-v", None) => Step::Flag(FlagPass::V),
            ("flag-qu", None) => Step::Flag(FlagPass::QU),
            ("flag-i", None) => Step::Flag(FlagPass::I),
            ("flag-noisy-v", None) => Step::Flag(FlagPass::NoisyVChannels),
            ("flag-chan", Some(arg)) => Step::FlagChannels(parse_range(arg)?),
            ("flag-time", Some(arg)) => Step::FlagTimes(parse_range(arg)?),
            ("flag-window", Some(arg)) => {
                let (times, chans) = arg
                    .split_once(',')
                    .ok_or_else(|| StepParseError::BadRange(arg.to_string()))?;
                Step::FlagWindow {
                    times: parse_range(times)?,
                    chans: parse_range(chans)?,
                }
            }
            _ => return Err(StepParseError::Unknown(s.to_string())),
        };
        Ok(step)
    }
}

/// Run the configured steps over a dynamic spectrum in order.
pub fn run_steps(
    spectrum: &mut DynamicSpectrum,
    telescope: &Telescope,
    config: &ProcessingConfig,
) -> Result<(), DynspecError> {
    for step in &config.steps {
        match step {
            Step::Dedisperse => {
                info!("Dedispersing to DM {}", config.dm);
                dedisperse(spectrum, config.dm)?;
            }
            Step::Average => {
                info!(
                    "Averaging by {} in time and {} in frequency",
                    config.time_average, config.freq_average
                );
                average(spectrum, config.time_average, config.freq_average)?;
            }
            Step::PrimaryBeam => match config.pbcor {
                Some((x, y)) => primary_beam_correct(spectrum, x, y)?,
                None => warn!("Primary-beam correction requested, but no factors were given"),
            },
            Step::Flag(pass) => {
                let convention = config.convention(telescope)?;
                flag_spectrum(spectrum, convention, *pass, config.flag_nsigma)?;
                if *pass == FlagPass::V {
                    for c in heavily_flagged_channels(spectrum, config.heavily_flagged_fraction) {
                        warn!(
                            "Channel {c} has more than {:.0}% of its integrations flagged; consider flag-chan:{c}-{}",
                            100.0 * config.heavily_flagged_fraction,
                            c + 1
                        );
                    }
                }
            }
            Step::FlagChannels(chans) => flag_channels(spectrum, chans.clone()),
            Step::FlagTimes(times) => flag_times(spectrum, times.clone()),
            Step::FlagWindow { times, chans } => {
                flag_window(spectrum, times.clone(), chans.clone())
            }
        }
    }
    Ok(())
}

/// The results of analysing a dynamic spectrum.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub light_curve_peaks: Vec<LightCurvePoint>,
    pub rm_detections: Vec<PeakDetection>,
    pub spectral_fit: Option<PowerLawFit>,

    /// Barycentric arrival times of every integration, if the source
    /// direction and observatory are known.
    pub barycentric_mjds: Option<Vec<f64>>,
}

impl AnalysisReport {
    pub fn log(&self) {
        if self.light_curve_peaks.is_empty() {
            info!("No light-curve detections");
        } else {
            info!("{} light-curve detections", self.light_curve_peaks.len());
        }
        if self.rm_detections.is_empty() {
            info!("No polarised detections in the Faraday dispersion function");
        } else {
            info!("{} polarised detections", self.rm_detections.len());
        }
        if let Some(fit) = self.spectral_fit {
            info!(
                "Spectral fit: S0 = {:e} (+/- {:e}), alpha = {:.3} (+/- {:.3})",
                fit.amplitude, fit.amplitude_err, fit.index, fit.index_err
            );
        }
    }
}

/// Bursts are clipped out of each channel before estimating its noise.
const SPECTRUM_CLIP_NSIGMA: f64 = 3.0;

fn log_leakage(stokes: &StokesCube) {
    let median = |a: ndarray::Array2<f64>| nanmedian(&a.iter().copied().collect::<Vec<_>>());
    let (q, u, v) = stokes.leakage();
    debug!(
        "Median leakage: Q/I {:.4}, U/I {:.4}, V/I {:.4}; median fractional polarisation {:.4}",
        median(q),
        median(u),
        median(v),
        median(stokes.fractional_polarisation())
    );
}

/// Run the steps, then form Stokes parameters and search them.
pub fn run_analysis(
    spectrum: &mut DynamicSpectrum,
    telescope: &Telescope,
    config: &ProcessingConfig,
) -> Result<(StokesCube, AnalysisReport), DynspecError> {
    run_steps(spectrum, telescope, config)?;
    let convention = config.convention(telescope)?;
    let stokes = if config.use_median {
        StokesCube::from_median(spectrum, convention)?
    } else {
        StokesCube::from_dynamic_spectrum(spectrum, convention)?
    };
    log_leakage(&stokes);

    let light_curve_peaks = lc_peaks(&stokes, config.lc_nsigma, config.lc_subtract_median);
    let rm_detections = find_fdf_peaks(&stokes, &config.rm)?;

    let spectral_fit = if config.fit_spectrum {
        let [sed_i, ..] = stokes.sed_average();
        let errs: Vec<f64> = stokes
            .i
            .columns()
            .into_iter()
            .map(|col| sigma_clipped_std(&col.to_vec(), SPECTRUM_CLIP_NSIGMA))
            .collect();
        Some(fit_power_law(&stokes.freqs, &sed_i.to_vec(), &errs)?)
    } else {
        None
    };

    let barycentric_mjds = match (config.source, config.site(telescope)) {
        (Some(source), Some(site)) => {
            let corrector = BarycentricCorrector::new(LowPrecisionEphemeris, site, source)?;
            Some(corrector.correct_mjd(&stokes.timestamps)?)
        }
        (Some(_), None) => {
            warn!(
                "Don't know where {} is; skipping the barycentric correction",
                telescope.name()
            );
            None
        }
        (None, _) => None,
    };

    let report = AnalysisReport {
        light_curve_peaks,
        rm_detections,
        spectral_fit,
        barycentric_mjds,
    };
    report.log();
    Ok((stokes, report))
}
