use std::path::PathBuf;

use clap::{AppSettings, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use marlu::{LatLngHeight, RADec};

use dynspec::{
    catalogue::{lookup_with_retries, StaticCatalogue},
    faraday::RmSynthesisParams,
    metadata::Telescope,
    pipeline::{run_analysis, Step},
    read::{ms::MsReader, VisTable},
    reduce::{reduce_visibilities, ReduceParams, DEFAULT_MAX_MEM_BYTES},
    stokes::{AskapPolarization, DEFAULT_ASKAP_POL_AXIS_DEG},
    store::{default_store_path, read_store, write_stokes_metadata, write_stokes_text},
    DynamicSpectrum, DynspecError, ProcessingConfig,
};

/// How many times to ask the catalogue before giving up.
const CATALOGUE_ATTEMPTS: usize = 3;

#[derive(Debug, PartialEq)]
enum InputType {
    MeasurementSet,
    Store,
}

#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
struct Args {
    /// A measurement set to reduce, or a dynamic-spectrum store (.fits) to
    /// analyse.
    data: PathBuf,

    /// Where to write the dynamic-spectrum store when reducing a measurement
    /// set. It's also the checkpoint. Defaults to <data stem>_ds.fits beside
    /// the measurement set.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// The measurement set column to read.
    #[clap(long, default_value = "DATA")]
    data_column: String,

    /// Subtract MODEL_DATA from the visibilities.
    #[clap(long)]
    subtract_model: bool,

    /// Only use antennas whose names contain one of these strings.
    #[clap(long, multiple_values(true))]
    keep_antennas: Option<Vec<String>>,

    /// The most memory a chunk of visibilities may use [bytes].
    #[clap(long, default_value_t = DEFAULT_MAX_MEM_BYTES)]
    max_mem: usize,

    /// Read this many integrations per chunk, regardless of memory.
    #[clap(long)]
    chunk_integrations: Option<usize>,

    /// Continue an interrupted reduction from the output store.
    #[clap(long)]
    resume: bool,

    /// Form Stokes parameters without any telescope-specific assumptions.
    #[clap(long)]
    raw_stokes: bool,

    /// ASKAP data haven't been calibrated with CASA.
    #[clap(long)]
    askap_uncalibrated: bool,

    /// The ASKAP polarisation axis angle [degrees].
    #[clap(long, default_value_t = DEFAULT_ASKAP_POL_AXIS_DEG, allow_hyphen_values = true)]
    askap_pol_axis: f64,

    /// Form Stokes parameters from the baseline medians rather than the means.
    #[clap(long)]
    median: bool,

    /// Don't swap the ASKAP X and Y feeds.
    #[clap(long)]
    no_askap_swap: bool,

    /// Primary-beam correction factors of the X and Y feeds.
    #[clap(long, number_of_values = 2)]
    pbcor: Option<Vec<f64>>,

    /// Steps to run in order: dedisperse, average, pbcor, flag-v, flag-qu,
    /// flag-i, flag-noisy-v, flag-chan:A-B, flag-time:A-B, flag-window:A-B,C-D.
    #[clap(short, long, multiple_values(true))]
    steps: Vec<Step>,

    /// Dispersion measure [pc cm^-3]. Defaults to the catalogue value when a
    /// source is given.
    #[clap(long)]
    dm: Option<f64>,

    #[clap(long, default_value_t = 1)]
    time_average: usize,

    #[clap(long, default_value_t = 1)]
    freq_average: usize,

    /// The threshold of the automatic flagging steps.
    #[clap(long, default_value_t = 3.0)]
    flag_nsigma: f64,

    /// The first trial Faraday depth [rad m^-2].
    #[clap(long, default_value_t = -1000.0, allow_hyphen_values = true)]
    rm_start: f64,

    /// The Faraday depth step [rad m^-2].
    #[clap(long, default_value_t = 1.0)]
    rm_step: f64,

    #[clap(long, default_value_t = 10.0)]
    rm_min_snr: f64,

    /// The number of components to extract from each FDF.
    #[clap(long, default_value_t = 1)]
    rm_iterations: usize,

    #[clap(long, default_value_t = 5.0)]
    lc_nsigma: f64,

    /// Don't subtract a running median from the light curve.
    #[clap(long)]
    no_lc_median: bool,

    /// Fit a power law to the time-averaged Stokes I spectrum.
    #[clap(long)]
    fit_spectrum: bool,

    /// A source to look up in the catalogue.
    #[clap(long, requires = "catalogue")]
    source: Option<String>,

    /// A text catalogue of sources.
    #[clap(long)]
    catalogue: Option<PathBuf>,

    /// The source right ascension and declination [degrees].
    #[clap(long, number_of_values = 2, allow_hyphen_values = true)]
    radec: Option<Vec<f64>>,

    /// The observatory longitude, latitude [degrees] and height [metres].
    #[clap(long, number_of_values = 3, allow_hyphen_values = true)]
    site: Option<Vec<f64>>,

    /// Write the Stokes dynamic spectra as text with this prefix.
    #[clap(long)]
    stokes_csv: Option<PathBuf>,

    /// Describe each Stokes text table in a YAML file with this prefix.
    #[clap(long, requires = "stokes-csv")]
    yaml: Option<PathBuf>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), DynspecError> {
    let args = Args::parse();
    setup_logging(args.verbosity);

    let input_type = match args.data.extension().and_then(|os_str| os_str.to_str()) {
        Some("ms") => InputType::MeasurementSet,
        Some("fits") => InputType::Store,
        _ => return Err(DynspecError::UnknownInput(args.data.clone())),
    };
    info!("Input type: {input_type:?}");

    let config = config_from_args(&args)?;

    let (mut spectrum, telescope): (DynamicSpectrum, Telescope) = match input_type {
        InputType::MeasurementSet => {
            let mut reader = MsReader::new(
                &args.data,
                &args.data_column,
                args.keep_antennas.as_deref(),
            )?;
            reader.get_obs_metadata().summary();
            let telescope = reader.get_obs_metadata().telescope().clone();

            let progress = ProgressBar::with_draw_target(
                Some(0),
                if args.no_progress_bars {
                    ProgressDrawTarget::hidden()
                } else {
                    ProgressDrawTarget::stdout()
                },
            )
            .with_style(
                ProgressStyle::default_bar()
                    .template("{msg:17}: [{wide_bar:.blue}] {pos:2}/{len:2} integrations ({elapsed_precise}<{eta_precise})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            )
            .with_message("Reducing");

            // The flag statistics are reported by the reduction itself.
            let (spectrum, _) = reduce_visibilities(&mut reader, &config.reduce, Some(progress))?;
            (spectrum, telescope)
        }

        InputType::Store => {
            let stored = read_store(&args.data)?;
            if !stored.is_complete() {
                warn!(
                    "The store only has {} of {} integrations reduced",
                    stored.num_done,
                    stored.spectrum.num_integrations()
                );
            }
            stored.flag_stats.report();
            (stored.spectrum, stored.telescope)
        }
    };

    if let Some(site) = config.site {
        debug!(
            "Using site override: {:.4} deg, {:.4} deg, {} m",
            site.longitude_rad.to_degrees(),
            site.latitude_rad.to_degrees(),
            site.height_metres
        );
    }
    let (stokes, report) = run_analysis(&mut spectrum, &telescope, &config)?;
    for point in &report.light_curve_peaks {
        println!(
            "LC {},{},{:.6e}",
            stokes.timestamps[point.time_index], point.time_index, point.flux
        );
    }
    for d in &report.rm_detections {
        println!(
            "RM {},{},{:.6e},{:.1},{:.3},{:.2},{:.4}",
            stokes.timestamps[d.time_index],
            d.time_index,
            d.polarised_intensity,
            d.snr,
            d.phi,
            d.phi_err,
            d.fractional_pol
        );
    }
    if let Some(mjds) = &report.barycentric_mjds {
        for (t, mjd) in mjds.iter().enumerate() {
            debug!("Integration {t}: barycentric MJD {mjd:.10}");
        }
    }

    if let Some(prefix) = args.stokes_csv.as_ref() {
        for file in write_stokes_text(prefix, &stokes)? {
            info!("Wrote {}", file.display());
        }
        if let Some(yaml) = args.yaml.as_ref() {
            let files =
                write_stokes_metadata(yaml, prefix, &stokes, &telescope, config.dm, config.source)?;
            for file in files {
                info!("Wrote {}", file.display());
            }
        }
    }

    Ok(())
}

fn config_from_args(args: &Args) -> Result<ProcessingConfig, DynspecError> {
    let mut config = ProcessingConfig {
        reduce: ReduceParams {
            max_mem_bytes: args.max_mem,
            chunk_integrations: args.chunk_integrations,
            subtract_model: args.subtract_model,
            checkpoint: Some(
                args.output
                    .clone()
                    .unwrap_or_else(|| default_store_path(&args.data)),
            ),
            resume: args.resume,
        },
        raw_stokes: args.raw_stokes,
        askap: AskapPolarization {
            casa_calibrated: !args.askap_uncalibrated,
            pol_axis_deg: args.askap_pol_axis,
            swap_xy: !args.no_askap_swap,
        },
        use_median: args.median,
        pbcor: args.pbcor.as_ref().map(|v| (v[0], v[1])),
        dm: args.dm.unwrap_or(0.0),
        time_average: args.time_average,
        freq_average: args.freq_average,
        flag_nsigma: args.flag_nsigma,
        rm: RmSynthesisParams {
            start_phi: args.rm_start,
            dphi: args.rm_step,
            min_snr: args.rm_min_snr,
            max_iterations: args.rm_iterations,
            ..Default::default()
        },
        lc_nsigma: args.lc_nsigma,
        lc_subtract_median: !args.no_lc_median,
        fit_spectrum: args.fit_spectrum,
        site: args.site.as_ref().map(|v| LatLngHeight {
            longitude_rad: v[0].to_radians(),
            latitude_rad: v[1].to_radians(),
            height_metres: v[2],
        }),
        source: args
            .radec
            .as_ref()
            .map(|v| RADec::from_degrees(v[0], v[1])),
        ..Default::default()
    };

    if let (Some(name), Some(file)) = (args.source.as_deref(), args.catalogue.as_deref()) {
        let catalogue = StaticCatalogue::from_file(file)?;
        let source = lookup_with_retries(&catalogue, name, CATALOGUE_ATTEMPTS)?;
        info!("{name}: DM {} pc/cm^3", source.dm);
        if config.source.is_none() {
            config.source = Some(source.radec);
        }
        if args.dm.is_none() {
            config.dm = source.dm;
        }
    }

    Ok(config)
}

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_defaults_to_beside_the_measurement_set() {
        let args = Args::try_parse_from(["dynspec", "/data/1234567890.ms"]).unwrap();
        let config = config_from_args(&args).unwrap();
        assert_eq!(
            config.reduce.checkpoint,
            Some(PathBuf::from("/data/1234567890_ds.fits"))
        );

        let args =
            Args::try_parse_from(["dynspec", "/data/1234567890.ms", "-o", "/scratch/ds.fits"])
                .unwrap();
        let config = config_from_args(&args).unwrap();
        assert_eq!(config.reduce.checkpoint, Some(PathBuf::from("/scratch/ds.fits")));
    }

    #[test]
    fn test_yaml_needs_the_stokes_tables() {
        assert!(Args::try_parse_from(["dynspec", "ds.fits", "--yaml", "obs.yaml"]).is_err());
        let args = Args::try_parse_from([
            "dynspec",
            "ds.fits",
            "--stokes-csv",
            "obs.csv",
            "--yaml",
            "obs.yaml",
        ])
        .unwrap();
        assert_eq!(args.yaml, Some(PathBuf::from("obs.yaml")));
    }
}
