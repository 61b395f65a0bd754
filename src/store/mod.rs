//! The intermediate store: a FITS file holding a (possibly partial) dynamic
//! spectrum along with the observation metadata needed to analyse it.
//!
//! Layout:
//! - primary HDU keys: TELESCOP, NINT, NCHAN, NPOL, NUMDONE, POLS, flag counts
//!   and the missing antennas (MISSANT, a long string);
//! - "MEAN" and "MEDIAN" images `[time][channel][pol][re, im]`;
//! - "STD" image `[time][channel][pol]`;
//! - "CHANNELS" table (Freq \[Hz\]), "TIMES" table (GPS \[s\]) and "ANTENNAS"
//!   table (Name, X, Y, Z \[m\]).

mod error;
mod fits;

pub use error::StoreError;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use fitsio::{
    images::{ImageDescription, ImageType},
    tables::{ColumnDataType, ColumnDescription},
    FitsFile,
};
use hifitime::Epoch;
use log::{debug, trace};
use marlu::{c64, RADec};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{median_time_step, Telescope},
    reduce::{DynamicSpectrum, FlagStats},
    stokes::StokesCube,
    ObservationMetadata,
};
use fits::*;

/// Everything read back out of a store.
#[derive(Debug, Clone)]
pub struct StoredSpectrum {
    pub spectrum: DynamicSpectrum,

    /// The number of leading integrations that have been reduced. The rest
    /// are flagged placeholders.
    pub num_done: usize,

    pub flag_stats: FlagStats,
    pub telescope: Telescope,
    pub antenna_names: Vec<String>,
    pub missing_antennas: Vec<usize>,
}

impl StoredSpectrum {
    pub fn is_complete(&self) -> bool {
        self.num_done == self.spectrum.num_integrations()
    }
}

/// Write the store. The file is written beside `file` and then moved into
/// place, so an interrupted write leaves the previous checkpoint intact.
pub fn write_store(
    file: &Path,
    metadata: &ObservationMetadata,
    spectrum: &DynamicSpectrum,
    num_done: usize,
    flag_stats: &FlagStats,
) -> Result<(), StoreError> {
    let partial = PathBuf::from(format!("{}.partial", file.display()));
    if partial.exists() {
        std::fs::remove_file(&partial)?;
    }
    trace!("Writing store to {}", partial.display());
    let mut fptr = FitsFile::create(&partial).open()?;
    let hdu = fptr.hdu(0)?;

    let (num_ints, num_chans, num_pols) = spectrum.mean.dim();
    hdu.write_key(&mut fptr, "TELESCOP", metadata.telescope().name())?;
    hdu.write_key(&mut fptr, "NINT", num_ints as i64)?;
    hdu.write_key(&mut fptr, "NCHAN", num_chans as i64)?;
    hdu.write_key(&mut fptr, "NPOL", num_pols as i64)?;
    hdu.write_key(&mut fptr, "NUMDONE", num_done as i64)?;
    hdu.write_key(&mut fptr, "POLS", spectrum.pols.join(","))?;
    hdu.write_key(&mut fptr, "NUM_VIS", flag_stats.num_visibilities as i64)?;
    hdu.write_key(&mut fptr, "FLAG_TAB", flag_stats.table as i64)?;
    hdu.write_key(&mut fptr, "FLAG_NAN", flag_stats.nan as i64)?;
    hdu.write_key(&mut fptr, "FLAG_ZER", flag_stats.zero as i64)?;
    hdu.write_key(&mut fptr, "FLAG_SPR", flag_stats.spread as i64)?;
    let missing = metadata
        .missing_antennas()
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(",");
    fits_write_key_long_string(&mut fptr, "MISSANT", &missing)?;
    hdu.write_key(
        &mut fptr,
        "SOFTWARE",
        format!(
            "Created by {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
    )?;

    // Complex numbers are written as pairs of floats on a trailing axis.
    for (name, cube) in [("MEAN", &spectrum.mean), ("MEDIAN", &spectrum.median)] {
        let dim = [num_ints, num_chans, num_pols, 2];
        let image_description = ImageDescription {
            data_type: ImageType::Double,
            dimensions: &dim,
        };
        let hdu = fptr.create_image(name, &image_description)?;
        let image: Vec<f64> = cube.iter().flat_map(|c| [c.re, c.im]).collect();
        hdu.write_image(&mut fptr, &image)?;
    }
    {
        let dim = [num_ints, num_chans, num_pols];
        let image_description = ImageDescription {
            data_type: ImageType::Double,
            dimensions: &dim,
        };
        let hdu = fptr.create_image("STD", &image_description)?;
        let image: Vec<f64> = spectrum.std.iter().copied().collect();
        hdu.write_image(&mut fptr, &image)?;
    }

    let freq_col = ColumnDescription::new("Freq")
        .with_type(ColumnDataType::Double)
        .create()?;
    let hdu = fptr.create_table("CHANNELS", &[freq_col])?;
    hdu.write_col(&mut fptr, "Freq", &spectrum.freqs)?;

    let gps_col = ColumnDescription::new("GPS")
        .with_type(ColumnDataType::Double)
        .create()?;
    let hdu = fptr.create_table("TIMES", &[gps_col])?;
    let gps: Vec<f64> = spectrum
        .timestamps
        .iter()
        .map(|e| e.to_gpst_seconds())
        .collect();
    hdu.write_col(&mut fptr, "GPS", &gps)?;

    {
        let name_width = metadata
            .antenna_names()
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(1)
            .max(1);
        let name_col = ColumnDescription::new("Name")
            .with_type(ColumnDataType::String)
            .that_repeats(name_width)
            .create()?;
        let mut cols = vec![name_col];
        for axis in ["X", "Y", "Z"] {
            cols.push(
                ColumnDescription::new(axis)
                    .with_type(ColumnDataType::Double)
                    .create()?,
            );
        }
        let hdu = fptr.create_table("ANTENNAS", &cols)?;
        hdu.write_col(&mut fptr, "Name", metadata.antenna_names())?;
        let positions = metadata.antenna_positions();
        hdu.write_col(
            &mut fptr,
            "X",
            &positions.iter().map(|p| p.x).collect::<Vec<_>>(),
        )?;
        hdu.write_col(
            &mut fptr,
            "Y",
            &positions.iter().map(|p| p.y).collect::<Vec<_>>(),
        )?;
        hdu.write_col(
            &mut fptr,
            "Z",
            &positions.iter().map(|p| p.z).collect::<Vec<_>>(),
        )?;
    }
    drop(fptr);

    std::fs::rename(&partial, file)?;
    debug!(
        "Wrote store {} ({num_done}/{num_ints} integrations)",
        file.display()
    );
    Ok(())
}

/// Read a store written by [`write_store`].
pub fn read_store(file: &Path) -> Result<StoredSpectrum, StoreError> {
    debug!("Reading store {}", file.display());
    let mut fptr = fits_open(file)?;
    let hdu = fptr.hdu(0)?;
    let telescope: String = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "TELESCOP")?;
    let num_ints: usize = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "NINT")?;
    let num_chans: usize = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "NCHAN")?;
    let num_pols: usize = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "NPOL")?;
    let num_done: usize = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "NUMDONE")?;
    if num_done > num_ints {
        return Err(StoreError::BadProgress {
            num_done,
            num_integrations: num_ints,
        });
    }
    let pols: String = fits_get_required_key(&mut fptr, &hdu, "PRIMARY", "POLS")?;
    let pols: Vec<String> = pols.split(',').map(|p| p.trim().to_string()).collect();
    if pols.len() != num_pols {
        return Err(StoreError::BadShape {
            thing: "POLS",
            expected: num_pols,
            actual: pols.len(),
        });
    }
    let flag_stats = FlagStats {
        num_visibilities: fits_get_optional_key(&mut fptr, &hdu, "NUM_VIS")?.unwrap_or(0),
        table: fits_get_optional_key(&mut fptr, &hdu, "FLAG_TAB")?.unwrap_or(0),
        nan: fits_get_optional_key(&mut fptr, &hdu, "FLAG_NAN")?.unwrap_or(0),
        zero: fits_get_optional_key(&mut fptr, &hdu, "FLAG_ZER")?.unwrap_or(0),
        spread: fits_get_optional_key(&mut fptr, &hdu, "FLAG_SPR")?.unwrap_or(0),
    };
    let missing_antennas = match fits_get_optional_key_long_string(&mut fptr, "MISSANT")? {
        None => vec![],
        Some(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse().map_err(|_| StoreError::Parse {
                    key: "MISSANT",
                    value: s.to_string(),
                })
            })
            .collect::<Result<Vec<usize>, _>>()?,
    };

    let shape = (num_ints, num_chans, num_pols);
    let num_cells = num_ints * num_chans * num_pols;
    let mean = read_complex_cube(&mut fptr, "MEAN", shape)?;
    let median = read_complex_cube(&mut fptr, "MEDIAN", shape)?;
    let std = {
        let hdu = fptr.hdu("STD")?;
        let image: Vec<f64> = fits_get_image(&mut fptr, &hdu, "STD")?;
        let actual = image.len();
        Array3::from_shape_vec(shape, image).map_err(|_| StoreError::BadShape {
            thing: "STD",
            expected: num_cells,
            actual,
        })?
    };

    let hdu = fptr.hdu("CHANNELS")?;
    let freqs: Vec<f64> = hdu.read_col(&mut fptr, "Freq")?;
    if freqs.len() != num_chans {
        return Err(StoreError::BadShape {
            thing: "CHANNELS",
            expected: num_chans,
            actual: freqs.len(),
        });
    }
    let hdu = fptr.hdu("TIMES")?;
    let gps: Vec<f64> = hdu.read_col(&mut fptr, "GPS")?;
    if gps.len() != num_ints {
        return Err(StoreError::BadShape {
            thing: "TIMES",
            expected: num_ints,
            actual: gps.len(),
        });
    }
    let timestamps = gps.into_iter().map(Epoch::from_gpst_seconds).collect();
    let hdu = fptr.hdu("ANTENNAS")?;
    let antenna_names: Vec<String> = hdu.read_col(&mut fptr, "Name")?;

    Ok(StoredSpectrum {
        spectrum: DynamicSpectrum {
            mean,
            median,
            std,
            freqs,
            timestamps,
            pols,
        },
        num_done,
        flag_stats,
        telescope: Telescope::from_name(&telescope),
        antenna_names,
        missing_antennas,
    })
}

fn read_complex_cube(
    fptr: &mut FitsFile,
    name: &'static str,
    shape: (usize, usize, usize),
) -> Result<Array3<c64>, StoreError> {
    let hdu = fptr.hdu(name)?;
    let image: Vec<f64> = fits_get_image(fptr, &hdu, name)?;
    let expected = 2 * shape.0 * shape.1 * shape.2;
    if image.len() != expected {
        return Err(StoreError::BadShape {
            thing: name,
            expected,
            actual: image.len(),
        });
    }
    let values: Vec<c64> = image
        .chunks_exact(2)
        .map(|pair| c64::new(pair[0], pair[1]))
        .collect();
    Array3::from_shape_vec(shape, values).map_err(|_| StoreError::BadShape {
        thing: name,
        expected,
        actual: image.len(),
    })
}

/// Where a reduction of `data` is stored when no path is given: beside it,
/// named `<stem>_ds.fits`.
pub fn default_store_path(data: &Path) -> PathBuf {
    let stem = data
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    data.with_file_name(format!("{stem}_ds.fits"))
}

/// `prefix.ext` becomes `prefix-<label>.ext`; `ext` defaults to `default_ext`.
fn per_stokes_path(prefix: &Path, label: &str, default_ext: &str) -> PathBuf {
    let stem = prefix.with_extension("");
    let extension = prefix
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(default_ext);
    PathBuf::from(format!("{}-{label}.{extension}", stem.display()))
}

/// Write each Stokes plane as a whitespace-separated text table with one row
/// per integration. `prefix.csv` becomes `prefix-I.csv`, `prefix-Q.csv` and so
/// on.
pub fn write_stokes_text(prefix: &Path, stokes: &StokesCube) -> Result<Vec<PathBuf>, StoreError> {
    let mut written = vec![];
    for (label, plane) in stokes.planes() {
        let file = per_stokes_path(prefix, label, "csv");
        let mut writer = std::io::BufWriter::new(std::fs::File::create(&file)?);
        for row in plane.outer_iter() {
            let line = row
                .iter()
                .map(|v| format!("{v:.18e}"))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        debug!("Wrote {}", file.display());
        written.push(file);
    }
    Ok(written)
}

/// The description of one Stokes text table needed by downstream transient
/// searches. Keys follow the MWA dynamic-spectrum YAML format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StokesMetadata {
    #[serde(rename = "Apply barycentric correction")]
    pub apply_barycentric_correction: bool,

    #[serde(rename = "Dynamic spectrum")]
    pub dynamic_spectrum: DynamicSpectrumAxes,

    #[serde(rename = "Telescope")]
    pub telescope: String,

    #[serde(rename = "RFI Mask")]
    pub rfi_mask: RfiMask,

    /// Right ascension \[hours\].
    #[serde(rename = "RA", default, skip_serializing_if = "Option::is_none")]
    pub ra_hours: Option<f64>,

    /// Declination \[degrees\].
    #[serde(rename = "Dec", default, skip_serializing_if = "Option::is_none")]
    pub dec_deg: Option<f64>,

    /// \[pc cm^-3\]
    #[serde(rename = "DM")]
    pub dm: f64,

    #[serde(rename = "Padding")]
    pub padding: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSpectrumAxes {
    #[serde(rename = "Centre of lowest channel (MHz)")]
    pub lowest_channel_mhz: f64,

    #[serde(rename = "Channel width (MHz)")]
    pub channel_width_mhz: f64,

    #[serde(rename = "Input file")]
    pub input_file: PathBuf,

    #[serde(rename = "Sample time (s)")]
    pub sample_time: f64,

    /// GPS seconds of the first integration.
    #[serde(rename = "T0 (s)")]
    pub t0_gps: f64,

    /// The text tables have one row per integration.
    #[serde(rename = "Transpose")]
    pub transpose: bool,

    #[serde(rename = "ObsID")]
    pub obsid: u64,

    /// Dedispersion is relative to the highest channel.
    #[serde(rename = "Reference frequency (MHz)")]
    pub reference_frequency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfiMask {
    /// Readers treat samples with this value as flagged.
    #[serde(rename = "Value")]
    pub value: f64,
}

/// Write a YAML description of each Stokes text table written by
/// [`write_stokes_text`] with `text_prefix`. `prefix.yaml` becomes
/// `prefix-I.yaml`, `prefix-Q.yaml` and so on.
pub fn write_stokes_metadata(
    prefix: &Path,
    text_prefix: &Path,
    stokes: &StokesCube,
    telescope: &Telescope,
    dm: f64,
    source: Option<RADec>,
) -> Result<Vec<PathBuf>, StoreError> {
    let (lowest, width) = match stokes.freqs.as_slice() {
        [f0, f1, ..] => (*f0, f1 - f0),
        _ => {
            return Err(StoreError::TooFewSamples {
                axis: "channels",
                num: stokes.freqs.len(),
            })
        }
    };
    let (t0, sample_time) = match (stokes.timestamps.first(), median_time_step(&stokes.timestamps)) {
        (Some(t0), Some(dt)) => (t0.to_gpst_seconds(), dt),
        _ => {
            return Err(StoreError::TooFewSamples {
                axis: "integrations",
                num: stokes.timestamps.len(),
            })
        }
    };

    let mut written = vec![];
    for (label, _) in stokes.planes() {
        let metadata = StokesMetadata {
            apply_barycentric_correction: true,
            dynamic_spectrum: DynamicSpectrumAxes {
                lowest_channel_mhz: lowest / 1e6,
                channel_width_mhz: width / 1e6,
                input_file: per_stokes_path(text_prefix, label, "csv"),
                sample_time,
                t0_gps: t0,
                transpose: true,
                obsid: t0.floor() as u64,
                reference_frequency: "high".to_string(),
            },
            telescope: telescope.name().to_string(),
            rfi_mask: RfiMask { value: 0.0 },
            ra_hours: source.map(|s| s.ra.to_degrees() / 15.0),
            dec_deg: source.map(|s| s.dec.to_degrees()),
            dm,
            padding: "DM".to_string(),
        };
        let file = per_stokes_path(prefix, label, "yaml");
        let mut writer = std::io::BufWriter::new(std::fs::File::create(&file)?);
        serde_yaml::to_writer(&mut writer, &metadata)?;
        writer.flush()?;
        debug!("Wrote {}", file.display());
        written.push(file);
    }
    Ok(written)
}

pub fn read_stokes_metadata(file: &Path) -> Result<StokesMetadata, StoreError> {
    let f = std::io::BufReader::new(std::fs::File::open(file)?);
    Ok(serde_yaml::from_reader(f)?)
}
