//! Observation metadata that is fixed once a visibility table has been
//! opened.

mod error;

pub use error::MetadataError;

use std::collections::BTreeSet;

use hifitime::Epoch;
use log::info;
use marlu::{LatLngHeight, XyzGeocentric};
use vec1::Vec1;

lazy_static::lazy_static! {
    static ref ASKAP_POS: LatLngHeight = LatLngHeight {
        longitude_rad: (116.0 + 38.0 / 60.0 + 13.0 / 3600.0_f64).to_radians(),
        latitude_rad: -(26.0 + 41.0 / 60.0 + 46.0 / 3600.0_f64).to_radians(),
        height_metres: 0.0,
    };

    static ref MEERKAT_POS: LatLngHeight = LatLngHeight {
        longitude_rad: (21.0 + 19.0 / 60.0 + 48.0 / 3600.0_f64).to_radians(),
        latitude_rad: -(30.0 + 49.0 / 60.0 + 48.0 / 3600.0_f64).to_radians(),
        height_metres: 0.0,
    };

    static ref MWA_POS: LatLngHeight = LatLngHeight {
        longitude_rad: 116.67081523611111_f64.to_radians(),
        latitude_rad: -26.703319405555554_f64.to_radians(),
        height_metres: 377.827,
    };

    static ref GMRT_POS: LatLngHeight = LatLngHeight {
        longitude_rad: 74.0497_f64.to_radians(),
        latitude_rad: 19.0919_f64.to_radians(),
        height_metres: 656.0,
    };
}

/// The instrument that produced the visibilities. Names we don't recognise
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telescope {
    Mwa,
    Askap,
    MeerKat,
    Gmrt,
    Other(String),
}

impl Telescope {
    pub fn from_name(name: &str) -> Telescope {
        match name.trim().to_ascii_uppercase().as_str() {
            "MWA" => Telescope::Mwa,
            "ASKAP" => Telescope::Askap,
            "MEERKAT" => Telescope::MeerKat,
            "GMRT" => Telescope::Gmrt,
            _ => Telescope::Other(name.trim().to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Telescope::Mwa => "MWA",
            Telescope::Askap => "ASKAP",
            Telescope::MeerKat => "MeerKAT",
            Telescope::Gmrt => "GMRT",
            Telescope::Other(s) => s,
        }
    }

    /// The location of a known observatory.
    pub fn site(&self) -> Option<LatLngHeight> {
        match self {
            Telescope::Mwa => Some(*MWA_POS),
            Telescope::Askap => Some(*ASKAP_POS),
            Telescope::MeerKat => Some(*MEERKAT_POS),
            Telescope::Gmrt => Some(*GMRT_POS),
            Telescope::Other(_) => None,
        }
    }
}

/// The number of baselines for `num_antennas` antennas, computed as
/// `(nant / 2) * (nant - 1)` with integer division.
///
/// This only equals the number of antenna pairs, `nant * (nant - 1) / 2`, for
/// an even number of antennas; for odd counts it is short by `(nant - 1) / 2`.
/// Stored products and the reducer's reshape both depend on this value, so it
/// is kept as is.
pub fn num_baselines_from_antennas(num_antennas: usize) -> usize {
    (num_antennas / 2) * num_antennas.saturating_sub(1)
}

/// The labels of the instrumental polarisations for a given count.
pub fn pol_labels(num_pols: usize) -> Result<Vec<String>, MetadataError> {
    let labels: &[&str] = match num_pols {
        1 => &["XX"],
        2 => &["XX", "YY"],
        4 => &["XX", "XY", "YX", "YY"],
        n => return Err(MetadataError::UnsupportedPolCount(n)),
    };
    Ok(labels.iter().map(|s| s.to_string()).collect())
}

#[derive(Debug, Clone)]
pub struct ObservationMetadata {
    telescope: Telescope,

    /// The names of all antennas in the antenna table, including those with
    /// no data.
    antenna_names: Vec1<String>,

    /// Geocentric positions of all antennas \[metres\].
    antenna_positions: Vec1<XyzGeocentric>,

    /// Channel centre frequencies \[Hz\].
    channel_freqs: Vec1<f64>,

    /// The unique timestamps of the data, one per integration.
    timestamps: Vec1<Epoch>,

    pols: Vec<String>,

    /// Antenna indices that never appear in either antenna column of the
    /// cross-correlation data.
    missing_antennas: Vec<usize>,
}

impl ObservationMetadata {
    /// Derive the metadata. `available_antennas` are the antenna indices that
    /// actually appear in the cross-correlation rows.
    pub fn new(
        telescope: Telescope,
        antenna_names: Vec1<String>,
        antenna_positions: Vec1<XyzGeocentric>,
        channel_freqs: Vec1<f64>,
        timestamps: Vec1<Epoch>,
        num_pols: usize,
        available_antennas: &BTreeSet<usize>,
    ) -> Result<ObservationMetadata, MetadataError> {
        if antenna_names.len() != antenna_positions.len() {
            return Err(MetadataError::AntennaCountMismatch {
                names: antenna_names.len(),
                positions: antenna_positions.len(),
            });
        }
        let num_antennas = antenna_names.len();
        if let Some(&index) = available_antennas.iter().find(|&&a| a >= num_antennas) {
            return Err(MetadataError::UnknownAntenna {
                index,
                num_antennas,
            });
        }
        let missing_antennas = (0..num_antennas)
            .filter(|a| !available_antennas.contains(a))
            .collect();

        let metadata = ObservationMetadata {
            telescope,
            antenna_names,
            antenna_positions,
            channel_freqs,
            timestamps,
            pols: pol_labels(num_pols)?,
            missing_antennas,
        };
        if metadata.num_available_baselines() == 0 {
            return Err(MetadataError::NoBaselines);
        }
        Ok(metadata)
    }

    pub fn telescope(&self) -> &Telescope {
        &self.telescope
    }

    pub fn antenna_names(&self) -> &[String] {
        &self.antenna_names
    }

    pub fn antenna_positions(&self) -> &[XyzGeocentric] {
        &self.antenna_positions
    }

    pub fn channel_freqs(&self) -> &[f64] {
        &self.channel_freqs
    }

    pub fn timestamps(&self) -> &[Epoch] {
        &self.timestamps
    }

    pub fn pols(&self) -> &[String] {
        &self.pols
    }

    pub fn missing_antennas(&self) -> &[usize] {
        &self.missing_antennas
    }

    pub fn num_antennas(&self) -> usize {
        self.antenna_names.len()
    }

    pub fn num_available_antennas(&self) -> usize {
        self.num_antennas() - self.missing_antennas.len()
    }

    pub fn num_baselines(&self) -> usize {
        num_baselines_from_antennas(self.num_antennas())
    }

    pub fn num_available_baselines(&self) -> usize {
        num_baselines_from_antennas(self.num_available_antennas())
    }

    pub fn num_integrations(&self) -> usize {
        self.timestamps.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channel_freqs.len()
    }

    pub fn num_pols(&self) -> usize {
        self.pols.len()
    }

    /// The number of individual visibilities (one per integration, available
    /// baseline, channel and polarisation).
    pub fn num_visibilities(&self) -> usize {
        self.num_integrations()
            * self.num_available_baselines()
            * self.num_channels()
            * self.num_pols()
    }

    /// The median gap between consecutive timestamps \[seconds\]. `None` if
    /// there is only one integration.
    pub fn integration_time(&self) -> Option<f64> {
        median_time_step(&self.timestamps)
    }

    /// Log a summary of the observation.
    pub fn summary(&self) {
        let fmin = self.channel_freqs.iter().copied().fold(f64::INFINITY, f64::min);
        let fmax = self
            .channel_freqs
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        info!("Summary of observation:");
        info!("Telescope: {}", self.telescope.name());
        info!(
            "{} channels ({:.3}-{:.3} MHz)",
            self.num_channels(),
            fmin / 1e6,
            fmax / 1e6
        );
        info!("Antennas: {}", self.num_antennas());
        info!("Missing antennas: {:?}", self.missing_antennas);
        info!("{} available antennas", self.num_available_antennas());
        info!("Baselines: {}", self.num_available_baselines());
        info!("Visibilities: {}", self.num_visibilities());
        info!(
            "Integrations: {} ({} - {})",
            self.num_integrations(),
            self.timestamps.first(),
            self.timestamps.last()
        );
        if let Some(t) = self.integration_time() {
            info!("Integration time: {:.1} ms", t * 1000.0);
        }
        info!("Polarisations: {}", self.num_pols());
    }
}

/// The median gap between consecutive timestamps \[seconds\].
pub(crate) fn median_time_step(timestamps: &[Epoch]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = timestamps
        .windows(2)
        .map(|t| (t[1] - t[0]).to_seconds())
        .collect();
    Some(crate::math::nanmedian(&diffs))
}
