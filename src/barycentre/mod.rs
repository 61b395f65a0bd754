//! Barycentric light-travel-time corrections.
//!
//! The correction for a timestamp is the projection of the observatory's
//! barycentric position onto the source direction, divided by the speed of
//! light. Where the Earth is comes from an [`Ephemeris`]; where the
//! observatory is on the Earth comes from its geodetic position and the local
//! sidereal time.

mod error;

pub use error::EphemerisError;

use hifitime::{Duration, Epoch};
use log::debug;
use marlu::{constants::VEL_C, precession::get_lmst, LatLngHeight, RADec};

/// The astronomical unit \[m\].
pub const AU_METRES: f64 = 1.495_978_707e11;

/// WGS84 semi-major axis \[m\].
const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Something that knows where the Earth is.
pub trait Ephemeris {
    /// The position of the Earth's centre relative to the solar-system
    /// barycentre at `epoch` \[m\], in equatorial coordinates.
    fn earth_position(&self, epoch: Epoch) -> Result<[f64; 3], EphemerisError>;
}

/// The low-precision solar coordinates of the Astronomical Almanac, good to
/// about 0.01 degrees between 1950 and 2050. The Sun is taken to be at the
/// barycentre, which limits the accuracy of a correction to a few seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPrecisionEphemeris;

impl LowPrecisionEphemeris {
    fn valid_range() -> (Epoch, Epoch) {
        (
            Epoch::from_gregorian_utc_at_midnight(1950, 1, 1),
            Epoch::from_gregorian_utc_at_midnight(2050, 1, 1),
        )
    }

    /// The geocentric ecliptic longitude \[rad\], distance \[AU\] and the
    /// obliquity of the ecliptic \[rad\] of the Sun.
    pub fn sun(&self, epoch: Epoch) -> Result<(f64, f64, f64), EphemerisError> {
        let (start, end) = Self::valid_range();
        if epoch < start || epoch > end {
            return Err(EphemerisError::OutOfRange { epoch, start, end });
        }
        let n = epoch.to_jde_tdb_days() - 2_451_545.0;
        let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
        let g = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();
        let longitude = (mean_longitude + 1.915 * g.sin() + 0.020 * (2.0 * g).sin()).to_radians();
        let distance = 1.000_14 - 0.016_71 * g.cos() - 0.000_14 * (2.0 * g).cos();
        let obliquity = (23.439 - 0.000_000_4 * n).to_radians();
        Ok((longitude, distance, obliquity))
    }
}

impl Ephemeris for LowPrecisionEphemeris {
    fn earth_position(&self, epoch: Epoch) -> Result<[f64; 3], EphemerisError> {
        let (longitude, distance, obliquity) = self.sun(epoch)?;
        let r = distance * AU_METRES;
        let sun = [
            r * longitude.cos(),
            r * obliquity.cos() * longitude.sin(),
            r * obliquity.sin() * longitude.sin(),
        ];
        Ok([-sun[0], -sun[1], -sun[2]])
    }
}

/// The geocentric position of an observatory, rotated to the local sidereal
/// time `lmst` \[m\].
fn site_position(site: LatLngHeight, lmst: f64) -> [f64; 3] {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let (sin_lat, cos_lat) = site.latitude_rad.sin_cos();
    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let rho = (n + site.height_metres) * cos_lat;
    [
        rho * lmst.cos(),
        rho * lmst.sin(),
        (n * (1.0 - e2) + site.height_metres) * sin_lat,
    ]
}

fn unit_vector(radec: RADec) -> [f64; 3] {
    let (sin_dec, cos_dec) = radec.dec.sin_cos();
    let (sin_ra, cos_ra) = radec.ra.sin_cos();
    [cos_dec * cos_ra, cos_dec * sin_ra, sin_dec]
}

/// Light-travel-time corrections for one observatory and source direction.
///
/// The corrections are only as good as the [`Ephemeris`]. With
/// [`LowPrecisionEphemeris`] they can be wrong by up to about 5 s: the Sun
/// stands in for the barycentre, and the two are up to ~1.5e6 km apart. The
/// solar position error itself adds less than 0.1 s. Timing finer than that
/// needs a precise ephemeris.
pub struct BarycentricCorrector<E: Ephemeris> {
    ephemeris: E,
    site: LatLngHeight,
    source: [f64; 3],
}

impl<E: Ephemeris> BarycentricCorrector<E> {
    pub fn new(
        ephemeris: E,
        site: LatLngHeight,
        source: RADec,
    ) -> Result<BarycentricCorrector<E>, EphemerisError> {
        let lat_deg = site.latitude_rad.to_degrees();
        if !(-90.0..=90.0).contains(&lat_deg) {
            return Err(EphemerisError::BadLatitude(lat_deg));
        }
        Ok(BarycentricCorrector {
            ephemeris,
            site,
            source: unit_vector(source),
        })
    }

    /// The time to add to a topocentric arrival time to get the barycentric
    /// arrival time \[seconds\].
    pub fn delay(&self, epoch: Epoch) -> Result<f64, EphemerisError> {
        let earth = self.ephemeris.earth_position(epoch)?;
        let lmst = get_lmst(self.site.longitude_rad, epoch, Duration::from_seconds(0.0));
        let site = site_position(self.site, lmst);
        let projection: f64 = earth
            .iter()
            .zip(site)
            .zip(self.source)
            .map(|((e, s), u)| (e + s) * u)
            .sum();
        Ok(projection / VEL_C)
    }

    /// Barycentric arrival times.
    pub fn correct(&self, timestamps: &[Epoch]) -> Result<Vec<Epoch>, EphemerisError> {
        let corrected = timestamps
            .iter()
            .map(|&t| Ok(t + Duration::from_seconds(self.delay(t)?)))
            .collect::<Result<Vec<_>, EphemerisError>>()?;
        if let (Some(first), Some(first_corrected)) = (timestamps.first(), corrected.first()) {
            debug!(
                "Barycentric correction at {first}: {:.6} s",
                (*first_corrected - *first).to_seconds()
            );
        }
        Ok(corrected)
    }

    /// Barycentric arrival times as MJDs.
    pub fn correct_mjd(&self, timestamps: &[Epoch]) -> Result<Vec<f64>, EphemerisError> {
        Ok(self
            .correct(timestamps)?
            .into_iter()
            .map(|t| t.to_mjd_utc_days())
            .collect())
    }
}
