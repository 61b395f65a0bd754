//! Dynamic spectra from interferometric visibilities, and the polarimetric
//! and timing analyses that run on them.

pub mod averaging;
pub mod barycentre;
pub mod catalogue;
pub mod config;
pub mod dedisperse;
mod error;
pub mod faraday;
pub mod fit;
pub mod flagging;
pub mod lightcurve;
pub mod math;
pub mod metadata;
pub mod pipeline;
pub mod read;
pub mod reduce;
pub mod stokes;
pub mod store;

pub use config::ProcessingConfig;
pub use error::DynspecError;
pub use metadata::ObservationMetadata;
pub use reduce::{DynamicSpectrum, FlagStats};
pub use stokes::{PolarizationConvention, StokesCube};

pub use marlu::{c32, c64};
