//! The crate-level error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    averaging::AveragingError, barycentre::EphemerisError, catalogue::CatalogueError,
    dedisperse::DedisperseError, faraday::FaradayError, fit::FitError, metadata::MetadataError,
    pipeline::StepParseError, read::VisReadError, reduce::ReduceError, stokes::StokesError,
    store::StoreError,
};

#[derive(Error, Debug)]
pub enum DynspecError {
    #[error("Don't know what to do with '{0}'; expected a measurement set (.ms) or a dynamic-spectrum store (.fits)")]
    UnknownInput(PathBuf),

    #[error(transparent)]
    VisRead(#[from] VisReadError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stokes(#[from] StokesError),

    #[error(transparent)]
    Dedisperse(#[from] DedisperseError),

    #[error(transparent)]
    Averaging(#[from] AveragingError),

    #[error(transparent)]
    Faraday(#[from] FaradayError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error(transparent)]
    Ephemeris(#[from] EphemerisError),

    #[error(transparent)]
    Step(#[from] StepParseError),
}
