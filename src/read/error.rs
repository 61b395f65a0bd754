//! Errors associated with reading visibility tables.

use std::path::PathBuf;

use marlu::rubbl_casatables;
use thiserror::Error;

use crate::metadata::MetadataError;

#[derive(Error, Debug)]
pub enum VisReadError {
    #[error("Supplied file path {0} does not exist or is not readable!")]
    BadFile(PathBuf),

    #[error("The main table of the measurement set contains no cross-correlation rows!")]
    Empty,

    #[error("The ANTENNA table contains no antennas")]
    NoAntennas,

    #[error("The SPECTRAL_WINDOW table contained no channel frequencies")]
    NoChannelFreqs,

    #[error("None of the requested antennas ({0}) are in the ANTENNA table")]
    NoKeptAntennas(String),

    #[error("The measurement set has no {0} column")]
    MissingColumn(String),

    #[error("Requested rows {start}..{end}, but there are only {total} rows")]
    RowsOutOfRange { start: usize, end: usize, total: usize },

    #[error("{column} in row {row_index} had {got} elements; expected {expected_len}")]
    BadArraySize {
        column: &'static str,
        row_index: u64,
        got: usize,
        expected_len: usize,
    },

    #[error("Error when trying to interface with measurement set: {0}")]
    Table(#[from] rubbl_casatables::TableError),

    #[error("Error from casacore: {0}")]
    Casacore(#[from] rubbl_casatables::CasacoreError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
