use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("There are {names} antenna names but {positions} antenna positions")]
    AntennaCountMismatch { names: usize, positions: usize },

    #[error("Antenna index {index} appears in the data, but only {num_antennas} antennas are defined")]
    UnknownAntenna { index: usize, num_antennas: usize },

    #[error("No cross-correlation baselines are available; at least two antennas must have data")]
    NoBaselines,

    #[error("Expected {expected} channel frequencies, got {got}")]
    ChannelCountMismatch { expected: usize, got: usize },

    #[error("Expected {expected} timestamps, got {got}")]
    TimestampCountMismatch { expected: usize, got: usize },

    #[error("The data has {0} polarisations; only 1, 2 or 4 are supported")]
    UnsupportedPolCount(usize),
}
