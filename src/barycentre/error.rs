use hifitime::Epoch;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EphemerisError {
    #[error("The ephemeris is only valid between {start} and {end}; can't use it at {epoch}")]
    OutOfRange {
        epoch: Epoch,
        start: Epoch,
        end: Epoch,
    },

    #[error("The observatory latitude must be within +/- 90 degrees; got {0} degrees")]
    BadLatitude(f64),
}
