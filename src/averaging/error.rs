use thiserror::Error;

#[derive(Error, Debug)]
pub enum AveragingError {
    #[error("The {axis} averaging factor must be at least 1")]
    ZeroFactor { axis: &'static str },

    #[error("Can't average {len} {axis} by a factor of {factor}; nothing would be left")]
    FactorTooLarge {
        axis: &'static str,
        factor: usize,
        len: usize,
    },
}
