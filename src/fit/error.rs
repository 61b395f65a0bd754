use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("A power-law fit needs at least two usable points; got {0}")]
    TooFewPoints(usize),

    #[error("Got {num_freqs} frequencies, {num_fluxes} flux densities and {num_errs} uncertainties")]
    LengthMismatch {
        num_freqs: usize,
        num_fluxes: usize,
        num_errs: usize,
    },

    #[error("All usable points have the same frequency; the spectral index is undefined")]
    Degenerate,

    #[error("The power-law fit didn't converge after {0} iterations")]
    NotConverged(u64),

    #[error("The power-law solver failed: {0}")]
    Solver(String),
}
