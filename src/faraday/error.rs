use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaradayError {
    #[error("RM synthesis needs at least one channel")]
    NoChannels,

    #[error("Got {num_q} Q values and {num_u} U values for {num_freqs} channels")]
    LengthMismatch {
        num_q: usize,
        num_u: usize,
        num_freqs: usize,
    },

    #[error("Channel frequencies must be positive; got {0} Hz")]
    BadFrequency(f64),

    #[error("The Faraday depth range [{start}, {stop}) with step {step} is empty or invalid")]
    BadPhiRange { start: f64, stop: f64, step: f64 },

    #[error("The RMSF has {rmsf_len} samples, but an FDF of {fdf_len} samples needs at least {}", 2 * .fdf_len - 1)]
    RmsfTooShort { rmsf_len: usize, fdf_len: usize },

    #[error("The RMSF has {rmsf_len} samples but {phi_len} Faraday depths")]
    RmsfAxisMismatch { rmsf_len: usize, phi_len: usize },

    #[error("Can't search an empty FDF for peaks")]
    EmptyFdf,

    #[error("Integration {index} is out of range; there are {num_integrations} integrations")]
    BadIntegration {
        index: usize,
        num_integrations: usize,
    },
}
