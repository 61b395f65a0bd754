use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedisperseError {
    #[error("Dedispersion needs at least two integrations to know the sampling time")]
    TooFewIntegrations,

    #[error("The integration time must be positive; got {0} s")]
    BadIntegrationTime(f64),

    #[error("Dedispersion needs at least one channel")]
    NoChannels,

    #[error("Channel frequencies must be positive; got {0} Hz")]
    BadFrequency(f64),
}
