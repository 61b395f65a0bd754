use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepParseError {
    #[error("Unknown step '{0}'; expected one of dedisperse, average, pbcor, flag-v, flag-qu, flag-i, flag-noisy-v, flag-chan:A-B, flag-time:A-B or flag-window:A-B,C-D")]
    Unknown(String),

    #[error("Couldn't parse '{0}' as a range; expected e.g. 10-20")]
    BadRange(String),
}
