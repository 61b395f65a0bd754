//! Errors from reading and writing the intermediate store.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Couldn't find store file {0}")]
    NotFound(PathBuf),

    #[error("Keyword {key} is missing from HDU {hdu}")]
    MissingKey { key: &'static str, hdu: &'static str },

    #[error("Couldn't parse keyword {key} value '{value}'")]
    Parse { key: &'static str, value: String },

    #[error("HDU {0} doesn't contain an image")]
    NotImage(&'static str),

    #[error("{thing} has {actual} elements; expected {expected}")]
    BadShape {
        thing: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("The store says {num_done} integrations are done, but it only has {num_integrations}")]
    BadProgress {
        num_done: usize,
        num_integrations: usize,
    },

    #[error("Describing a dynamic spectrum needs at least two {axis}; got {num}")]
    TooFewSamples { axis: &'static str, num: usize },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("fitsio error: {0}")]
    Fitsio(#[from] fitsio::errors::Error),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}
