//! Errors from collapsing visibilities into a dynamic spectrum.

use thiserror::Error;

use crate::{read::VisReadError, store::StoreError};

#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("The visibility table has {rows} cross-correlation rows, but {num_integrations} integrations of {num_baselines} baselines need {}", .num_integrations * .num_baselines)]
    RowCountMismatch {
        rows: usize,
        num_integrations: usize,
        num_baselines: usize,
    },

    #[error("Not even one integration fits in the memory budget ({max_mem_bytes} bytes); the chunk size would be zero")]
    ZeroChunkSize { max_mem_bytes: usize },

    #[error("Model subtraction was requested, but the visibility table has no model column")]
    NoModelData,

    #[error("Couldn't reshape a chunk of visibilities: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("The checkpoint has {got} {thing}, but the observation has {expected}")]
    IncompatibleCheckpoint {
        thing: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Read(#[from] VisReadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
