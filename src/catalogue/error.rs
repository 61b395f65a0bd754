use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogueError {
    /// The catalogue couldn't be reached; trying again later may work.
    #[error("The source catalogue is unavailable: {0}")]
    Unavailable(String),

    #[error("Source '{0}' isn't in the catalogue")]
    NotFound(String),

    #[error("{file}:{line}: {reason}")]
    BadRecord {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl CatalogueError {
    /// Whether the same lookup might succeed if tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogueError::Unavailable(_))
    }
}
