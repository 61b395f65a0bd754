//! Access to visibility tables.
//!
//! The reducer only needs bounded reads of cross-correlation rows in time
//! order, so anything implementing [`VisTable`] can feed it.

mod error;
pub mod ms;

pub use error::VisReadError;

use marlu::c32;
use ndarray::prelude::*;

use crate::ObservationMetadata;

/// A block of consecutive cross-correlation rows.
pub struct VisRows {
    /// The first antenna of each row.
    pub antenna1: Vec<usize>,

    /// The second antenna of each row.
    pub antenna2: Vec<usize>,

    /// Visibilities, arranged `[row][channel][polarisation]`.
    pub data: Array3<c32>,

    /// Flags with the same shape as `data`; `true` means flagged.
    pub flags: Array3<bool>,

    /// Model visibilities, if they were requested.
    pub model: Option<Array3<c32>>,
}

impl VisRows {
    pub fn num_rows(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// The number of bytes held by this block.
    pub fn num_bytes(&self) -> usize {
        let per_row = std::mem::size_of::<usize>() * 2;
        self.num_rows() * per_row
            + self.data.len() * std::mem::size_of::<c32>()
            + self.flags.len() * std::mem::size_of::<bool>()
            + self.model.as_ref().map_or(0, |m| m.len() * std::mem::size_of::<c32>())
    }
}

pub trait VisTable {
    fn get_obs_metadata(&self) -> &ObservationMetadata;

    /// The total number of cross-correlation rows. These are ordered by time,
    /// with every integration holding the same number of rows.
    fn num_rows(&self) -> usize;

    /// Is a model column available for subtraction?
    fn has_model_data(&self) -> bool;

    /// Is the column being read the model column itself? Flags aren't applied
    /// to model visibilities.
    fn reading_model_column(&self) -> bool;

    /// Read `num_rows` rows starting at row `start`. If `with_model` is set,
    /// model visibilities are read too.
    fn read_rows(
        &mut self,
        start: usize,
        num_rows: usize,
        with_model: bool,
    ) -> Result<VisRows, VisReadError>;
}
