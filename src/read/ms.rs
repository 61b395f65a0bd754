//! Reading cross-correlations out of CASA measurement sets.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use hifitime::{Epoch, TimeUnits};
use log::{debug, trace};
use marlu::{c32, rubbl_casatables, XyzGeocentric};
use ndarray::prelude::*;
use rubbl_casatables::{Table, TableOpenMode};
use vec1::Vec1;

use super::{VisReadError, VisRows, VisTable};
use crate::{metadata::Telescope, ObservationMetadata};

/// The column holding model visibilities.
pub const MODEL_DATA_COL: &str = "MODEL_DATA";

/// Open a measurement set table read only. If `table` is `None`, then open the
/// base table.
fn read_table(ms: &Path, table: Option<&str>) -> Result<Table, VisReadError> {
    let t = Table::open(
        format!("{}/{}", ms.display(), table.unwrap_or("")),
        TableOpenMode::Read,
    )?;
    Ok(t)
}

pub struct MsReader {
    /// Input data metadata.
    obs_metadata: ObservationMetadata,

    /// The path to the measurement set on disk.
    pub ms: PathBuf,

    main_table: Table,

    /// Main-table row indices of the cross-correlations being used, in table
    /// order.
    cross_rows: Vec<u64>,

    /// The antenna pair of each entry in `cross_rows`.
    antenna_pairs: Vec<(usize, usize)>,

    /// The name of the column containing the visibilities to reduce.
    data_col_name: String,

    has_model_data: bool,
}

impl MsReader {
    /// Verify and populate metadata associated with this measurement set.
    ///
    /// Only cross-correlation rows are used. If `keep_antennas` is given, only
    /// rows where both antennas have a name containing one of the supplied
    /// strings are used; antennas without any such rows count as missing.
    pub fn new<P: AsRef<Path>>(
        ms: P,
        data_col_name: &str,
        keep_antennas: Option<&[String]>,
    ) -> Result<MsReader, VisReadError> {
        let ms = ms.as_ref();
        debug!("Using measurement set: {}", ms.display());
        if !ms.exists() {
            return Err(VisReadError::BadFile(ms.to_path_buf()));
        }

        let mut main_table = read_table(ms, None)?;
        let col_names = main_table.column_names()?;
        if !col_names.iter().any(|c| c == data_col_name) {
            return Err(VisReadError::MissingColumn(data_col_name.to_string()));
        }
        let has_model_data = col_names.iter().any(|c| c == MODEL_DATA_COL);
        debug!("Model data present: {has_model_data}");

        // Get the antenna names and positions.
        let mut antenna_table = read_table(ms, Some("ANTENNA"))?;
        let antenna_names: Vec<String> = antenna_table.get_col_as_vec("NAME")?;
        trace!("There are {} antenna names", antenna_names.len());
        let antenna_names =
            Vec1::try_from_vec(antenna_names).map_err(|_| VisReadError::NoAntennas)?;
        let antenna_positions: Vec<XyzGeocentric> = {
            let mut casacore_positions = Vec::with_capacity(antenna_table.n_rows() as usize);
            antenna_table.for_each_row(|row| {
                let pos: Vec<f64> = row.get_cell("POSITION")?;
                casacore_positions.push(XyzGeocentric {
                    x: pos[0],
                    y: pos[1],
                    z: pos[2],
                });
                Ok(())
            })?;
            casacore_positions
        };
        let antenna_positions =
            Vec1::try_from_vec(antenna_positions).map_err(|_| VisReadError::NoAntennas)?;

        let kept: Option<BTreeSet<usize>> = match keep_antennas {
            None => None,
            Some(keep) => {
                let kept: BTreeSet<usize> = antenna_names
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| keep.iter().any(|k| name.contains(k.as_str())))
                    .map(|(i, _)| i)
                    .collect();
                if kept.is_empty() {
                    return Err(VisReadError::NoKeptAntennas(keep.join(",")));
                }
                debug!("Keeping antennas {kept:?}");
                Some(kept)
            }
        };

        // Find the cross-correlation rows and the antennas actually present.
        let antenna1: Vec<i32> = main_table.get_col_as_vec("ANTENNA1")?;
        let antenna2: Vec<i32> = main_table.get_col_as_vec("ANTENNA2")?;
        let mut cross_rows = vec![];
        let mut antenna_pairs = vec![];
        let mut available_antennas = BTreeSet::new();
        for (i_row, (&a1, &a2)) in antenna1.iter().zip(antenna2.iter()).enumerate() {
            if a1 == a2 {
                continue;
            }
            let (a1, a2) = (a1 as usize, a2 as usize);
            if let Some(kept) = kept.as_ref() {
                if !kept.contains(&a1) || !kept.contains(&a2) {
                    continue;
                }
            }
            cross_rows.push(i_row as u64);
            antenna_pairs.push((a1, a2));
            available_antennas.insert(a1);
            available_antennas.insert(a2);
        }
        if cross_rows.is_empty() {
            return Err(VisReadError::Empty);
        }
        trace!("{} cross-correlation rows", cross_rows.len());

        // Get the unique times of the cross-correlations, in table order.
        let timestamps = {
            let utc_times: Vec<f64> = main_table.get_col_as_vec("TIME")?;
            let mut utc_time_set: BTreeSet<u64> = BTreeSet::new();
            let mut timestamps = vec![];
            for &i_row in &cross_rows {
                let utc_time = utc_times[i_row as usize];
                if utc_time_set.insert(utc_time.to_bits()) {
                    // casacore stores the times as centroids in UTC seconds
                    // with an MJD offset.
                    let e = Epoch::from_utc_seconds(
                        utc_time - hifitime::J1900_OFFSET * hifitime::SECONDS_PER_DAY,
                    );
                    // The values can be slightly off of their intended values;
                    // round them to the nearest millisecond.
                    timestamps.push(e.round(1.milliseconds()));
                }
            }
            Vec1::try_from_vec(timestamps).map_err(|_| VisReadError::Empty)?
        };

        // Get the frequency information.
        let mut spectral_window_table = read_table(ms, Some("SPECTRAL_WINDOW"))?;
        let channel_freqs: Vec<f64> = spectral_window_table.get_cell_as_vec("CHAN_FREQ", 0)?;
        let channel_freqs =
            Vec1::try_from_vec(channel_freqs).map_err(|_| VisReadError::NoChannelFreqs)?;

        let telescope = {
            let mut observation_table = read_table(ms, Some("OBSERVATION"))?;
            let name: String = observation_table.get_cell("TELESCOPE_NAME", 0)?;
            Telescope::from_name(&name)
        };

        // The number of polarisations comes from the shape of the first
        // visibility.
        let num_pols = {
            let first: Vec<c32> = main_table.get_cell_as_vec(data_col_name, cross_rows[0])?;
            first.len() / channel_freqs.len()
        };

        let obs_metadata = ObservationMetadata::new(
            telescope,
            antenna_names,
            antenna_positions,
            channel_freqs,
            timestamps,
            num_pols,
            &available_antennas,
        )?;

        Ok(MsReader {
            obs_metadata,
            ms: ms.to_path_buf(),
            main_table,
            cross_rows,
            antenna_pairs,
            data_col_name: data_col_name.to_string(),
            has_model_data,
        })
    }

    fn read_column(
        &mut self,
        col_name: &str,
        rows: &[u64],
        mut out: ArrayViewMut3<c32>,
    ) -> Result<(), VisReadError> {
        let expected_len = out.len_of(Axis(1)) * out.len_of(Axis(2));
        for (&row, mut out) in rows.iter().zip(out.outer_iter_mut()) {
            // The cell is arranged [channel][polarisation].
            let cell: Vec<c32> = self.main_table.get_cell_as_vec(col_name, row)?;
            if cell.len() != expected_len {
                return Err(VisReadError::BadArraySize {
                    column: if col_name == MODEL_DATA_COL {
                        "MODEL_DATA"
                    } else {
                        "DATA"
                    },
                    row_index: row,
                    got: cell.len(),
                    expected_len,
                });
            }
            out.iter_mut().zip(cell).for_each(|(o, c)| *o = c);
        }
        Ok(())
    }
}

impl VisTable for MsReader {
    fn get_obs_metadata(&self) -> &ObservationMetadata {
        &self.obs_metadata
    }

    fn num_rows(&self) -> usize {
        self.cross_rows.len()
    }

    fn has_model_data(&self) -> bool {
        self.has_model_data
    }

    fn reading_model_column(&self) -> bool {
        self.data_col_name == MODEL_DATA_COL
    }

    fn read_rows(
        &mut self,
        start: usize,
        num_rows: usize,
        with_model: bool,
    ) -> Result<VisRows, VisReadError> {
        let end = start + num_rows;
        if end > self.cross_rows.len() {
            return Err(VisReadError::RowsOutOfRange {
                start,
                end,
                total: self.cross_rows.len(),
            });
        }
        if with_model && !self.has_model_data {
            return Err(VisReadError::MissingColumn(MODEL_DATA_COL.to_string()));
        }
        trace!("Reading MS rows {start}..{end}");

        let shape = (
            num_rows,
            self.obs_metadata.num_channels(),
            self.obs_metadata.num_pols(),
        );
        let rows = self.cross_rows[start..end].to_vec();

        let mut data = Array3::zeros(shape);
        let data_col_name = self.data_col_name.clone();
        self.read_column(&data_col_name, &rows, data.view_mut())?;

        let model = if with_model {
            let mut model = Array3::zeros(shape);
            self.read_column(MODEL_DATA_COL, &rows, model.view_mut())?;
            Some(model)
        } else {
            None
        };

        let mut flags = Array3::from_elem(shape, false);
        let expected_len = shape.1 * shape.2;
        for (&row, mut out) in rows.iter().zip(flags.outer_iter_mut()) {
            let cell: Vec<bool> = self.main_table.get_cell_as_vec("FLAG", row)?;
            if cell.len() != expected_len {
                return Err(VisReadError::BadArraySize {
                    column: "FLAG",
                    row_index: row,
                    got: cell.len(),
                    expected_len,
                });
            }
            out.iter_mut().zip(cell).for_each(|(o, c)| *o = c);
        }

        let (antenna1, antenna2) = self.antenna_pairs[start..end].iter().copied().unzip();

        Ok(VisRows {
            antenna1,
            antenna2,
            data,
            flags,
            model,
        })
    }
}
