//! Looking up what's known about a source: its position, dispersion measure
//! and pulse timing.

mod error;
#[cfg(test)]
mod tests;

pub use error::CatalogueError;

use std::collections::HashMap;
use std::path::Path;

use hifitime::Epoch;
use log::{debug, warn};
use marlu::RADec;

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: String,
    pub radec: RADec,

    /// Dispersion measure \[pc cm^-3\].
    pub dm: f64,

    /// Pulse width \[seconds\].
    pub width: Option<f64>,

    /// Pulse period \[seconds\].
    pub period: Option<f64>,

    /// The reference epoch of the pulse period.
    pub period_epoch: Option<Epoch>,
}

pub trait SourceCatalogue {
    fn lookup(&self, name: &str) -> Result<SourceInfo, CatalogueError>;
}

/// Look a source up, retrying up to `attempts` times in total while the
/// catalogue reports retryable failures.
pub fn lookup_with_retries<C: SourceCatalogue + ?Sized>(
    catalogue: &C,
    name: &str,
    attempts: usize,
) -> Result<SourceInfo, CatalogueError> {
    let mut attempt = 1;
    loop {
        match catalogue.lookup(name) {
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!("Catalogue lookup of '{name}' failed (attempt {attempt}/{attempts}): {e}");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// An in-memory catalogue.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogue {
    sources: HashMap<String, SourceInfo>,
}

impl StaticCatalogue {
    pub fn new() -> StaticCatalogue {
        StaticCatalogue::default()
    }

    pub fn insert(&mut self, source: SourceInfo) {
        self.sources.insert(source.name.clone(), source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Read a whitespace-separated text catalogue. Each line is
    ///
    /// `name ra_deg dec_deg dm [width_s [period_s [period_epoch_mjd]]]`
    ///
    /// Blank lines and anything after a `#` are ignored. Optional columns may
    /// be given as `-`.
    pub fn from_file(file: &Path) -> Result<StaticCatalogue, CatalogueError> {
        let contents = std::fs::read_to_string(file)?;
        let mut catalogue = StaticCatalogue::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let source = parse_record(line).map_err(|reason| CatalogueError::BadRecord {
                file: file.to_path_buf(),
                line: i + 1,
                reason,
            })?;
            catalogue.insert(source);
        }
        debug!(
            "Read {} sources from catalogue {}",
            catalogue.len(),
            file.display()
        );
        Ok(catalogue)
    }
}

impl SourceCatalogue for StaticCatalogue {
    fn lookup(&self, name: &str) -> Result<SourceInfo, CatalogueError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogueError::NotFound(name.to_string()))
    }
}

fn parse_field(field: &str, what: &str) -> Result<f64, String> {
    field
        .parse()
        .map_err(|_| format!("Couldn't parse '{field}' as the {what}"))
}

fn parse_optional(field: Option<&str>, what: &str) -> Result<Option<f64>, String> {
    match field {
        None | Some("-") => Ok(None),
        Some(f) => parse_field(f, what).map(Some),
    }
}

fn parse_record(line: &str) -> Result<SourceInfo, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 || fields.len() > 7 {
        return Err(format!(
            "Expected between 4 and 7 columns, but got {}",
            fields.len()
        ));
    }
    let ra = parse_field(fields[1], "RA")?;
    let dec = parse_field(fields[2], "Dec")?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(format!("Dec {dec} is outside +/- 90 degrees"));
    }
    Ok(SourceInfo {
        name: fields[0].to_string(),
        radec: RADec::from_degrees(ra, dec),
        dm: parse_field(fields[3], "DM")?,
        width: parse_optional(fields.get(4).copied(), "pulse width")?,
        period: parse_optional(fields.get(5).copied(), "period")?,
        period_epoch: parse_optional(fields.get(6).copied(), "period epoch")?
            .map(Epoch::from_mjd_utc),
    })
}
