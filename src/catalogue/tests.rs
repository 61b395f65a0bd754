use std::cell::Cell;
use std::io::Write;

use approx::assert_abs_diff_eq;

use super::*;

fn source(name: &str, dm: f64) -> SourceInfo {
    SourceInfo {
        name: name.to_string(),
        radec: RADec::from_degrees(283.0, -10.5),
        dm,
        width: None,
        period: Some(1318.0),
        period_epoch: None,
    }
}

/// Fails with a retryable error a set number of times before answering.
struct Flaky {
    failures: Cell<usize>,
    inner: StaticCatalogue,
}

impl SourceCatalogue for Flaky {
    fn lookup(&self, name: &str) -> Result<SourceInfo, CatalogueError> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(CatalogueError::Unavailable("timed out".to_string()));
        }
        self.inner.lookup(name)
    }
}

#[test]
fn test_static_lookup() {
    let mut cat = StaticCatalogue::new();
    assert!(cat.is_empty());
    cat.insert(source("GPM J1839-10", 273.5));
    let found = cat.lookup("GPM J1839-10").unwrap();
    assert_abs_diff_eq!(found.dm, 273.5);

    let err = cat.lookup("nothing").unwrap_err();
    assert!(matches!(err, CatalogueError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[test]
fn test_retries() {
    let mut inner = StaticCatalogue::new();
    inner.insert(source("a", 10.0));
    let flaky = Flaky {
        failures: Cell::new(2),
        inner: inner.clone(),
    };
    assert_abs_diff_eq!(lookup_with_retries(&flaky, "a", 3).unwrap().dm, 10.0);

    let flaky = Flaky {
        failures: Cell::new(3),
        inner: inner.clone(),
    };
    let err = lookup_with_retries(&flaky, "a", 3).unwrap_err();
    assert!(err.is_retryable());

    // Fatal errors aren't retried.
    let flaky = Flaky {
        failures: Cell::new(0),
        inner,
    };
    assert!(matches!(
        lookup_with_retries(&flaky, "b", 5),
        Err(CatalogueError::NotFound(_))
    ));
}

#[test]
fn test_catalogue_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# name ra dec dm width period epoch").unwrap();
    writeln!(file, "J1839-10 279.93 -10.53 273.5 30.0 1318.2 60000.0").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "J0901-4046 135.26 -40.78 52.0 - 75.88  # no epoch").unwrap();
    writeln!(file, "FRB1 10.0 20.0 500.0").unwrap();
    file.flush().unwrap();

    let cat = StaticCatalogue::from_file(file.path()).unwrap();
    assert_eq!(cat.len(), 3);
    let s = cat.lookup("J1839-10").unwrap();
    assert_abs_diff_eq!(s.radec.ra, 279.93_f64.to_radians(), epsilon = 1e-12);
    assert_abs_diff_eq!(s.width.unwrap(), 30.0);
    assert_abs_diff_eq!(s.period.unwrap(), 1318.2);
    assert_abs_diff_eq!(s.period_epoch.unwrap().to_mjd_utc_days(), 60000.0, epsilon = 1e-9);

    let s = cat.lookup("J0901-4046").unwrap();
    assert!(s.width.is_none());
    assert!(s.period_epoch.is_none());
    assert!(cat.lookup("FRB1").unwrap().period.is_none());
}

#[test]
fn test_bad_catalogue_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "good 1.0 2.0 3.0").unwrap();
    writeln!(file, "bad 1.0 95.0 3.0").unwrap();
    file.flush().unwrap();
    match StaticCatalogue::from_file(file.path()) {
        Err(CatalogueError::BadRecord { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a bad record, got {other:?}"),
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "short 1.0 2.0").unwrap();
    file.flush().unwrap();
    assert!(matches!(
        StaticCatalogue::from_file(file.path()),
        Err(CatalogueError::BadRecord { line: 1, .. })
    ));
}
