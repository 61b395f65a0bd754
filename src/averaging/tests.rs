use approx::assert_abs_diff_eq;
use hifitime::{Epoch, TimeUnits};

use super::*;

fn ramp(num_ints: usize, num_chans: usize) -> DynamicSpectrum {
    let freqs = (0..num_chans).map(|c| 100e6 + c as f64 * 1e6).collect();
    let timestamps = (0..num_ints)
        .map(|t| Epoch::from_gpst_seconds(1.3e9) + (2 * t as i64).seconds())
        .collect();
    let mut ds = DynamicSpectrum::new_flagged(freqs, timestamps, vec!["XX".into(), "YY".into()]);
    for ((t, c, p), v) in ds.mean.indexed_iter_mut() {
        *v = c64::new((10 * t + c) as f64, p as f64);
    }
    ds.median.assign(&ds.mean);
    ds.std.assign(&ds.mean.mapv(|v| v.re));
    ds
}

#[test]
fn test_average_block_means() {
    let mut ds = ramp(4, 6);
    average(&mut ds, 2, 3).unwrap();
    assert_eq!(ds.mean.dim(), (2, 2, 2));
    assert_eq!(ds.std.dim(), (2, 2, 2));
    // Block (t 0..2, c 0..3): values 0,1,2,10,11,12.
    assert_abs_diff_eq!(ds.mean[(0, 0, 0)].re, 6.0);
    assert_abs_diff_eq!(ds.mean[(0, 0, 1)].im, 1.0);
    assert_abs_diff_eq!(ds.mean[(1, 1, 0)].re, 29.0);
    assert_abs_diff_eq!(ds.median[(1, 1, 0)].re, 29.0);
    assert_abs_diff_eq!(ds.std[(0, 1, 1)], 9.0);

    assert_eq!(ds.freqs, vec![101e6, 104e6]);
    assert_eq!(
        ds.timestamps,
        vec![
            Epoch::from_gpst_seconds(1.3e9) + 1.seconds(),
            Epoch::from_gpst_seconds(1.3e9) + 5.seconds(),
        ]
    );
}

#[test]
fn test_average_crops_the_remainder() {
    let mut ds = ramp(5, 7);
    average(&mut ds, 2, 3).unwrap();
    assert_eq!(ds.num_integrations(), 2);
    assert_eq!(ds.num_channels(), 2);
    assert_eq!(ds.timestamps.len(), 2);
    assert_eq!(ds.freqs.len(), 2);
}

#[test]
fn test_average_ignores_flags() {
    let mut ds = ramp(2, 2);
    ds.flag(0..1, 0..2);
    average(&mut ds, 2, 1).unwrap();
    assert_abs_diff_eq!(ds.mean[(0, 0, 0)].re, 10.0);
    assert_abs_diff_eq!(ds.mean[(0, 1, 0)].re, 11.0);

    let mut ds = ramp(2, 2);
    ds.flag(0..2, 1..2);
    average(&mut ds, 2, 1).unwrap();
    assert!(ds.mean[(0, 1, 0)].re.is_nan());
    assert!(ds.std[(0, 1, 1)].is_nan());
}

#[test]
fn test_unit_factors_are_identity() {
    let original = ramp(3, 4);
    let mut ds = original.clone();
    average(&mut ds, 1, 1).unwrap();
    assert_eq!(ds.mean, original.mean);
    assert_eq!(ds.timestamps, original.timestamps);
}

#[test]
fn test_bad_factors() {
    let mut ds = ramp(3, 4);
    assert!(matches!(
        average(&mut ds, 0, 1),
        Err(AveragingError::ZeroFactor { .. })
    ));
    assert!(matches!(
        average(&mut ds, 1, 5),
        Err(AveragingError::FactorTooLarge {
            factor: 5,
            len: 4,
            ..
        })
    ));
    assert_eq!(ds.num_channels(), 4);
}
