use hifitime::{Epoch, TimeUnits};
use marlu::c64;

use super::*;

const NUM_INTS: usize = 20;
const NUM_CHANS: usize = 10;

/// An unpolarised 1 Jy source with a little deterministic circular "noise".
fn quiet() -> DynamicSpectrum {
    let freqs = (0..NUM_CHANS).map(|c| 150e6 + c as f64 * 1e6).collect();
    let timestamps = (0..NUM_INTS)
        .map(|t| Epoch::from_gpst_seconds(1.3e9) + (t as i64).seconds())
        .collect();
    let pols = ["XX", "XY", "YX", "YY"].iter().map(|s| s.to_string()).collect();
    let mut ds = DynamicSpectrum::new_flagged(freqs, timestamps, pols);
    for t in 0..NUM_INTS {
        for c in 0..NUM_CHANS {
            let wiggle = 0.01 * ((7 * t + 3 * c) as f64).sin();
            ds.mean[(t, c, 0)] = c64::new(1.0, 0.0);
            ds.mean[(t, c, 1)] = c64::new(0.0, wiggle);
            ds.mean[(t, c, 2)] = c64::new(0.0, -wiggle);
            ds.mean[(t, c, 3)] = c64::new(1.0, 0.0);
        }
    }
    ds.median.assign(&ds.mean);
    ds.std.fill(0.1);
    ds
}

fn flagged_cells(ds: &DynamicSpectrum) -> Vec<(usize, usize)> {
    let mut cells = vec![];
    for t in 0..ds.num_integrations() {
        for c in 0..ds.num_channels() {
            if is_flagged(ds, t, c) {
                cells.push((t, c));
            }
        }
    }
    cells
}

#[test]
fn test_flag_v_spike() {
    let mut ds = quiet();
    ds.mean[(5, 3, 1)] = c64::new(0.0, 10.0);
    let num = flag_spectrum(&mut ds, PolarizationConvention::Linear, FlagPass::V, 3.0).unwrap();
    assert_eq!(num, 1);
    assert_eq!(flagged_cells(&ds), vec![(5, 3)]);
    // Every statistic is flagged.
    assert!(ds.median.slice(s![5, 3, ..]).iter().all(|v| v.re.is_nan()));
    assert!(ds.std.slice(s![5, 3, ..]).iter().all(|v| v.is_nan()));

    // Running again doesn't flag anything new.
    let num = flag_spectrum(&mut ds, PolarizationConvention::Linear, FlagPass::V, 3.0).unwrap();
    assert_eq!(num, 0);
}

#[test]
fn test_flag_qu_and_i() {
    let mut ds = quiet();
    // A spike in Q.
    ds.mean[(2, 2, 0)] = c64::new(11.0, 0.0);
    // A spike in U.
    ds.mean[(8, 8, 1)] = c64::new(10.0, 0.0);
    ds.mean[(8, 8, 2)] = c64::new(10.0, 0.0);
    let num = flag_spectrum(&mut ds, PolarizationConvention::Linear, FlagPass::QU, 3.0).unwrap();
    assert_eq!(num, 2);
    assert_eq!(flagged_cells(&ds), vec![(2, 2), (8, 8)]);

    let mut ds = quiet();
    ds.mean[(4, 6, 0)] = c64::new(40.0, 0.0);
    ds.mean[(4, 6, 3)] = c64::new(40.0, 0.0);
    let num = flag_spectrum(&mut ds, PolarizationConvention::Linear, FlagPass::I, 3.0).unwrap();
    assert_eq!(num, 1);
    assert_eq!(flagged_cells(&ds), vec![(4, 6)]);
}

#[test]
fn test_flag_noisy_v_channels() {
    let mut ds = quiet();
    for t in 0..NUM_INTS {
        let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
        ds.mean[(t, 7, 1)] = c64::new(0.0, sign);
        ds.mean[(t, 7, 2)] = c64::new(0.0, -sign);
    }
    let stokes = StokesCube::from_dynamic_spectrum(&ds, PolarizationConvention::Linear).unwrap();
    assert_eq!(noisy_channels(stokes.v.view(), 3.0), vec![7]);

    let num = flag_spectrum(
        &mut ds,
        PolarizationConvention::Linear,
        FlagPass::NoisyVChannels,
        3.0,
    )
    .unwrap();
    assert_eq!(num, NUM_INTS);
    assert_eq!(heavily_flagged_channels(&ds, DEFAULT_HEAVILY_FLAGGED_FRACTION), vec![7]);
}

#[test]
fn test_heavily_flagged_channels() {
    let mut ds = quiet();
    // 1 of 20 integrations is exactly 5%, which isn't "more than".
    flag_window(&mut ds, 0..1, 2..3);
    // 2 of 20 is.
    flag_window(&mut ds, 3..5, 4..5);
    assert_eq!(heavily_flagged_channels(&ds, DEFAULT_HEAVILY_FLAGGED_FRACTION), vec![4]);
}

#[test]
fn test_manual_flagging() {
    let mut ds = quiet();
    flag_channels(&mut ds, 1..3);
    assert_eq!(flagged_cells(&ds).len(), 2 * NUM_INTS);

    let mut ds = quiet();
    flag_times(&mut ds, 18..25);
    assert_eq!(flagged_cells(&ds).len(), 2 * NUM_CHANS);

    let mut ds = quiet();
    flag_window(&mut ds, 1..3, 4..7);
    assert_eq!(
        flagged_cells(&ds),
        vec![(1, 4), (1, 5), (1, 6), (2, 4), (2, 5), (2, 6)]
    );
}

#[test]
fn test_flag_stokes_cube() {
    let mut ds = quiet();
    ds.mean[(5, 3, 1)] = c64::new(0.0, 10.0);
    let mut stokes =
        StokesCube::from_dynamic_spectrum(&ds, PolarizationConvention::Linear).unwrap();
    assert_eq!(flag_stokes(&mut stokes, FlagPass::V, 3.0), 1);
    for (_, plane) in stokes.planes() {
        assert!(plane[(5, 3)].is_nan());
        assert!(!plane[(5, 4)].is_nan());
    }
}

#[test]
fn test_outlier_mask_ignores_nans() {
    let plane = array![[0.0, 1.0, f64::NAN], [-1.0, 0.0, 0.5]];
    let mask = outlier_mask(plane.view(), 1.0);
    assert!(!mask[(0, 2)]);
    assert!(mask[(0, 1)]);
    assert!(mask[(1, 0)]);
}
