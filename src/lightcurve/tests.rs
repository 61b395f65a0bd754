use approx::assert_abs_diff_eq;
use hifitime::TimeUnits;

use super::*;

const NUM_INTS: usize = 64;

/// A steady 1 Jy source with a slight wiggle and a 9 Jy burst at integration
/// 30.
fn bursting() -> StokesCube {
    let num_chans = 4;
    let mut i = Array2::zeros((NUM_INTS, num_chans));
    for ((t, _), v) in i.indexed_iter_mut() {
        *v = 1.0 + 0.001 * (1.7 * t as f64).sin();
    }
    i.row_mut(30).mapv_inplace(|v| v + 9.0);
    let mut q = Array2::zeros((NUM_INTS, num_chans));
    q.fill(0.3);
    let mut u = Array2::zeros((NUM_INTS, num_chans));
    u.fill(0.4);
    StokesCube {
        i,
        q,
        u,
        v: Array2::zeros((NUM_INTS, num_chans)),
        freqs: vec![150e6, 151e6, 152e6, 153e6],
        timestamps: (0..NUM_INTS)
            .map(|t| Epoch::from_gpst_seconds(1.3e9) + (t as i64).seconds())
            .collect(),
    }
}

#[test]
fn test_light_curves() {
    let mut stokes = bursting();
    stokes.i[(5, 2)] = f64::NAN;
    let lcs = LightCurves::new(&stokes);
    assert_eq!(lcs.i.len(), NUM_INTS);
    assert_abs_diff_eq!(lcs.i[30], 10.0 + 0.001 * (1.7 * 30.0f64).sin(), epsilon = 1e-12);
    assert!(!lcs.i[5].is_nan());
    assert_abs_diff_eq!(lcs.p[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(lcs.q[10], 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(lcs.v[10], 0.0);
    assert_eq!(lcs.curves()[4].0, "P");
}

#[test]
fn test_lc_peaks_with_median_subtraction() {
    let stokes = bursting();
    let points = lc_peaks(&stokes, 6.0, true);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].time_index, 30);
    assert_abs_diff_eq!(points[0].flux, 9.0, epsilon = 0.01);
}

#[test]
fn test_lc_peaks_without_median_subtraction() {
    // Without removing the baseline, a steady source is "bright" everywhere.
    let stokes = bursting();
    let points = lc_peaks(&stokes, 6.0, false);
    assert_eq!(points.len(), NUM_INTS);

    // A zero-mean curve only has the burst.
    let mut curve = vec![0.0; 40];
    for (t, v) in curve.iter_mut().enumerate() {
        *v = 0.01 * (t as f64).sin();
    }
    curve[7] = 1.0;
    let (points, std) = find_lc_peaks(&curve, 5.0);
    assert!(std > 0.0);
    assert_eq!(points, vec![LightCurvePoint { time_index: 7, flux: 1.0 }]);
}

#[test]
fn test_subtract_median_removes_baseline() {
    let mut lcs = LightCurves::new(&bursting());
    lcs.subtract_median();
    assert!(lcs.q[20].abs() < 1e-12);
    assert!(lcs.p[20].abs() < 1e-12);
    assert!(lcs.i[30] > 8.9);
}
