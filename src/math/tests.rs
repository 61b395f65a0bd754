use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_integer_shift_is_a_roll() {
    let mut series: Vec<f64> = (0..8).map(|i| i as f64).collect();
    fourier_shift_real(&mut series, 2.0);
    let expected = [6.0, 7.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    for (s, e) in series.iter().zip(expected) {
        assert_abs_diff_eq!(*s, e, epsilon = 1e-10);
    }

    // Negative shifts advance the series; odd lengths work too.
    let mut series: Vec<c64> = (0..7).map(|i| c64::new(i as f64, -(i as f64))).collect();
    fourier_shift(&mut series, -1.0);
    for (i, s) in series.iter().enumerate() {
        let e = ((i + 1) % 7) as f64;
        assert_abs_diff_eq!(s.re, e, epsilon = 1e-10);
        assert_abs_diff_eq!(s.im, -e, epsilon = 1e-10);
    }
}

#[test]
fn test_zero_shift_is_exact() {
    let original = vec![1.5, -2.25, f64::NAN, 4.0];
    let mut series = original.clone();
    fourier_shift_real(&mut series, 0.0);
    for (s, o) in series.iter().zip(original.iter()) {
        assert_eq!(s.to_bits(), o.to_bits());
    }
}

#[test]
fn test_fractional_shift_moves_a_pulse() {
    let n = 64;
    let gaussian = |centre: f64| -> Vec<f64> {
        (0..n)
            .map(|i| (-(i as f64 - centre).powi(2) / (2.0 * 3.0_f64.powi(2))).exp())
            .collect()
    };
    let mut series = gaussian(20.0);
    let mut shifter = FourierShifter::new(n);
    shifter.shift_real(&mut series, 2.5);
    for (s, e) in series.iter().zip(gaussian(22.5)) {
        assert_abs_diff_eq!(*s, e, epsilon = 1e-6);
    }
}

#[test]
fn test_nan_aware_reductions() {
    let values = [1.0, f64::NAN, 3.0, 5.0];
    assert_abs_diff_eq!(nanmean(&values), 3.0);
    assert_abs_diff_eq!(nanmedian(&values), 3.0);
    assert_abs_diff_eq!(nanstd(&values), (8.0_f64 / 3.0).sqrt());
    assert!(nanmean(&[f64::NAN, f64::NAN]).is_nan());
    assert!(nanstd(&[]).is_nan());
    assert_abs_diff_eq!(nanmedian(&[4.0, 1.0, 3.0, 2.0]), 2.5);
}

#[test]
fn test_complex_reductions() {
    let values = [
        c64::new(1.0, 10.0),
        c64::new(f64::NAN, 0.0),
        c64::new(3.0, 30.0),
        c64::new(2.0, 50.0),
    ];
    let mean = nanmean_c64(&values);
    assert_abs_diff_eq!(mean.re, 2.0);
    assert_abs_diff_eq!(mean.im, 30.0);

    let median = nanmedian_c64(&values);
    assert_abs_diff_eq!(median.re, 2.0);
    assert_abs_diff_eq!(median.im, 30.0);

    // |x - mean|^2 = 1 + 400, 1 + 0, 0 + 400.
    assert_abs_diff_eq!(nanstd_c64(&values), (802.0_f64 / 3.0).sqrt(), epsilon = 1e-12);

    assert!(is_nan_c64(nanmean_c64(&[c64::new(0.0, f64::NAN)])));
}

#[test]
fn test_iqr_std() {
    // Percentiles of 1..=9 with linear interpolation: 3 and 7.
    let values: Vec<f64> = (1..=9).map(f64::from).chain([f64::NAN]).collect();
    assert_abs_diff_eq!(iqr(&values), 4.0);
    assert_abs_diff_eq!(std_iqr(&values), 4.0 * IQR_CORRECTION);
    assert_abs_diff_eq!(percentile_sorted(&[1.0, 2.0], 50.0), 1.5);
}

#[test]
fn test_sigma_clipped_std_rejects_outliers() {
    let mut values: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    values.push(1000.0);
    let clipped = sigma_clipped_std(&values, 3.0);
    assert_abs_diff_eq!(clipped, 1.0, epsilon = 1e-12);
    assert!(nanstd(&values) > 90.0);

    // Clipping is about the median, not zero.
    let offset: Vec<f64> = values.iter().map(|v| v + 50.0).collect();
    assert_abs_diff_eq!(sigma_clipped_std(&offset, 3.0), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(sigma_clipped_std(&[4.0; 5], 3.0), 0.0);
}

#[test]
fn test_median_filter_zero_pads() {
    let values = [5.0, 5.0, 5.0, 5.0, 5.0];
    let filtered = median_filter(&values, 3);
    assert_eq!(filtered, vec![5.0, 5.0, 5.0, 5.0, 5.0]);

    let filtered = median_filter(&values, 5);
    // The edges see two zeros in a window of five.
    assert_eq!(filtered, vec![5.0, 5.0, 5.0, 5.0, 5.0]);
    let filtered = median_filter(&[1.0, 9.0, 2.0], 5);
    assert_eq!(filtered, vec![1.0, 1.0, 1.0]);
}

#[test]
fn test_median_filter_ignores_the_sign_of_nan() {
    let negative_nan = -f64::NAN;
    assert!(negative_nan.is_sign_negative());
    let filtered = median_filter(&[1.0, negative_nan, 2.0], 3);
    assert_eq!(filtered[1], 2.0);
    assert_eq!(filtered[1], median_filter(&[1.0, f64::NAN, 2.0], 3)[1]);

    // A NaN only wins when NaNs fill most of the window.
    let filtered = median_filter(&[negative_nan, negative_nan, 3.0], 3);
    assert!(filtered[1].is_nan());
    assert_eq!(filtered[2], 3.0);
}

#[test]
fn test_block_nanmean_crops() {
    let values = [1.0, 3.0, f64::NAN, 6.0, 100.0];
    assert_eq!(block_nanmean(&values, 2), vec![2.0, 6.0]);
}
