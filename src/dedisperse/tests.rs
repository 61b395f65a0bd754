use approx::assert_abs_diff_eq;
use hifitime::{Epoch, TimeUnits};

use super::*;

const NUM_INTS: usize = 64;
const TINT: f64 = 0.01;
const PULSE_CENTRE: f64 = 32.0;
const PULSE_WIDTH: f64 = 2.0;

fn freqs() -> Vec<f64> {
    (0..8).map(|c| 150e6 + c as f64 * 4e6).collect()
}

fn pulse(t: f64, centre: f64) -> f64 {
    (-(t - centre).powi(2) / (2.0 * PULSE_WIDTH * PULSE_WIDTH)).exp()
}

/// A noiseless pulse, already dispersed by `dm`, in every polarisation.
fn dispersed_pulse(dm: f64) -> DynamicSpectrum {
    let freqs = freqs();
    let timestamps = (0..NUM_INTS)
        .map(|t| Epoch::from_gpst_seconds(1e9) + ((10 * t) as i64).milliseconds())
        .collect();
    let pols = ["XX", "XY", "YX", "YY"].iter().map(|s| s.to_string()).collect();
    let delays = dispersion_delays_ms(&freqs, dm).unwrap();
    let mut ds = DynamicSpectrum::new_flagged(freqs, timestamps, pols);
    for ((t, c, p), v) in ds.mean.indexed_iter_mut() {
        // Lower frequencies arrive later.
        let centre = PULSE_CENTRE - delays[c] / (TINT * 1000.0);
        *v = c64::new(pulse(t as f64, centre), 0.5 * p as f64 * pulse(t as f64, centre));
    }
    ds.median.assign(&ds.mean);
    ds.std.assign(&ds.mean.mapv(|v| v.re));
    ds
}

#[test]
fn test_delays() {
    let delays = dispersion_delays_ms(&[1e9, 2e9], 10.0).unwrap();
    assert_abs_diff_eq!(delays[1], 0.0);
    assert_abs_diff_eq!(delays[0], 4.149 * 10.0 * (0.25 - 1.0), epsilon = 1e-12);
    assert!(matches!(
        dispersion_delays_ms(&[], 10.0),
        Err(DedisperseError::NoChannels)
    ));
    assert!(matches!(
        dispersion_delays_ms(&[1e9, 0.0], 10.0),
        Err(DedisperseError::BadFrequency(_))
    ));
}

#[test]
fn test_zero_dm_is_identity() {
    let mut ds = dispersed_pulse(3.0);
    ds.mean[(3, 2, 1)] = c64::new(f64::NAN, f64::NAN);
    let original = ds.clone();
    dedisperse(&mut ds, 0.0).unwrap();
    for (a, b) in ds.mean.iter().zip(original.mean.iter()) {
        if b.re.is_nan() {
            assert!(a.re.is_nan());
        } else {
            assert_eq!(a, b);
        }
    }
    assert_eq!(ds.std, original.std);
}

#[test]
fn test_dedispersion_aligns_a_dispersed_pulse() {
    let dm = 1.0;
    let mut ds = dispersed_pulse(dm);
    // The lowest channel really is delayed by several samples.
    let peak = |ds: &DynamicSpectrum, c: usize| {
        (0..NUM_INTS)
            .max_by(|&a, &b| ds.mean[(a, c, 0)].re.total_cmp(&ds.mean[(b, c, 0)].re))
            .unwrap()
    };
    assert!(peak(&ds, 0) > PULSE_CENTRE as usize + 3);

    dedisperse(&mut ds, dm).unwrap();
    for c in 0..ds.num_channels() {
        assert_eq!(peak(&ds, c), PULSE_CENTRE as usize);
        for t in 0..NUM_INTS {
            let expected = pulse(t as f64, PULSE_CENTRE);
            assert_abs_diff_eq!(ds.mean[(t, c, 0)].re, expected, epsilon = 1e-5);
            assert_abs_diff_eq!(ds.mean[(t, c, 2)].im, expected, epsilon = 1e-5);
            assert_abs_diff_eq!(ds.std[(t, c, 3)], expected, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_round_trip() {
    let original = dispersed_pulse(2.5);
    let mut ds = original.clone();
    dedisperse(&mut ds, 2.5).unwrap();
    dedisperse(&mut ds, -2.5).unwrap();
    for (a, b) in ds.mean.iter().zip(original.mean.iter()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-6);
        assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-6);
    }
    for (a, b) in ds.median.iter().zip(original.median.iter()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-6);
    }
}

#[test]
fn test_flagged_samples_become_zero() {
    let mut ds = dispersed_pulse(1.0);
    let top = ds.num_channels() - 1;
    ds.mean[(5, top, 0)] = c64::new(f64::NAN, f64::NAN);
    dedisperse(&mut ds, 1.0).unwrap();
    // The top channel isn't shifted, but its NaNs are still zeroed.
    assert_eq!(ds.mean[(5, top, 0)], c64::new(0.0, 0.0));
    assert!(ds.mean.iter().all(|v| !v.re.is_nan()));
}

#[test]
fn test_single_integration_is_an_error() {
    let mut ds = DynamicSpectrum::new_flagged(
        freqs(),
        vec![Epoch::from_gpst_seconds(1e9)],
        vec!["XX".into()],
    );
    assert!(matches!(
        dedisperse(&mut ds, 1.0),
        Err(DedisperseError::TooFewIntegrations)
    ));
}

#[test]
fn test_stokes_dedispersion() {
    let dm = 1.0;
    let ds = dispersed_pulse(dm);
    let mut cube =
        StokesCube::from_dynamic_spectrum(&ds, crate::stokes::PolarizationConvention::Linear)
            .unwrap();
    dedisperse_stokes(&mut cube, dm).unwrap();
    for c in 0..cube.num_channels() {
        assert_abs_diff_eq!(
            cube.i[(PULSE_CENTRE as usize, c)],
            0.5 * (1.0 + 1.0),
            epsilon = 1e-5
        );
    }
}
