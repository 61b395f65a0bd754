use approx::assert_abs_diff_eq;
use hifitime::{Epoch, TimeUnits};
use ndarray::prelude::*;

use super::*;

/// 24 channels across 170-200 MHz.
fn freqs() -> Vec<f64> {
    (0..24).map(|c| 170e6 + c as f64 * 30e6 / 23.0).collect()
}

/// Q and U of a source with polarised fraction `p` at Faraday depth `rm`.
fn rotated(freqs: &[f64], p: f64, rm: f64) -> (Vec<f64>, Vec<f64>) {
    freqs
        .iter()
        .map(|f| {
            let lambda2 = (VEL_C / f).powi(2);
            let pol = c64::from_polar(p, 2.0 * rm * lambda2);
            (pol.re, pol.im)
        })
        .unzip()
}

#[test]
fn test_phi_axis() {
    let phi = phi_axis(-1000.0, 1001.0, 1.0).unwrap();
    assert_eq!(phi.len(), 2001);
    assert_abs_diff_eq!(phi[0], -1000.0);
    assert_abs_diff_eq!(phi[2000], 1000.0);

    assert!(matches!(
        phi_axis(0.0, 0.0, 1.0),
        Err(FaradayError::BadPhiRange { .. })
    ));
    assert!(matches!(
        phi_axis(0.0, 10.0, 0.0),
        Err(FaradayError::BadPhiRange { .. })
    ));
}

#[test]
fn test_rmsf_peaks_at_zero() {
    let (rmsf, phi) = get_rmsf(&freqs(), -2000.0, 2001.0, 1.0).unwrap();
    assert_eq!(rmsf.len(), 4001);
    let centre = phi.iter().position(|&p| p == 0.0).unwrap();
    assert_eq!(centre, 2000);
    assert_abs_diff_eq!(rmsf[centre].re, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(rmsf[centre].im, 0.0, epsilon = 1e-12);
    assert!(rmsf.iter().all(|v| v.norm() <= 1.0 + 1e-12));
}

#[test]
fn test_fdf_input_validation() {
    let freqs = freqs();
    assert!(matches!(
        get_fdf(&[1.0], &[0.0], &freqs, -10.0, 10.0, 1.0),
        Err(FaradayError::LengthMismatch { .. })
    ));
    assert!(matches!(
        get_fdf(&[], &[], &[], -10.0, 10.0, 1.0),
        Err(FaradayError::NoChannels)
    ));
    assert!(matches!(
        get_fdf(&[1.0], &[0.0], &[-5.0], -10.0, 10.0, 1.0),
        Err(FaradayError::BadFrequency(_))
    ));
}

#[test]
fn test_fdf_ignores_flagged_channels() {
    let freqs = freqs();
    let (mut q, mut u) = rotated(&freqs, 0.2, 50.0);
    let (clean, _) = get_fdf(&q, &u, &freqs, 40.0, 60.0, 1.0).unwrap();
    q[3] = f64::NAN;
    u[3] = f64::NAN;
    let (flagged, _) = get_fdf(&q, &u, &freqs, 40.0, 60.0, 1.0).unwrap();
    assert!(flagged.iter().all(|v| !v.re.is_nan()));
    // One of 24 channels is missing, so the peak drops by about 1/24.
    assert_abs_diff_eq!(flagged[10].norm(), 0.2 * 23.0 / 24.0, epsilon = 1e-3);
    assert_abs_diff_eq!(clean[10].norm(), 0.2, epsilon = 1e-12);
}

#[test]
fn test_rm_recovery() {
    let freqs = freqs();
    let (q, u) = rotated(&freqs, 0.2, 50.0);
    let params = RmSynthesisParams::default();
    let stop = params.stop_phi();
    let (mut fdf, phi) = get_fdf(&q, &u, &freqs, params.start_phi, stop, params.dphi).unwrap();
    let (rmsf, rmsf_phi) = get_rmsf(
        &freqs,
        2.0 * params.start_phi,
        2.0 * stop - params.dphi,
        params.dphi,
    )
    .unwrap();

    let search = find_peaks(&freqs, &mut fdf, &phi, &rmsf, &rmsf_phi, 6.0, 1).unwrap();
    assert_eq!(search.components.len(), 1);
    let component = search.components[0];
    assert!((component.phi - 50.0).abs() <= 1.0);
    assert_abs_diff_eq!(component.peak, 0.2, epsilon = 1e-9);
    assert!(component.peak / search.sigma > 6.0);

    // The restored FDF has the component's height at its depth.
    let pos = phi.iter().position(|&p| p == component.phi).unwrap();
    assert_abs_diff_eq!(fdf[pos].norm(), 0.2, epsilon = 1e-9);
}

#[test]
fn test_more_iterations_find_more_components() {
    let freqs = freqs();
    let (q1, u1) = rotated(&freqs, 0.2, 50.0);
    let (q2, u2) = rotated(&freqs, 0.1, -120.0);
    let q: Vec<f64> = q1.iter().zip(&q2).map(|(a, b)| a + b).collect();
    let u: Vec<f64> = u1.iter().zip(&u2).map(|(a, b)| a + b).collect();
    let (fdf, phi) = get_fdf(&q, &u, &freqs, -1000.0, 1001.0, 1.0).unwrap();
    let (rmsf, rmsf_phi) = get_rmsf(&freqs, -2000.0, 2001.0, 1.0).unwrap();

    let search = find_peaks(&freqs, &mut fdf.clone(), &phi, &rmsf, &rmsf_phi, 6.0, 1).unwrap();
    assert_eq!(search.components.len(), 1);
    assert_abs_diff_eq!(search.components[0].phi, 50.0);

    let search = find_peaks(&freqs, &mut fdf.clone(), &phi, &rmsf, &rmsf_phi, 6.0, 2).unwrap();
    assert_eq!(search.components.len(), 2);
    assert_abs_diff_eq!(search.components[0].phi, 50.0);
    assert_abs_diff_eq!(search.components[1].phi, -120.0);
}

#[test]
fn test_nothing_to_find() {
    let freqs = freqs();
    let zeros = vec![0.0; freqs.len()];
    let (mut fdf, phi) = get_fdf(&zeros, &zeros, &freqs, -100.0, 101.0, 1.0).unwrap();
    let (rmsf, rmsf_phi) = get_rmsf(&freqs, -200.0, 201.0, 1.0).unwrap();
    let search = find_peaks(&freqs, &mut fdf, &phi, &rmsf, &rmsf_phi, 6.0, 3).unwrap();
    assert!(search.components.is_empty());
    assert!(fdf.iter().all(|v| v.norm() == 0.0));
}

#[test]
fn test_short_rmsf_is_an_error() {
    let freqs = freqs();
    let (q, u) = rotated(&freqs, 0.2, 50.0);
    let (mut fdf, phi) = get_fdf(&q, &u, &freqs, -100.0, 101.0, 1.0).unwrap();
    let (rmsf, rmsf_phi) = get_rmsf(&freqs, -100.0, 101.0, 1.0).unwrap();
    assert!(matches!(
        find_peaks(&freqs, &mut fdf, &phi, &rmsf, &rmsf_phi, 6.0, 1),
        Err(FaradayError::RmsfTooShort { .. })
    ));
}

/// Three integrations of unit Stokes I; only the middle one is polarised.
fn three_integrations(freqs: &[f64]) -> StokesCube {
    let num_ints = 3;
    let (q, u) = rotated(freqs, 0.2, 50.0);
    let mut stokes = StokesCube {
        i: Array2::ones((num_ints, freqs.len())),
        q: Array2::zeros((num_ints, freqs.len())),
        u: Array2::zeros((num_ints, freqs.len())),
        v: Array2::zeros((num_ints, freqs.len())),
        freqs: freqs.to_vec(),
        timestamps: (0..num_ints)
            .map(|t| Epoch::from_gpst_seconds(1.3e9) + (t as i64).seconds())
            .collect(),
    };
    stokes.q.row_mut(1).assign(&Array1::from(q));
    stokes.u.row_mut(1).assign(&Array1::from(u));
    stokes
}

#[test]
fn test_find_fdf_peaks_per_integration() {
    let freqs = freqs();
    let stokes = three_integrations(&freqs);

    let params = RmSynthesisParams {
        start_phi: -300.0,
        ..Default::default()
    };
    let detections = find_fdf_peaks(&stokes, &params).unwrap();
    assert_eq!(detections.len(), 1);
    let d = detections[0];
    assert_eq!(d.time_index, 1);
    assert_abs_diff_eq!(d.phi, 50.0);
    assert_abs_diff_eq!(d.polarised_intensity, 0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(d.fractional_pol, 0.2, epsilon = 1e-9);
    assert!(d.snr > params.min_snr);
    let fwhm = rmsf_fwhm(&freqs).unwrap();
    assert_abs_diff_eq!(d.phi_err, fwhm / (2.0 * d.snr));

    let rmsf = Rmsf::new(&freqs, &params).unwrap();
    assert!(matches!(
        integration_fdf(&stokes, 3, &params, &rmsf),
        Err(FaradayError::BadIntegration { .. })
    ));
}

#[test]
fn test_one_rmsf_serves_every_integration() {
    let freqs = freqs();
    let params = RmSynthesisParams {
        start_phi: -300.0,
        ..Default::default()
    };
    let rmsf = Rmsf::new(&freqs, &params).unwrap();
    let (expected, expected_phi) = get_rmsf(&freqs, -600.0, 601.0, 1.0).unwrap();
    assert_eq!(rmsf.phi, expected_phi);
    assert_eq!(rmsf.rmsf, expected);
    assert_abs_diff_eq!(rmsf.fwhm, rmsf_fwhm(&freqs).unwrap());

    let stokes = three_integrations(&freqs);
    let shared: Vec<Option<PeakDetection>> = (0..stokes.num_integrations())
        .map(|t| integration_fdf(&stokes, t, &params, &rmsf).unwrap().detection(t))
        .collect();
    assert!(shared[0].is_none());
    assert!(shared[2].is_none());
    let from_driver = find_fdf_peaks(&stokes, &params).unwrap();
    assert_eq!(from_driver.len(), 1);
    let d = shared[1].unwrap();
    assert_eq!(d.phi, from_driver[0].phi);
    assert_eq!(d.polarised_intensity, from_driver[0].polarised_intensity);
    assert_eq!(d.snr, from_driver[0].snr);
}
