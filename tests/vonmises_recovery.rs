use std::f64::consts::PI;

use tunemap::core::distribution::Distribution;
use tunemap::core::stats::{Scale, StatisticReducer, PRIMARY_MODE, SECOND_MODE};
use tunemap::core::vonmises::{fit_bimodal, fit_unimodal, FitFailure, VonMisesSettings};

fn von_mises(a: f64, k: f64, t: f64, x: f64) -> f64 {
    a * (k * ((2.0 * (x - t)).cos() - 1.0)).exp()
}

fn sampled(n: usize, lobes: &[(f64, f64, f64)]) -> Distribution {
    let mut d = Distribution::new((0.0, PI), true, false);
    for i in 0..n {
        let x = PI * i as f64 / n as f64;
        let y: f64 = lobes.iter().map(|&(a, k, t)| von_mises(a, k, t, x)).sum();
        d.add(x, y).unwrap();
    }
    d
}

#[test]
fn recovers_the_center_of_clean_synthetic_tuning() {
    let d = sampled(16, &[(1.0, 2.0, 0.7)]);
    let settings = VonMisesSettings::default();
    let out = fit_unimodal(&d, &settings);
    assert!(out.failure.is_none(), "failure: {:?}", out.failure);
    assert!(
        (out.result.preference - 0.7).abs() < 1e-2,
        "preference {}",
        out.result.preference
    );
    let goodness = out.result.goodness_of_fit.unwrap();
    assert!(goodness < settings.worst_fit, "goodness {goodness}");
}

#[test]
fn preference_is_reported_in_the_axis_units() {
    // Same tuning sampled on a degree axis: the center comes back in
    // degrees.
    let mut d = Distribution::new((0.0, 180.0), true, false);
    for i in 0..16 {
        let deg = 180.0 * i as f64 / 16.0;
        let x = PI * deg / 180.0;
        d.add(deg, von_mises(1.0, 2.0, 0.7, x)).unwrap();
    }
    let out = fit_unimodal(&d, &VonMisesSettings::default());
    assert!(out.failure.is_none());
    let expected = 0.7 / PI * 180.0;
    assert!((out.result.preference - expected).abs() < 1.0);
}

#[test]
fn too_few_bins_fails_fast() {
    let d = sampled(4, &[(1.0, 2.0, 0.7)]);
    let out = fit_unimodal(&d, &VonMisesSettings::default());
    assert_eq!(out.failure, Some(FitFailure::InsufficientData));
    assert_eq!(out.result.preference, 0.0);
    assert_eq!(out.result.selectivity, 0.0);
    assert_eq!(out.result.goodness_of_fit, Some(0.0));
}

#[test]
fn a_flat_distribution_fails_fast() {
    let mut d = Distribution::new((0.0, PI), true, false);
    for i in 0..16 {
        d.add(PI * i as f64 / 16.0, 0.25).unwrap();
    }
    let out = fit_unimodal(&d, &VonMisesSettings::default());
    assert_eq!(out.failure, Some(FitFailure::FlatDistribution));
}

#[test]
fn an_anti_tuned_valley_is_not_reported_as_a_peak() {
    // Responses dip around 0.7 instead of peaking there.
    let mut d = Distribution::new((0.0, PI), true, false);
    for i in 0..16 {
        let x = PI * i as f64 / 16.0;
        d.add(x, 1.0 - von_mises(1.0, 2.0, 0.7, x)).unwrap();
    }
    let out = fit_unimodal(&d, &VonMisesSettings::default());
    assert!(out.failure.is_some());
    assert_eq!(out.result.preference, 0.0);
    assert_eq!(out.result.selectivity, 0.0);
}

#[test]
fn worst_fit_threshold_rejects_marginal_fits() {
    let d = sampled(16, &[(1.0, 2.0, 0.7)]);
    let strict = VonMisesSettings {
        worst_fit: 0.0,
        ..VonMisesSettings::default()
    };
    let out = fit_unimodal(&d, &strict);
    assert_eq!(out.failure, Some(FitFailure::PoorFit));
    assert_eq!(out.result.selectivity, 0.0);
}

#[test]
fn two_clean_lobes_come_back_as_two_modes() {
    let d = sampled(16, &[(1.0, 3.0, 0.5), (0.7, 3.0, 0.5 + PI / 2.0)]);
    let out = fit_bimodal(&d, &VonMisesSettings::default());
    assert_eq!(out.primary.modes, Some(2));
    assert!((out.primary.preference - 0.5).abs() < 0.05, "primary {}", out.primary.preference);
    let second = out.secondary.preference;
    assert!((second - (0.5 + PI / 2.0)).abs() < 0.05, "secondary {second}");
}

#[test]
fn bimodal_fit_degrades_by_bin_count() {
    // Enough bins for the unimodal fit but not the bimodal one.
    let d = sampled(7, &[(1.0, 2.0, 0.7)]);
    let out = fit_bimodal(&d, &VonMisesSettings::default());
    assert_eq!(out.primary.modes, Some(1));
    assert!((out.primary.preference - 0.7).abs() < 5e-2);
    assert_eq!(out.secondary, tunemap::core::stats::FitResult::null_fit());

    // Not enough bins for either.
    let d = sampled(3, &[(1.0, 2.0, 0.7)]);
    let out = fit_bimodal(&d, &VonMisesSettings::default());
    assert_eq!(out.primary.modes, Some(0));
    assert_eq!(out.primary.preference, 0.0);
    assert_eq!(out.failure, Some(FitFailure::InsufficientData));
}

#[test]
fn the_reducer_applies_caller_rescaling_to_fit_results() {
    let d = sampled(16, &[(1.0, 2.0, 0.7)]);
    let reducer = StatisticReducer::VonMises(VonMisesSettings::default());
    let plain = reducer.reduce(&d, Scale::default(), Scale::default());
    let scaled = reducer.reduce(&d, Scale::new(0.0, 2.0), Scale::new(0.0, 17.0));
    let p = plain[PRIMARY_MODE];
    let s = scaled[PRIMARY_MODE];
    assert!((s.preference - 2.0 * p.preference).abs() < 1e-9);
    assert!((s.selectivity - 17.0 * p.selectivity).abs() < 1e-9);
}

#[test]
fn bimodal_reducer_always_reports_both_mode_keys() {
    let d = sampled(16, &[(1.0, 2.0, 0.7)]);
    let reducer = StatisticReducer::VonMisesTwoPeaks(VonMisesSettings::default());
    let maps = reducer.reduce(&d, Scale::default(), Scale::default());
    assert!(maps.contains_key(PRIMARY_MODE));
    assert!(maps.contains_key(SECOND_MODE));
}
