//! Nonlinear fit of a circular tuning model to one distribution.
//!
//! The model is a simplified von Mises lobe over the half circle,
//! `f(x) = a·exp(k·(cos 2(x − t) − 1))`, with the distribution's axis
//! mapped onto `[0, π)`. The bimodal variant fits the sum of two lobes.
//! Everything that can go wrong is reported as a classification on the
//! outcome rather than an error: callers always get a result, possibly the
//! null one.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::distribution::Distribution;
use crate::core::levmar::{least_squares, LevMarError, LevMarOptions};
use crate::core::stats::FitResult;
use crate::core::util::std_dev;

use std::f64::consts::PI;

/// Minimum populated bins for a meaningful unimodal fit.
const MIN_BINS_UNIMODAL: usize = 5;
/// Minimum populated bins for a meaningful two-lobe fit.
const MIN_BINS_BIMODAL: usize = 9;

/// Relative amplitude of the jitter mixed into the target values so the
/// optimizer never starts on an exactly flat gradient.
const JITTER_FRACTION: f64 = 1e-5;

/// Saturating bandwidth as a function of bin count, `k_sat = A·n^B`.
/// The constants come from an offline power-law fit of the bandwidth
/// recovered from a one-bin impulse at each sampling density, so that an
/// impulse maps to selectivity ~1 no matter how many bins were sampled.
const SATURATION_SCALE: f64 = 0.1097;
const SATURATION_EXPONENT: f64 = 2.31;

/// Why a fit produced the null result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitFailure {
    /// Too few populated bins to constrain the model.
    InsufficientData,
    /// The values have no structure above the noise floor.
    FlatDistribution,
    /// The optimizer ran out of iterations or downhill steps.
    DidNotConverge,
    /// No usable residual covariance at the solution.
    DegenerateFit,
    /// Negative fitted bandwidth: the data describe a dip, not a peak.
    NonConcave,
    /// Converged, but the center variance exceeds `worst_fit`.
    PoorFit,
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FitFailure::InsufficientData => "insufficient data",
            FitFailure::FlatDistribution => "flat distribution",
            FitFailure::DidNotConverge => "did not converge",
            FitFailure::DegenerateFit => "degenerate fit",
            FitFailure::NonConcave => "non-concave fit",
            FitFailure::PoorFit => "fit quality below threshold",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VonMisesSettings {
    /// Upper bound on the fitted-center variance for a fit to be trusted.
    pub worst_fit: f64,
    /// Standard deviation below which the distribution counts as flat.
    pub noise_floor: f64,
    /// Seed for the start-jitter generator, kept fixed for reproducibility.
    pub jitter_seed: u64,
    /// Iteration cap handed to the optimizer.
    pub max_iter: usize,
}

impl Default for VonMisesSettings {
    fn default() -> Self {
        Self {
            worst_fit: 0.1,
            noise_floor: 1e-7,
            jitter_seed: 7,
            max_iter: 200,
        }
    }
}

/// A fit result plus why it is null, when it is.
#[derive(Debug, Clone, PartialEq)]
pub struct VonMisesOutcome {
    pub result: FitResult,
    pub failure: Option<FitFailure>,
}

impl VonMisesOutcome {
    fn failed(failure: FitFailure) -> Self {
        Self {
            result: FitResult::null_fit(),
            failure: Some(failure),
        }
    }
}

/// Primary and secondary lobes of a two-lobe fit, with the degradation
/// already applied: `primary.modes` is 2 when both lobes are trusted, 1
/// when only the unimodal fit survived, 0 when nothing did.
#[derive(Debug, Clone, PartialEq)]
pub struct BimodalOutcome {
    pub primary: FitResult,
    pub secondary: FitResult,
    pub failure: Option<FitFailure>,
}

fn von_mises(a: f64, k: f64, t: f64, x: f64) -> f64 {
    a * (k * ((2.0 * (x - t)).cos() - 1.0)).exp()
}

/// Axis positions mapped onto the half circle, paired with the values.
fn half_circle_points(d: &Distribution) -> (Vec<f64>, Vec<f64>) {
    let (lo, _) = d.axis_bounds();
    let range = d.axis_range();
    let xs = d.bins().map(|b| PI * (b - lo) / range).collect();
    let ys = d.values().collect();
    (xs, ys)
}

fn jitter(ys: &mut [f64], seed: u64) {
    let peak = ys.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let amp = JITTER_FRACTION * peak.max(f64::MIN_POSITIVE);
    let mut rng = StdRng::seed_from_u64(seed);
    for y in ys {
        *y += rng.random_range(-1.0..1.0) * amp;
    }
}

fn argmax(xs: &[f64], ys: &[f64]) -> f64 {
    let mut best = 0;
    for i in 1..ys.len() {
        if ys[i] > ys[best] {
            best = i;
        }
    }
    xs[best]
}

/// Log-compressed, bin-count-normalized transform of the fitted bandwidth.
fn bandwidth_selectivity(k: f64, n_bins: usize) -> f64 {
    let k_sat = SATURATION_SCALE * (n_bins as f64).powf(SATURATION_EXPONENT);
    ((1.0 + k).ln() / (1.0 + k_sat).ln()).clamp(0.0, 1.0)
}

/// Map a fitted center back into the distribution's axis units.
fn center_to_axis(t: f64, d: &Distribution) -> f64 {
    let (lo, _) = d.axis_bounds();
    lo + t.rem_euclid(PI) / PI * d.axis_range()
}

fn lm_options(settings: &VonMisesSettings) -> LevMarOptions {
    LevMarOptions {
        max_iter: settings.max_iter,
        ..LevMarOptions::default()
    }
}

/// Fit one lobe. The result is null, with a classification, for every
/// precondition or optimizer failure.
pub fn fit_unimodal(d: &Distribution, settings: &VonMisesSettings) -> VonMisesOutcome {
    let (xs, mut ys) = half_circle_points(d);
    let n = xs.len();
    if n < MIN_BINS_UNIMODAL {
        return VonMisesOutcome::failed(FitFailure::InsufficientData);
    }
    if std_dev(&ys) < settings.noise_floor {
        return VonMisesOutcome::failed(FitFailure::FlatDistribution);
    }
    jitter(&mut ys, settings.jitter_seed);

    let t0 = argmax(&xs, &ys);
    let p0 = DVector::from_vec(vec![1.0, 1.0, t0]);

    let residuals = |p: &DVector<f64>| {
        DVector::from_iterator(n, xs.iter().zip(&ys).map(|(&x, &y)| von_mises(p[0], p[1], p[2], x) - y))
    };
    let jacobian = |p: &DVector<f64>| {
        DMatrix::from_fn(n, 3, |i, j| {
            let x = xs[i];
            let c = (2.0 * (x - p[2])).cos() - 1.0;
            let g = (p[1] * c).exp();
            match j {
                0 => g,
                1 => p[0] * c * g,
                _ => 2.0 * p[0] * p[1] * (2.0 * (x - p[2])).sin() * g,
            }
        })
    };

    let fit = match least_squares(p0, residuals, jacobian, &lm_options(settings)) {
        Ok(fit) => fit,
        Err(LevMarError::DidNotConverge) => {
            return VonMisesOutcome::failed(FitFailure::DidNotConverge)
        }
    };

    let cov = match fit.covariance {
        Some(cov) if cov[(2, 2)].is_finite() => cov,
        _ => return VonMisesOutcome::failed(FitFailure::DegenerateFit),
    };
    let k = fit.params[1];
    if k < 0.0 {
        return VonMisesOutcome::failed(FitFailure::NonConcave);
    }
    let goodness = cov[(2, 2)];
    if goodness > settings.worst_fit {
        return VonMisesOutcome::failed(FitFailure::PoorFit);
    }

    VonMisesOutcome {
        result: FitResult {
            preference: center_to_axis(fit.params[2], d),
            selectivity: bandwidth_selectivity(k, n),
            goodness_of_fit: Some(goodness),
            modes: None,
        },
        failure: None,
    }
}

fn fit_two_lobes(
    d: &Distribution,
    settings: &VonMisesSettings,
) -> Result<(FitResult, FitResult), FitFailure> {
    let (xs, mut ys) = half_circle_points(d);
    let n = xs.len();
    if n < MIN_BINS_BIMODAL {
        return Err(FitFailure::InsufficientData);
    }
    if std_dev(&ys) < settings.noise_floor {
        return Err(FitFailure::FlatDistribution);
    }
    jitter(&mut ys, settings.jitter_seed);

    let t0 = argmax(&xs, &ys);
    let p0 = DVector::from_vec(vec![1.0, 1.0, t0, 1.0, 1.0, t0 + PI / 2.0]);

    let residuals = |p: &DVector<f64>| {
        DVector::from_iterator(
            n,
            xs.iter()
                .zip(&ys)
                .map(|(&x, &y)| von_mises(p[0], p[1], p[2], x) + von_mises(p[3], p[4], p[5], x) - y),
        )
    };
    let jacobian = |p: &DVector<f64>| {
        DMatrix::from_fn(n, 6, |i, j| {
            let x = xs[i];
            let lobe = j / 3;
            let (a, k, t) = (p[lobe * 3], p[lobe * 3 + 1], p[lobe * 3 + 2]);
            let c = (2.0 * (x - t)).cos() - 1.0;
            let g = (k * c).exp();
            match j % 3 {
                0 => g,
                1 => a * c * g,
                _ => 2.0 * a * k * (2.0 * (x - t)).sin() * g,
            }
        })
    };

    let fit = match least_squares(p0, residuals, jacobian, &lm_options(settings)) {
        Ok(fit) => fit,
        Err(LevMarError::DidNotConverge) => return Err(FitFailure::DidNotConverge),
    };

    let cov = match fit.covariance {
        Some(cov) if cov[(2, 2)].is_finite() && cov[(5, 5)].is_finite() => cov,
        _ => return Err(FitFailure::DegenerateFit),
    };
    if fit.params[1] < 0.0 || fit.params[4] < 0.0 {
        return Err(FitFailure::NonConcave);
    }

    // The stronger lobe is the primary mode.
    let (first, second) = if fit.params[0] >= fit.params[3] { (0, 3) } else { (3, 0) };
    let lobe = |base: usize| FitResult {
        preference: center_to_axis(fit.params[base + 2], d),
        selectivity: bandwidth_selectivity(fit.params[base + 1], n),
        goodness_of_fit: Some(cov[(base + 2, base + 2)]),
        modes: None,
    };
    Ok((lobe(first), lobe(second)))
}

/// Fit both the unimodal and the two-lobe model, keeping the two-lobe
/// result only when it passes `worst_fit` and its primary center is
/// estimated at least as tightly as the unimodal one. Otherwise degrade to
/// the unimodal result (`modes` = 1) or to the null result (`modes` = 0).
pub fn fit_bimodal(d: &Distribution, settings: &VonMisesSettings) -> BimodalOutcome {
    let uni = fit_unimodal(d, settings);
    let uni_goodness = if uni.failure.is_none() {
        uni.result.goodness_of_fit.unwrap_or(f64::INFINITY)
    } else {
        f64::INFINITY
    };

    if let Ok((primary, secondary)) = fit_two_lobes(d, settings) {
        let goodness = primary.goodness_of_fit.unwrap_or(f64::INFINITY);
        if goodness <= settings.worst_fit && goodness <= uni_goodness {
            return BimodalOutcome {
                primary: FitResult {
                    modes: Some(2),
                    ..primary
                },
                secondary,
                failure: None,
            };
        }
    }

    if uni.failure.is_none() {
        BimodalOutcome {
            primary: FitResult {
                modes: Some(1),
                ..uni.result
            },
            secondary: FitResult::null_fit(),
            failure: None,
        }
    } else {
        BimodalOutcome {
            primary: FitResult {
                modes: Some(0),
                ..FitResult::null_fit()
            },
            secondary: FitResult::null_fit(),
            failure: uni.failure,
        }
    }
}
