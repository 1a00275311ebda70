//! The interchangeable statistic reducers and their result type.
//!
//! Each reducer maps one `Distribution` to a mode-keyed set of
//! `FitResult`s; the default mode key is the empty string and bimodal
//! reducers add a `"Mode2"` entry. Reducers are selected per feature or
//! per sweep, and every reported preference and selectivity passes through
//! a caller-supplied (offset, multiplier) rescaling on the way out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::distribution::Distribution;
use crate::core::vonmises::{self, VonMisesSettings};

/// Mode key of the primary result.
pub const PRIMARY_MODE: &str = "";
/// Mode key added by the bimodal reducers.
pub const SECOND_MODE: &str = "Mode2";

/// The scalar summary of one unit's response distribution for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Stimulus value the unit responded to most strongly, in the
    /// feature's (rescaled) domain.
    pub preference: f64,
    /// Sharpness of the tuning around the preference.
    pub selectivity: f64,
    /// Estimated variance of the fitted preference; only reducers that fit
    /// a model report one.
    pub goodness_of_fit: Option<f64>,
    /// Number of trusted modes, reported by the bimodal fit scheduler.
    pub modes: Option<u32>,
}

impl FitResult {
    /// The null result of a reducer that does not fit a model.
    pub fn null() -> Self {
        Self {
            preference: 0.0,
            selectivity: 0.0,
            goodness_of_fit: None,
            modes: None,
        }
    }

    /// The null result of a failed fit.
    pub fn null_fit() -> Self {
        Self {
            goodness_of_fit: Some(0.0),
            ..Self::null()
        }
    }

    fn rescaled(self, value_scale: Scale, selectivity_scale: Scale) -> Self {
        Self {
            preference: value_scale.apply(self.preference),
            selectivity: selectivity_scale.apply(self.selectivity),
            ..self
        }
    }
}

/// Affine rescaling applied to reported statistics, as
/// `(x + offset) * multiplier`. Lets callers remap results into arbitrary
/// display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub offset: f64,
    pub multiplier: f64,
}

impl Scale {
    pub fn new(offset: f64, multiplier: f64) -> Self {
        Self { offset, multiplier }
    }

    pub fn apply(&self, x: f64) -> f64 {
        (x + self.offset) * self.multiplier
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            offset: 0.0,
            multiplier: 1.0,
        }
    }
}

/// The closed family of distribution reducers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatisticReducer {
    /// Preference = bin with the largest value.
    MaxValue,
    /// Preference = circular mean (cyclic) or value-weighted mean bin.
    WeightedAverage,
    /// MaxValue plus a second mode at the second-largest bin, whether or
    /// not it is a true peak (the historical variant).
    BimodalPeaks,
    /// MaxValue plus a second mode at a genuine second local maximum; a
    /// unimodal lobe forces the second mode's selectivity to 0.
    TwoPeaks,
    /// Nonlinear circular fit of a single von Mises lobe.
    VonMises(VonMisesSettings),
    /// Von Mises fit of one and two lobes with degradation to the better.
    VonMisesTwoPeaks(VonMisesSettings),
}

impl Default for StatisticReducer {
    fn default() -> Self {
        StatisticReducer::WeightedAverage
    }
}

impl StatisticReducer {
    /// Reduce one distribution to its per-mode results.
    ///
    /// The returned key set depends only on the reducer, never on the
    /// data, so results can be assembled into per-mode grids.
    pub fn reduce(
        &self,
        d: &Distribution,
        value_scale: Scale,
        selectivity_scale: Scale,
    ) -> BTreeMap<String, FitResult> {
        let mut out = BTreeMap::new();
        match self {
            StatisticReducer::MaxValue => {
                out.insert(PRIMARY_MODE.to_owned(), Self::peak(d).rescaled(value_scale, selectivity_scale));
            }
            StatisticReducer::WeightedAverage => {
                let result = if d.is_empty() {
                    FitResult::null()
                } else {
                    FitResult {
                        preference: d.weighted_average(),
                        selectivity: d.selectivity(),
                        goodness_of_fit: None,
                        modes: None,
                    }
                };
                out.insert(PRIMARY_MODE.to_owned(), result.rescaled(value_scale, selectivity_scale));
            }
            StatisticReducer::BimodalPeaks => {
                out.insert(PRIMARY_MODE.to_owned(), Self::peak(d).rescaled(value_scale, selectivity_scale));
                let second = match d.second_max_value_bin() {
                    Some(bin) => FitResult {
                        preference: bin,
                        selectivity: d.second_selectivity(),
                        goodness_of_fit: None,
                        modes: None,
                    },
                    None => FitResult::null(),
                };
                out.insert(SECOND_MODE.to_owned(), second.rescaled(value_scale, selectivity_scale));
            }
            StatisticReducer::TwoPeaks => {
                out.insert(PRIMARY_MODE.to_owned(), Self::peak(d).rescaled(value_scale, selectivity_scale));
                let second = match d.second_peak_bin() {
                    Some(bin) => FitResult {
                        preference: bin,
                        selectivity: d.second_peak_selectivity(),
                        goodness_of_fit: None,
                        modes: None,
                    },
                    None => FitResult::null(),
                };
                out.insert(SECOND_MODE.to_owned(), second.rescaled(value_scale, selectivity_scale));
            }
            StatisticReducer::VonMises(settings) => {
                let outcome = vonmises::fit_unimodal(d, settings);
                out.insert(
                    PRIMARY_MODE.to_owned(),
                    outcome.result.rescaled(value_scale, selectivity_scale),
                );
            }
            StatisticReducer::VonMisesTwoPeaks(settings) => {
                let outcome = vonmises::fit_bimodal(d, settings);
                out.insert(
                    PRIMARY_MODE.to_owned(),
                    outcome.primary.rescaled(value_scale, selectivity_scale),
                );
                out.insert(
                    SECOND_MODE.to_owned(),
                    outcome.secondary.rescaled(value_scale, selectivity_scale),
                );
            }
        }
        out
    }

    /// Whether this reducer reports a goodness-of-fit estimate.
    pub fn fits_model(&self) -> bool {
        matches!(
            self,
            StatisticReducer::VonMises(_) | StatisticReducer::VonMisesTwoPeaks(_)
        )
    }

    fn peak(d: &Distribution) -> FitResult {
        match d.max_value_bin() {
            Some(bin) => FitResult {
                preference: bin,
                selectivity: d.selectivity(),
                goodness_of_fit: None,
                modes: None,
            },
            None => FitResult::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple() -> Distribution {
        let mut d = Distribution::new((0.0, 1.0), false, false);
        d.add(0.2, 0.3).unwrap();
        d.add(0.4, 1.0).unwrap();
        d.add(0.6, 0.5).unwrap();
        d
    }

    #[test]
    fn max_value_reports_the_peak_bin() {
        let maps = StatisticReducer::MaxValue.reduce(&simple(), Scale::default(), Scale::default());
        assert_eq!(maps[PRIMARY_MODE].preference, 0.4);
    }

    #[test]
    fn rescaling_applies_offset_then_multiplier() {
        let maps = StatisticReducer::MaxValue.reduce(
            &simple(),
            Scale::new(0.1, 2.0),
            Scale::new(0.0, 17.0),
        );
        assert!((maps[PRIMARY_MODE].preference - 1.0).abs() < 1e-12);
        let raw = simple().selectivity();
        assert!((maps[PRIMARY_MODE].selectivity - raw * 17.0).abs() < 1e-12);
    }

    #[test]
    fn bimodal_reducers_always_report_both_modes() {
        let maps = StatisticReducer::BimodalPeaks.reduce(&simple(), Scale::default(), Scale::default());
        assert!(maps.contains_key(PRIMARY_MODE));
        assert!(maps.contains_key(SECOND_MODE));
        let maps = StatisticReducer::TwoPeaks.reduce(&simple(), Scale::default(), Scale::default());
        assert_eq!(maps.len(), 2);
    }

    #[test]
    fn empty_distribution_reduces_to_null() {
        let d = Distribution::new((0.0, 1.0), true, false);
        let maps = StatisticReducer::WeightedAverage.reduce(&d, Scale::default(), Scale::default());
        assert_eq!(maps[PRIMARY_MODE].preference, 0.0);
        assert_eq!(maps[PRIMARY_MODE].selectivity, 0.0);
    }
}
