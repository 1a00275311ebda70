//! Feature-map measurement: reduce collected distributions into named
//! preference/selectivity grids per source.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::core::stats::{Scale, StatisticReducer};
use crate::core::util::capitalize;
use crate::sweep::collector::{ResponseCollector, SweepSession};
use crate::sweep::stimulus::Presenter;
use crate::sweep::SweepError;

/// One computed map and, for cyclic features' preference maps, the range
/// the values wrap in.
#[derive(Clone, Debug)]
pub struct FeatureMap {
    pub data: Array2<f64>,
    pub cyclic_range: Option<f64>,
}

/// Maps keyed by computed name, per source.
pub type MapCollection = BTreeMap<String, BTreeMap<String, FeatureMap>>;

/// Map-style reduction of a sweep.
pub struct FeatureMaps {
    /// Reducer used for features without a per-feature override.
    pub preference_fn: StatisticReducer,
    /// Scaling of selectivity values in all feature dimensions. The
    /// default of 17 is arbitrary, set to match historical usage.
    pub selectivity_multiplier: Option<f64>,
    /// Prefix added to every computed map name.
    pub prefix: String,
}

impl Default for FeatureMaps {
    fn default() -> Self {
        Self {
            preference_fn: StatisticReducer::WeightedAverage,
            selectivity_multiplier: Some(17.0),
            prefix: String::new(),
        }
    }
}

impl FeatureMaps {
    /// Run the sweep, then reduce.
    pub fn measure(
        &self,
        presenter: &mut dyn Presenter,
        session: &mut SweepSession,
        collector: &mut ResponseCollector,
    ) -> Result<MapCollection, SweepError> {
        collector.run(presenter, session)?;
        Ok(self.reduce(collector))
    }

    /// Reduce whatever the collector holds into named maps. Usable after
    /// an interrupted sweep as well; the maps then reflect the
    /// permutations that completed.
    pub fn reduce(&self, collector: &ResponseCollector) -> MapCollection {
        let selectivity_scale = Scale::new(0.0, self.selectivity_multiplier.unwrap_or(1.0));
        let mut out = MapCollection::new();

        for source in collector.sources() {
            let mut maps = BTreeMap::new();
            for feature in collector.feature_space().features() {
                let Some(matrix) = collector.responses(&source.name, feature.name()) else {
                    continue;
                };
                let reducer = feature.reducer().unwrap_or(&self.preference_fn);
                let reduced = matrix.reduce(reducer, Scale::default(), selectivity_scale);
                let base = format!("{}{}", self.prefix, capitalize(feature.name()));
                let cyclic_range = feature.cyclic().then(|| {
                    let (lo, hi) = feature.range();
                    hi - lo
                });

                for (mode, grids) in reduced {
                    maps.insert(
                        format!("{base}{mode}Preference"),
                        FeatureMap {
                            data: grids.preference,
                            cyclic_range,
                        },
                    );
                    maps.insert(
                        format!("{base}{mode}Selectivity"),
                        FeatureMap {
                            data: grids.selectivity,
                            cyclic_range: None,
                        },
                    );
                    if let Some(goodness) = grids.goodness_of_fit {
                        maps.insert(
                            format!("{base}{mode}Goodness"),
                            FeatureMap {
                                data: goodness,
                                cyclic_range: None,
                            },
                        );
                    }
                }
            }
            out.insert(source.name.clone(), maps);
        }
        out
    }
}
