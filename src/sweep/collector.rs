//! Driving the sweep and collating responses.
//!
//! The driver presents every permutation strictly sequentially: the
//! collaborator carries mutable simulator state, so there is exactly one
//! presentation in flight at any time, and all repetitions of a
//! permutation complete before the next one starts. Cancellation is
//! cooperative and only honored between permutations.

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::{debug, info};

use crate::config::MeasureConfig;
use crate::core::matrix::{DistributionMatrix, FullMatrix};
use crate::sweep::coordinators::MetaFeatureFn;
use crate::sweep::feature::{FeatureSpace, FeatureValues};
use crate::sweep::stimulus::{CancelToken, MeasurementSource, Presenter, StimulusBundle};
use crate::sweep::SweepError;

pub type Hook = Box<dyn FnMut()>;

/// Caller-owned per-sweep context: static stimulus parameters, the input
/// sources patterns are drawn on, coordination functions, hooks, and the
/// cancellation flag. Nothing here outlives the caller's ownership.
#[derive(Default)]
pub struct SweepSession {
    /// Parameters fixed for the whole sweep, merged into every source's
    /// stimulus map before the feature values.
    pub static_params: BTreeMap<String, f64>,
    /// Names of the sources stimuli are drawn on.
    pub input_sources: Vec<String>,
    /// Metafeature coordination functions, applied in order.
    pub coordinators: Vec<MetaFeatureFn>,
    pub pre_session_hooks: Vec<Hook>,
    pub post_session_hooks: Vec<Hook>,
    pub pre_presentation_hooks: Vec<Hook>,
    pub post_presentation_hooks: Vec<Hook>,
    pub cancel: CancelToken,
}

impl SweepSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shared presentation loop: enumerate permutations, run hooks, build the
/// stimulus configuration, present with repetitions, average, and hand the
/// result to `absorb`. Returns the number of completed permutations.
pub(crate) fn drive_sweep(
    presenter: &mut dyn Presenter,
    session: &mut SweepSession,
    space: &FeatureSpace,
    requested: &[(String, (usize, usize))],
    repetitions: usize,
    absorb: &mut dyn FnMut(&BTreeMap<String, Array2<f64>>, &FeatureValues, &[f64]) -> Result<(), SweepError>,
) -> Result<usize, SweepError> {
    let total = space.permutation_count();
    let output_names: Vec<String> = requested.iter().map(|(n, _)| n.clone()).collect();

    let description = space
        .independent()
        .map(|f| format!("{} {}", f.values().len(), f.name()))
        .collect::<Vec<_>>()
        .join(" * ");
    info!(total, "presenting {total} test patterns ({description})");

    for hook in &mut session.pre_session_hooks {
        hook();
    }

    let mut completed = 0;
    for (step, permutation) in space.permutations().enumerate() {
        if session.cancel.is_cancelled() {
            for hook in &mut session.post_session_hooks {
                hook();
            }
            return Err(SweepError::Interrupted { completed, total });
        }

        let values = space.resolve(&permutation);

        let mut totals: BTreeMap<String, Array2<f64>> = requested
            .iter()
            .map(|(name, shape)| (name.clone(), Array2::zeros(*shape)))
            .collect();

        for _ in 0..repetitions {
            for hook in &mut session.pre_presentation_hooks {
                hook();
            }

            let mut bundle = StimulusBundle::with_sources(&session.input_sources);
            for (key, value) in &session.static_params {
                bundle.set_on_all(key, *value);
            }
            for (name, value) in values.iter() {
                bundle.set_on_all(name, value);
            }
            for coordinate in &session.coordinators {
                coordinate(&mut bundle, &values);
            }

            let activities = presenter.present(&bundle, &output_names, step, total);

            for hook in &mut session.post_presentation_hooks {
                hook();
            }

            for (name, shape) in requested {
                let snapshot = activities
                    .get(name)
                    .ok_or_else(|| SweepError::MissingOutput { output: name.clone() })?;
                let got = snapshot.dim();
                if got != *shape {
                    return Err(SweepError::ShapeMismatch {
                        output: name.clone(),
                        expected: *shape,
                        got,
                    });
                }
                if let Some(total_for) = totals.get_mut(name) {
                    *total_for += snapshot;
                }
            }
        }

        let reps = repetitions as f64;
        for averaged in totals.values_mut() {
            averaged.mapv_inplace(|v| v / reps);
        }

        absorb(&totals, &values, &permutation)?;
        completed += 1;
        debug!(step, total, "collected permutation");
    }

    for hook in &mut session.post_session_hooks {
        hook();
    }
    Ok(completed)
}

/// Collects per-feature response distributions for every measurement
/// source across one sweep.
///
/// One `DistributionMatrix` exists per (source, feature) pair, and each
/// permutation contributes exactly one push per pair: the per-unit
/// activity averaged over repetitions, binned at the permutation's value
/// of that feature.
pub struct ResponseCollector {
    sources: Vec<MeasurementSource>,
    space: FeatureSpace,
    config: MeasureConfig,
    responses: BTreeMap<String, BTreeMap<String, DistributionMatrix>>,
    full: BTreeMap<String, FullMatrix>,
    completed: usize,
}

impl ResponseCollector {
    pub fn new(sources: Vec<MeasurementSource>, space: FeatureSpace, config: MeasureConfig) -> Self {
        let mut responses = BTreeMap::new();
        for source in &sources {
            let mut per_feature = BTreeMap::new();
            for feature in space.features() {
                per_feature.insert(
                    feature.name().to_owned(),
                    DistributionMatrix::new(
                        source.shape,
                        feature.range(),
                        feature.cyclic(),
                        config.keep_peak,
                    ),
                );
            }
            responses.insert(source.name.clone(), per_feature);
        }

        let mut full = BTreeMap::new();
        if config.store_full_matrix {
            let names: Vec<String> = space.independent().map(|f| f.name().to_owned()).collect();
            let values: Vec<Vec<f64>> = space.independent().map(|f| f.values().to_vec()).collect();
            for source in &sources {
                full.insert(source.name.clone(), FullMatrix::new(names.clone(), values.clone()));
            }
        }

        Self {
            sources,
            space,
            config,
            responses,
            full,
            completed: 0,
        }
    }

    pub fn feature_space(&self) -> &FeatureSpace {
        &self.space
    }

    pub fn sources(&self) -> &[MeasurementSource] {
        &self.sources
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// Permutations fully collected so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// The distribution grid of one (source, feature) pair.
    pub fn responses(&self, source: &str, feature: &str) -> Option<&DistributionMatrix> {
        self.responses.get(source).and_then(|m| m.get(feature))
    }

    /// The cached full response matrix of a source, when enabled.
    pub fn full_matrix(&self, source: &str) -> Option<&FullMatrix> {
        self.full.get(source)
    }

    /// Present every permutation and collate the responses.
    ///
    /// On cancellation the error reports `(completed, total)` and every
    /// distribution populated so far stays valid; nothing is rolled back.
    pub fn run(
        &mut self,
        presenter: &mut dyn Presenter,
        session: &mut SweepSession,
    ) -> Result<(), SweepError> {
        let requested: Vec<(String, (usize, usize))> = self
            .sources
            .iter()
            .map(|s| (s.name.clone(), s.shape))
            .collect();

        let responses = &mut self.responses;
        let full = &mut self.full;
        let completed = drive_sweep(
            presenter,
            session,
            &self.space,
            &requested,
            self.config.repetitions,
            &mut |averaged, values, permutation| {
                for (source, snapshot) in averaged {
                    if let Some(per_feature) = responses.get_mut(source) {
                        for (feature, value) in values.iter() {
                            if let Some(matrix) = per_feature.get_mut(feature) {
                                matrix.update(snapshot, value).map_err(|e| {
                                    SweepError::Distribution {
                                        feature: feature.to_owned(),
                                        source: e,
                                    }
                                })?;
                            }
                        }
                    }
                    if let Some(cache) = full.get_mut(source) {
                        cache.update(snapshot, permutation);
                    }
                }
                Ok(())
            },
        );

        match completed {
            Ok(count) => {
                self.completed = count;
                Ok(())
            }
            Err(SweepError::Interrupted { completed, total }) => {
                self.completed = completed;
                Err(SweepError::Interrupted { completed, total })
            }
            Err(other) => Err(other),
        }
    }
}
