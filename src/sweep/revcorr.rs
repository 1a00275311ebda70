//! Receptive-field estimation by reverse correlation.
//!
//! Instead of binning responses by feature value, every permutation adds
//! the outer product of each output unit's activity with the input
//! snapshot to a per-(input, output) accumulator, estimating the
//! receptive field of each unit.

use std::collections::BTreeMap;

use ndarray::{s, Array2, Array4};

use crate::sweep::collector::{drive_sweep, SweepSession};
use crate::sweep::feature::FeatureSpace;
use crate::sweep::stimulus::{MeasurementSource, Presenter};
use crate::sweep::SweepError;

/// Reverse-correlation accumulator over one sweep.
///
/// Each accumulator is shaped `[out_rows, out_cols, in_rows, in_cols]`.
/// Every permutation is presented exactly once; repetitions do not apply
/// here, since each pattern only contributes one outer-product update.
pub struct ReverseCorrelation {
    inputs: Vec<MeasurementSource>,
    outputs: Vec<MeasurementSource>,
    space: FeatureSpace,
    fields: BTreeMap<(String, String), Array4<f64>>,
    completed: usize,
}

impl ReverseCorrelation {
    pub fn new(
        inputs: Vec<MeasurementSource>,
        outputs: Vec<MeasurementSource>,
        space: FeatureSpace,
    ) -> Self {
        let mut fields = BTreeMap::new();
        for input in &inputs {
            for output in &outputs {
                fields.insert(
                    (input.name.clone(), output.name.clone()),
                    Array4::zeros((
                        output.shape.0,
                        output.shape.1,
                        input.shape.0,
                        input.shape.1,
                    )),
                );
            }
        }
        Self {
            inputs,
            outputs,
            space,
            fields,
            completed: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// The full accumulator for one (input, output) pair.
    pub fn field(&self, input: &str, output: &str) -> Option<&Array4<f64>> {
        self.fields.get(&(input.to_owned(), output.to_owned()))
    }

    /// The estimated receptive field of one output unit.
    pub fn unit_field(&self, input: &str, output: &str, row: usize, col: usize) -> Option<Array2<f64>> {
        self.field(input, output)
            .map(|acc| acc.slice(s![row, col, .., ..]).to_owned())
    }

    /// Every unit's receptive field, grouped input-first.
    pub fn rf_views(&self) -> BTreeMap<&str, BTreeMap<&str, BTreeMap<(usize, usize), Array2<f64>>>> {
        let mut out: BTreeMap<&str, BTreeMap<&str, BTreeMap<(usize, usize), Array2<f64>>>> =
            BTreeMap::new();
        for ((input, output), acc) in &self.fields {
            let per_unit = out
                .entry(input.as_str())
                .or_default()
                .entry(output.as_str())
                .or_default();
            let (rows, cols) = (acc.shape()[0], acc.shape()[1]);
            for r in 0..rows {
                for c in 0..cols {
                    per_unit.insert((r, c), acc.slice(s![r, c, .., ..]).to_owned());
                }
            }
        }
        out
    }

    /// Present every permutation once, correlating outputs with inputs.
    pub fn run(
        &mut self,
        presenter: &mut dyn Presenter,
        session: &mut SweepSession,
    ) -> Result<(), SweepError> {
        // The input snapshots ride along as additional requested outputs.
        let mut requested: Vec<(String, (usize, usize))> = self
            .outputs
            .iter()
            .map(|s| (s.name.clone(), s.shape))
            .collect();
        for input in &self.inputs {
            if !requested.iter().any(|(n, _)| n == &input.name) {
                requested.push((input.name.clone(), input.shape));
            }
        }

        let fields = &mut self.fields;
        let inputs = &self.inputs;
        let outputs = &self.outputs;
        let completed = drive_sweep(
            presenter,
            session,
            &self.space,
            &requested,
            1,
            &mut |activities, _values, _permutation| {
                for output in outputs {
                    let Some(out_act) = activities.get(&output.name) else {
                        continue;
                    };
                    for input in inputs {
                        let Some(in_act) = activities.get(&input.name) else {
                            continue;
                        };
                        if let Some(acc) =
                            fields.get_mut(&(input.name.clone(), output.name.clone()))
                        {
                            for ((r, c), &weight) in out_act.indexed_iter() {
                                let mut rf = acc.slice_mut(s![r, c, .., ..]);
                                rf.scaled_add(weight, in_act);
                            }
                        }
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
