//! Grids of distributions and cached full responses for one source.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::core::distribution::{Distribution, DistributionError};
use crate::core::stats::{Scale, StatisticReducer};

/// One reduced statistic grid per result field of a mode.
#[derive(Clone, Debug)]
pub struct ModeMaps {
    pub preference: Array2<f64>,
    pub selectivity: Array2<f64>,
    /// Present only for reducers that estimate a fit quality.
    pub goodness_of_fit: Option<Array2<f64>>,
}

/// A matrix of `Distribution`s, one per spatial unit of one measurement
/// source, all sharing a single stimulus axis.
///
/// The whole grid is updated at once per presentation: `update` broadcasts
/// one bin value with a matrix of per-unit responses.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionMatrix {
    dist: Array2<Distribution>,
}

impl DistributionMatrix {
    pub fn new(shape: (usize, usize), axis_bounds: (f64, f64), cyclic: bool, keep_peak: bool) -> Self {
        Self {
            dist: Array2::from_elem(shape, Distribution::new(axis_bounds, cyclic, keep_peak)),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        let s = self.dist.shape();
        (s[0], s[1])
    }

    pub fn distribution(&self, row: usize, col: usize) -> &Distribution {
        &self.dist[[row, col]]
    }

    /// Add one matrix of per-unit responses for a given bin value.
    pub fn update(&mut self, new_values: &Array2<f64>, bin: f64) -> Result<(), DistributionError> {
        for (idx, d) in self.dist.indexed_iter_mut() {
            d.add(bin, new_values[idx])?;
        }
        Ok(())
    }

    /// Reduce every unit's distribution with the given reducer, returning
    /// one grid per statistic per mode. All units share the reducer's mode
    /// keys, so the grids are allocated from the first unit's result.
    pub fn reduce(
        &self,
        reducer: &StatisticReducer,
        value_scale: Scale,
        selectivity_scale: Scale,
    ) -> BTreeMap<String, ModeMaps> {
        let shape = self.shape();
        let mut out: BTreeMap<String, ModeMaps> = BTreeMap::new();
        if shape.0 == 0 || shape.1 == 0 {
            return out;
        }

        for (mode, first) in reducer.reduce(self.distribution(0, 0), value_scale, selectivity_scale) {
            out.insert(
                mode,
                ModeMaps {
                    preference: Array2::zeros(shape),
                    selectivity: Array2::zeros(shape),
                    goodness_of_fit: first.goodness_of_fit.map(|_| Array2::zeros(shape)),
                },
            );
        }

        for ((r, c), d) in self.dist.indexed_iter() {
            let reduced = reducer.reduce(d, value_scale, selectivity_scale);
            for (mode, fit) in reduced {
                if let Some(maps) = out.get_mut(&mode) {
                    maps.preference[[r, c]] = fit.preference;
                    maps.selectivity[[r, c]] = fit.selectivity;
                    if let (Some(g), Some(grid)) = (fit.goodness_of_fit, maps.goodness_of_fit.as_mut()) {
                        grid[[r, c]] = g;
                    }
                }
            }
        }
        out
    }
}

/// Records the averaged response of every unit for every permutation of the
/// independent feature values. Memory-hungry, so the collector only fills
/// one when asked to.
#[derive(Clone, Debug)]
pub struct FullMatrix {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
    dims: Vec<usize>,
    data: Vec<Option<Array2<f64>>>,
}

impl FullMatrix {
    pub fn new(names: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let len = dims.iter().product::<usize>().max(1);
        Self {
            names,
            values,
            dims,
            data: vec![None; len],
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    fn flat_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0;
        for (&ix, &dim) in indices.iter().zip(&self.dims) {
            if ix >= dim {
                return None;
            }
            flat = flat * dim + ix;
        }
        Some(flat)
    }

    fn value_indices(&self, permutation: &[f64]) -> Option<Vec<usize>> {
        if permutation.len() != self.dims.len() {
            return None;
        }
        permutation
            .iter()
            .zip(&self.values)
            .map(|(v, vals)| vals.iter().position(|x| x.total_cmp(v).is_eq()))
            .collect()
    }

    /// Store the averaged response matrix for one permutation.
    pub fn update(&mut self, response: &Array2<f64>, permutation: &[f64]) {
        if let Some(flat) = self.value_indices(permutation).and_then(|ix| self.flat_index(&ix)) {
            self.data[flat] = Some(response.clone());
        }
    }

    /// Response stored at the given per-feature value indices.
    pub fn get(&self, indices: &[usize]) -> Option<&Array2<f64>> {
        self.flat_index(indices).and_then(|f| self.data[f].as_ref())
    }

    /// Response stored for the given permutation values.
    pub fn get_by_values(&self, permutation: &[f64]) -> Option<&Array2<f64>> {
        self.value_indices(permutation).and_then(|ix| self.get(&ix))
    }
}
