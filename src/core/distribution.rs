//! Histogram-like accumulator of the responses of one unit.
//!
//! A `Distribution` holds (bin, value) samples for a single spatial unit,
//! where the bin is a stimulus value (a continuous quantity, not a
//! discretized index) and the value is the response it evoked. Bins can be
//! cyclic, like orientation or direction. Alongside the per-bin sums (or
//! peaks) it tracks the total value and count of everything ever added, so
//! per-bin magnitudes stay meaningful even in peak mode.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::util::wrap;

/// Bin position on the stimulus axis, ordered by the IEEE total order so it
/// can key a map deterministically.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bin(pub f64);

impl Eq for Bin {}

impl PartialOrd for Bin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bin {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Sample {
    value: f64,
    count: u64,
}

/// Errors from feeding a distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionError {
    /// A non-cyclic distribution was given a bin outside its axis bounds.
    InvalidBin { bin: f64, bounds: (f64, f64) },
}

impl fmt::Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionError::InvalidBin { bin, bounds } => {
                write!(f, "bin {bin} outside axis bounds [{}, {}]", bounds.0, bounds.1)
            }
        }
    }
}

impl std::error::Error for DistributionError {}

/// Near-zero threshold for a degenerate vector sum.
const DEGENERATE_MAGNITUDE: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub struct Distribution {
    axis_bounds: (f64, f64),
    cyclic: bool,
    keep_peak: bool,
    data: BTreeMap<Bin, Sample>,
    total_value: f64,
    total_count: u64,
    // Diagnostic only: how often a ratio or direction came out undefined.
    undefined: Cell<u64>,
}

impl Distribution {
    pub fn new(axis_bounds: (f64, f64), cyclic: bool, keep_peak: bool) -> Self {
        Self {
            axis_bounds,
            cyclic,
            keep_peak,
            data: BTreeMap::new(),
            total_value: 0.0,
            total_count: 0,
            undefined: Cell::new(0),
        }
    }

    pub fn axis_bounds(&self) -> (f64, f64) {
        self.axis_bounds
    }

    pub fn axis_range(&self) -> f64 {
        self.axis_bounds.1 - self.axis_bounds.0
    }

    pub fn cyclic(&self) -> bool {
        self.cyclic
    }

    pub fn keep_peak(&self) -> bool {
        self.keep_peak
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// How many guarded divisions or vector sums came out undefined.
    pub fn undefined_count(&self) -> u64 {
        self.undefined.get()
    }

    pub fn num_bins(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Populated bin positions in ascending order.
    pub fn bins(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.keys().map(|b| b.0)
    }

    /// Stored values, in the same order as `bins()`.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.values().map(|s| s.value)
    }

    /// Per-bin sample counts, in the same order as `bins()`.
    pub fn counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.data.values().map(|s| s.count)
    }

    fn canonical_bin(&self, bin: f64) -> f64 {
        if self.cyclic {
            wrap(self.axis_bounds.0, self.axis_bounds.1, bin)
        } else {
            bin
        }
    }

    /// Add one sample. Cyclic distributions wrap out-of-range bins back
    /// into `[lo, hi)`; non-cyclic ones reject them.
    ///
    /// With `keep_peak`, the stored value is the maximum ever seen at that
    /// bin, but the running totals grow with every sample regardless:
    /// each presentation still improves the sampling.
    pub fn add(&mut self, bin: f64, value: f64) -> Result<(), DistributionError> {
        if !self.cyclic {
            let (lo, hi) = self.axis_bounds;
            if !(lo <= bin && bin <= hi) {
                return Err(DistributionError::InvalidBin { bin, bounds: self.axis_bounds });
            }
        }
        let key = Bin(self.canonical_bin(bin));

        let sample = self.data.entry(key).or_default();
        sample.count += 1;
        if self.keep_peak {
            if value > sample.value {
                sample.value = value;
            }
        } else {
            sample.value += value;
        }
        self.total_value += value;
        self.total_count += 1;
        Ok(())
    }

    /// Stored value at a bin, if populated.
    pub fn get_value(&self, bin: f64) -> Option<f64> {
        self.data.get(&Bin(self.canonical_bin(bin))).map(|s| s.value)
    }

    /// Sample count at a bin, if populated.
    pub fn get_count(&self, bin: f64) -> Option<u64> {
        self.data.get(&Bin(self.canonical_bin(bin))).map(|s| s.count)
    }

    /// Subtract another distribution's matching bins in place.
    ///
    /// Totals are left untouched, so magnitude fractions computed after a
    /// subtraction refer to the pre-subtraction totals.
    pub fn sub_distr(&mut self, other: &Distribution) {
        for (bin, sample) in &other.data {
            if let Some(mine) = self.data.get_mut(bin) {
                mine.value -= sample.value;
            }
        }
    }

    /// Bin holding the largest value; ties go to the lowest bin.
    pub fn max_value_bin(&self) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for (bin, sample) in &self.data {
            if best.map_or(true, |(_, v)| sample.value > v) {
                best = Some((bin.0, sample.value));
            }
        }
        best.map(|(b, _)| b)
    }

    /// Bin holding the second-largest value, regardless of whether it is a
    /// true second peak. With a single bin, that bin is returned (callers
    /// discriminate via the second selectivity, which is 0 there).
    pub fn second_max_value_bin(&self) -> Option<f64> {
        let first = self.max_value_bin()?;
        if self.data.len() <= 1 {
            return Some(first);
        }
        let mut best: Option<(f64, f64)> = None;
        for (bin, sample) in &self.data {
            if bin.0 == first {
                continue;
            }
            if best.map_or(true, |(_, v)| sample.value > v) {
                best = Some((bin.0, sample.value));
            }
        }
        best.map(|(b, _)| b)
    }

    /// Bin of a genuine second peak: the largest bin, other than the
    /// primary one, whose value strictly exceeds both neighbors in
    /// position order (the ends count as adjacent). A unimodal
    /// distribution returns the primary bin; `second_peak_selectivity`
    /// is 0 there, which marks the result as invalid.
    pub fn second_peak_bin(&self) -> Option<f64> {
        let n = self.data.len();
        let ks: Vec<f64> = self.bins().collect();
        let vs: Vec<f64> = self.values().collect();
        if n == 0 {
            return None;
        }
        if n == 1 {
            return Some(ks[0]);
        }

        let mut ik0 = 0;
        for i in 1..n {
            if vs[i] > vs[ik0] {
                ik0 = i;
            }
        }

        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            if i == ik0 {
                continue;
            }
            let prev = vs[(i + n - 1) % n];
            let next = vs[(i + 1) % n];
            if vs[i] > prev && vs[i] > next && best.map_or(true, |(_, v)| vs[i] > v) {
                best = Some((i, vs[i]));
            }
        }
        match best {
            Some((i, _)) => Some(ks[i]),
            None => Some(ks[ik0]),
        }
    }

    /// Sum of each value times its bin position.
    pub fn weighted_sum(&self) -> f64 {
        self.data.iter().map(|(b, s)| b.0 * s.value).sum()
    }

    /// Vector sum of the distribution as (magnitude, direction), with the
    /// direction converted back into bin units and wrapped into the axis
    /// bounds. Each bin contributes a vector of length `value` at an angle
    /// mapping the axis range onto the full circle.
    ///
    /// The direction is meaningless when the magnitude is (near) zero; such
    /// calls bump the undefined counter.
    pub fn vector_sum(&self) -> (f64, f64) {
        let (lo, hi) = self.axis_bounds;
        let range = self.axis_range();
        let tau = 2.0 * std::f64::consts::PI;
        let mut re = 0.0;
        let mut im = 0.0;
        for (bin, sample) in &self.data {
            let theta = tau * (bin.0 - lo) / range;
            re += sample.value * theta.cos();
            im += sample.value * theta.sin();
        }
        let magnitude = (re * re + im * im).sqrt();
        if magnitude <= DEGENERATE_MAGNITUDE {
            self.undefined.set(self.undefined.get() + 1);
        }
        let direction = im.atan2(re) * range / tau + lo;
        (magnitude, wrap(lo, hi, direction))
    }

    /// A continuous, interpolated analog of `max_value_bin`: the direction
    /// of the vector sum for a cyclic axis, the value-weighted mean bin
    /// position otherwise.
    pub fn weighted_average(&self) -> f64 {
        if self.cyclic {
            self.vector_sum().1
        } else {
            let values_sum: f64 = self.values().sum();
            self.safe_divide(self.weighted_sum(), values_sum)
        }
    }

    /// Peakedness of the distribution, in [0, 1] (uniform = 0, all mass in
    /// one bin = 1). Cyclic axes use the vector-sum magnitude over the
    /// total mass; non-cyclic axes use the max bin's share rescaled so a
    /// uniform distribution sits at 0.
    pub fn selectivity(&self) -> f64 {
        if self.cyclic {
            self.vector_selectivity()
        } else {
            self.relative_selectivity()
        }
    }

    fn vector_selectivity(&self) -> f64 {
        let values_sum: f64 = self.values().sum();
        self.safe_divide(self.vector_sum().0, values_sum)
    }

    fn relative_selectivity(&self) -> f64 {
        // A single bin is considered fully selective.
        if self.data.len() <= 1 {
            return 1.0;
        }
        let values_sum: f64 = self.values().sum();
        let max = self.values().fold(f64::NEG_INFINITY, f64::max);
        let proportion = self.safe_divide(max, values_sum);
        let offset = 1.0 / self.data.len() as f64;
        let scaled = (proportion - offset) / (1.0 - offset);
        scaled.max(0.0)
    }

    /// Selectivity of the second-largest value; 0 with a single bin, which
    /// also marks `second_max_value_bin` as invalid.
    pub fn second_selectivity(&self) -> f64 {
        if self.data.len() <= 1 {
            return 0.0;
        }
        if self.cyclic {
            self.vector_second_selectivity()
        } else {
            self.relative_second_selectivity()
        }
    }

    fn relative_second_selectivity(&self) -> f64 {
        let first = match self.max_value_bin() {
            Some(b) => b,
            None => return 0.0,
        };
        let second_max = self
            .data
            .iter()
            .filter(|(b, _)| b.0 != first)
            .map(|(_, s)| s.value)
            .fold(f64::NEG_INFINITY, f64::max);
        let values_sum: f64 = self.values().sum();
        let proportion = self.safe_divide(second_max, values_sum);
        let offset = 1.0 / self.data.len() as f64;
        let scaled = (proportion - offset) / (1.0 - offset);
        scaled.max(0.0)
    }

    fn vector_second_selectivity(&self) -> f64 {
        let first = match self.max_value_bin() {
            Some(b) => b,
            None => return 0.0,
        };
        // Vector sum of everything except the primary bin, over the total
        // mass including it.
        let (lo, _) = self.axis_bounds;
        let range = self.axis_range();
        let tau = 2.0 * std::f64::consts::PI;
        let mut re = 0.0;
        let mut im = 0.0;
        for (bin, sample) in &self.data {
            if bin.0 == first {
                continue;
            }
            let theta = tau * (bin.0 - lo) / range;
            re += sample.value * theta.cos();
            im += sample.value * theta.sin();
        }
        let magnitude = (re * re + im * im).sqrt();
        let values_sum: f64 = self.values().sum();
        self.safe_divide(magnitude, values_sum)
    }

    /// Selectivity of the second peak; 0 when the distribution is
    /// unimodal (second peak == primary peak) or has a single bin.
    pub fn second_peak_selectivity(&self) -> f64 {
        if self.data.len() <= 1 {
            return 0.0;
        }
        let (p1, p2) = match (self.max_value_bin(), self.second_peak_bin()) {
            (Some(a), Some(b)) => (a, b),
            _ => return 0.0,
        };
        if p1 == p2 {
            return 0.0;
        }
        let m = self.get_value(p2).unwrap_or(0.0);
        let values_sum: f64 = self.values().sum();
        let proportion = self.safe_divide(m, values_sum);
        let offset = 1.0 / self.data.len() as f64;
        let scaled = (proportion - offset) / (1.0 - offset);
        scaled.max(0.0)
    }

    /// The value at a bin as a proportion of the total value ever added.
    pub fn value_mag(&self, bin: f64) -> f64 {
        self.safe_divide(self.get_value(bin).unwrap_or(0.0), self.total_value)
    }

    /// The count at a bin as a proportion of the total count.
    pub fn count_mag(&self, bin: f64) -> f64 {
        self.safe_divide(self.get_count(bin).unwrap_or(0) as f64, self.total_count as f64)
    }

    /// Division that reports 0 for a zero denominator, bumping the
    /// diagnostic counter instead of producing NaN or infinity.
    fn safe_divide(&self, numerator: f64, denominator: f64) -> f64 {
        if denominator == 0.0 {
            self.undefined.set(self.undefined.get() + 1);
            0.0
        } else {
            numerator / denominator
        }
    }
}
