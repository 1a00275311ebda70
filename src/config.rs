use serde::{Deserialize, Serialize};

/// Caller-owned settings for one sweep. Passed into each collector
/// explicitly; nothing in the crate keeps process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureConfig {
    /// How many times each stimulus permutation is presented. Responses are
    /// summed over presentations and divided by this count, so a
    /// deterministic collaborator yields the same result for any value.
    #[serde(default = "MeasureConfig::default_repetitions")]
    pub repetitions: usize,
    /// Store the peak response seen per bin instead of the running sum.
    /// Totals still reflect every sample, so magnitude fractions stay
    /// meaningful.
    #[serde(default = "MeasureConfig::default_keep_peak")]
    pub keep_peak: bool,
    /// Cache the full averaged response matrix of every permutation,
    /// indexed by the independent feature values.
    #[serde(default)]
    pub store_full_matrix: bool,
}

impl MeasureConfig {
    fn default_repetitions() -> usize {
        1
    }
    fn default_keep_peak() -> bool {
        true
    }
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            repetitions: Self::default_repetitions(),
            keep_peak: Self::default_keep_peak(),
            store_full_matrix: false,
        }
    }
}
