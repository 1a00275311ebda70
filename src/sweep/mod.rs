//! Sweep scheduling, stimulus presentation, and response collection.

pub mod collector;
pub mod coordinators;
pub mod curves;
pub mod feature;
pub mod maps;
pub mod revcorr;
pub mod stimulus;

use std::fmt;

use crate::core::distribution::DistributionError;

/// Errors raised while driving a sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepError {
    /// The sweep was cancelled between permutations. Everything collected
    /// for the first `completed` permutations remains valid.
    Interrupted { completed: usize, total: usize },
    /// The collaborator did not return a requested output.
    MissingOutput { output: String },
    /// A returned activity matrix disagrees with the declared source shape.
    ShapeMismatch {
        output: String,
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// A feature value fell outside its distribution axis.
    Distribution {
        feature: String,
        source: DistributionError,
    },
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Interrupted { completed, total } => {
                write!(f, "sweep interrupted after {completed} of {total} permutations")
            }
            SweepError::MissingOutput { output } => {
                write!(f, "collaborator returned no activity for output {output:?}")
            }
            SweepError::ShapeMismatch { output, expected, got } => write!(
                f,
                "activity for {output:?} has shape {}x{}, expected {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            SweepError::Distribution { feature, source } => {
                write!(f, "feature {feature:?}: {source}")
            }
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Distribution { source, .. } => Some(source),
            _ => None,
        }
    }
}
