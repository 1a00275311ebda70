//! tunemap — feature-sweep response measurement for simulated neural sheets.
//!
//! The crate drives a systematic sweep of stimulus feature values against an
//! external presentation collaborator (the simulator), accumulates per-unit
//! response distributions keyed by feature value, and reduces them into
//! preference/selectivity maps, tuning curves, and receptive-field estimates.
//!
//! The simulation engine itself, stimulus rendering, plotting, and storage
//! are all outside this crate; the only contact point is the
//! [`sweep::stimulus::Presenter`] trait.

pub mod config;
pub mod core;
pub mod sweep;

pub use config::MeasureConfig;
pub use core::distribution::{Distribution, DistributionError};
pub use core::stats::{FitResult, Scale, StatisticReducer};
pub use sweep::collector::{ResponseCollector, SweepSession};
pub use sweep::stimulus::{CancelToken, MeasurementSource, Presenter, StimulusBundle};
pub use sweep::SweepError;
