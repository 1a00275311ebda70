//! The boundary to the presentation collaborator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Spatial extent of a source in sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    /// The unit square centered on the origin.
    pub fn unit() -> Self {
        Self {
            left: -0.5,
            bottom: -0.5,
            right: 0.5,
            top: 0.5,
        }
    }
}

/// A named activity source (an output sheet, or an input sheet for
/// receptive-field estimation) with a fixed 2-D unit grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSource {
    pub name: String,
    pub shape: (usize, usize),
    pub bounds: Bounds,
}

impl MeasurementSource {
    pub fn new(name: &str, rows: usize, cols: usize) -> Self {
        Self {
            name: name.to_owned(),
            shape: (rows, cols),
            bounds: Bounds::unit(),
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }
}

/// Per-source stimulus parameters, one map of named scalar fields per
/// input source. The collector fills each map with the static parameters
/// and the permutation's feature values; metafeature coordination
/// functions may then rewrite per-source fields.
pub type StimulusParams = BTreeMap<String, f64>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StimulusBundle {
    sources: BTreeMap<String, StimulusParams>,
}

impl StimulusBundle {
    pub fn with_sources<S: AsRef<str>>(names: &[S]) -> Self {
        let mut bundle = Self::default();
        for name in names {
            bundle.sources.insert(name.as_ref().to_owned(), StimulusParams::new());
        }
        bundle
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn source(&self, name: &str) -> Option<&StimulusParams> {
        self.sources.get(name)
    }

    pub fn source_mut(&mut self, name: &str) -> Option<&mut StimulusParams> {
        self.sources.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StimulusParams)> {
        self.sources.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut StimulusParams)> {
        self.sources.iter_mut().map(|(n, p)| (n.as_str(), p))
    }

    /// Set a field on every source.
    pub fn set_on_all(&mut self, key: &str, value: f64) {
        for params in self.sources.values_mut() {
            params.insert(key.to_owned(), value);
        }
    }

    /// A field of one source, if set.
    pub fn get(&self, source: &str, key: &str) -> Option<f64> {
        self.sources.get(source).and_then(|p| p.get(key)).copied()
    }

    /// A field value shared by any source (coordination functions use this
    /// for quantities that the collector broadcast to every source).
    pub fn get_any(&self, key: &str) -> Option<f64> {
        self.sources.values().find_map(|p| p.get(key)).copied()
    }
}

/// The presentation collaborator.
///
/// One call presents one concrete stimulus configuration and returns one
/// activity snapshot per requested output name. Implementations own all
/// simulator state; the sweep calls them strictly sequentially and never
/// requires cross-call state beyond that.
pub trait Presenter {
    fn present(
        &mut self,
        stimuli: &StimulusBundle,
        outputs: &[String],
        step: usize,
        total: usize,
    ) -> BTreeMap<String, Array2<f64>>;
}

/// Cooperative cancellation flag, checked once per permutation.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
