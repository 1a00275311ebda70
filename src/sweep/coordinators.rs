//! Metafeature coordination functions.
//!
//! A coordinator translates one abstract feature value into concrete
//! per-source stimulus fields after the collector has merged the static
//! parameters and the permutation's values into every source map: a single
//! "contrast" becomes per-source scale/offset, a "direction" becomes
//! per-source motion parameters, and binocular quantities address sources
//! by the Left/Right (or Red/Green/Blue) substrings in their names.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::util::{hue_to_rgb, wrap};
use crate::sweep::feature::FeatureValues;
use crate::sweep::stimulus::StimulusBundle;

pub type MetaFeatureFn = Box<dyn Fn(&mut StimulusBundle, &FeatureValues)>;

/// How a contrast percentage maps onto pattern scale and offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContrastMode {
    /// Offset 0.5, scale = 2·offset·contrast/100.
    MichelsonContrast,
    /// Same mapping, only well defined for patterns whose background
    /// offset equals the target offset.
    WeberContrast,
    /// The contrast value is used directly as the scale.
    Scale,
}

fn lookup(values: &FeatureValues, bundle: &StimulusBundle, key: &str) -> Option<f64> {
    values.get(key).or_else(|| bundle.get_any(key))
}

/// Translate a "contrast" value into per-source scale and offset.
pub fn contrast(mode: ContrastMode) -> MetaFeatureFn {
    Box::new(move |bundle, values| {
        let Some(c) = lookup(values, bundle, "contrast") else {
            return;
        };
        for (_, params) in bundle.iter_mut() {
            let (offset, scale) = match mode {
                ContrastMode::MichelsonContrast | ContrastMode::WeberContrast => (0.5, c / 100.0),
                ContrastMode::Scale => (0.0, c),
            };
            params.insert("offset".to_owned(), offset);
            params.insert("scale".to_owned(), scale);
        }
    })
}

/// Translate a "direction" value into per-source motion parameters: the
/// pattern orientation orthogonal to the direction, the speed, and a
/// per-source lag step read from a trailing digit in the source name.
pub fn direction() -> MetaFeatureFn {
    let warned = AtomicBool::new(false);
    Box::new(move |bundle, values| {
        let Some(dir) = lookup(values, bundle, "direction") else {
            return;
        };
        let speed = lookup(values, bundle, "speed").unwrap_or(0.0);
        for (name, params) in bundle.iter_mut() {
            let step = name
                .chars()
                .last()
                .and_then(|c| c.to_digit(10))
                .map(f64::from)
                .unwrap_or_else(|| {
                    if !warned.swap(true, Ordering::Relaxed) {
                        warn!(source = name, "no input lag digit at the end of the source name, assuming step 0");
                    }
                    0.0
                });
            params.insert("orientation".to_owned(), dir + PI / 2.0);
            params.insert("speed".to_owned(), speed);
            params.insert("step".to_owned(), step);
        }
    })
}

/// Scale Red/Green/Blue sources by the RGB decomposition of a "hue" value.
pub fn hue() -> MetaFeatureFn {
    let warned = AtomicBool::new(false);
    Box::new(move |bundle, values| {
        let Some(h) = lookup(values, bundle, "hue") else {
            return;
        };
        let (r, g, b) = hue_to_rgb(h);
        for (name, params) in bundle.iter_mut() {
            let scale = if name.contains("Red") {
                Some(r)
            } else if name.contains("Green") {
                Some(g)
            } else if name.contains("Blue") {
                Some(b)
            } else {
                None
            };
            match scale {
                Some(s) => {
                    params.insert("scale".to_owned(), s);
                }
                None => {
                    if !warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            source = name,
                            "hue is defined only for sources named Red, Green or Blue"
                        );
                    }
                }
            }
        }
    })
}

/// Split brightness between Left and Right sources from an "ocular" value.
pub fn ocularity() -> MetaFeatureFn {
    let warned = AtomicBool::new(false);
    Box::new(move |bundle, values| {
        let Some(o) = lookup(values, bundle, "ocular") else {
            return;
        };
        for (name, params) in bundle.iter_mut() {
            let scale = if name.contains("Right") {
                Some(2.0 * o)
            } else if name.contains("Left") {
                Some(2.0 - 2.0 * o)
            } else {
                None
            };
            match scale {
                Some(s) => {
                    params.insert("scale".to_owned(), s);
                }
                None => {
                    if !warned.swap(true, Ordering::Relaxed) {
                        warn!(source = name, "ocularity is defined only for Left and Right sources");
                    }
                }
            }
        }
    })
}

/// Offset the phase of Left and Right sources in opposite directions by
/// half a "phasedisparity" value.
pub fn phase_disparity() -> MetaFeatureFn {
    let warned = AtomicBool::new(false);
    Box::new(move |bundle, values| {
        let (Some(phase), Some(disparity)) = (
            lookup(values, bundle, "phase"),
            lookup(values, bundle, "phasedisparity"),
        ) else {
            return;
        };
        let tau = 2.0 * PI;
        for (name, params) in bundle.iter_mut() {
            let shifted = if name.contains("Right") {
                Some(wrap(0.0, tau, phase - disparity / 2.0))
            } else if name.contains("Left") {
                Some(wrap(0.0, tau, phase + disparity / 2.0))
            } else {
                None
            };
            match shifted {
                Some(p) => {
                    params.insert("phase".to_owned(), p);
                }
                None => {
                    if !warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            source = name,
                            "phase disparity is defined only for Left and Right sources"
                        );
                    }
                }
            }
        }
    })
}
