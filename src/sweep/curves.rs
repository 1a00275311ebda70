//! Tuning-curve measurement: one sweep per curve-parameter set, with the
//! collected responses grouped by the x-axis feature's values.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::config::MeasureConfig;
use crate::core::util::capitalize;
use crate::sweep::collector::{ResponseCollector, SweepSession};
use crate::sweep::feature::FeatureSpace;
use crate::sweep::stimulus::{MeasurementSource, Presenter};
use crate::sweep::SweepError;

/// One point of a tuning curve: the x-axis value and the per-unit
/// response matrix collected at it.
#[derive(Clone, Debug)]
pub struct CurvePoint {
    pub x: f64,
    pub response: Array2<f64>,
}

/// Curves keyed by their label ("Contrast = 30%"), each a sequence of
/// points in ascending x order.
pub type CurveFamily = BTreeMap<String, Vec<CurvePoint>>;

/// Curve-style measurement of one source.
///
/// The x axis is one swept feature (say orientation); every entry of
/// `curve_parameters` fixes the remaining stimulus parameters (say a
/// contrast level) and produces one labelled curve.
pub struct FeatureCurves {
    pub source: MeasurementSource,
    pub x_axis: String,
    /// Units appended to curve labels, "%" historically.
    pub units: String,
}

impl FeatureCurves {
    pub fn new(source: MeasurementSource, x_axis: &str) -> Self {
        Self {
            source,
            x_axis: x_axis.to_owned(),
            units: "%".to_owned(),
        }
    }

    /// Present one full sweep per curve-parameter set and extract the
    /// per-x-value responses of the source.
    pub fn measure(
        &self,
        presenter: &mut dyn Presenter,
        session: &mut SweepSession,
        space: &FeatureSpace,
        curve_parameters: &[BTreeMap<String, f64>],
        config: &MeasureConfig,
    ) -> Result<CurveFamily, SweepError> {
        let mut curves = CurveFamily::new();
        let base_params = session.static_params.clone();

        for curve in curve_parameters {
            session.static_params = base_params.clone();
            for (name, value) in curve {
                session.static_params.insert(name.clone(), *value);
            }
            let label = curve
                .iter()
                .map(|(n, v)| format!("{} = {}{}", capitalize(n), v, self.units))
                .collect::<Vec<_>>()
                .join("; ");

            let mut collector = ResponseCollector::new(
                vec![self.source.clone()],
                space.clone(),
                config.clone(),
            );
            let run = collector.run(presenter, session);

            // Keep whatever was collected even when interrupted, then
            // propagate the interruption with the partial family intact.
            let points = self.extract(&collector);
            if !points.is_empty() {
                curves.insert(label, points);
            }
            if let Err(err) = run {
                session.static_params = base_params;
                return Err(err);
            }
        }

        session.static_params = base_params;
        Ok(curves)
    }

    fn extract(&self, collector: &ResponseCollector) -> Vec<CurvePoint> {
        let Some(matrix) = collector.responses(&self.source.name, &self.x_axis) else {
            return Vec::new();
        };
        let (rows, cols) = matrix.shape();
        if rows == 0 || cols == 0 {
            return Vec::new();
        }

        // Pushes are broadcast, so every unit shares the bin set of the
        // first one.
        let xs: Vec<f64> = matrix.distribution(0, 0).bins().collect();
        xs.into_iter()
            .map(|x| {
                let mut response = Array2::zeros((rows, cols));
                for r in 0..rows {
                    for c in 0..cols {
                        response[[r, c]] = matrix.distribution(r, c).get_value(x).unwrap_or(0.0);
                    }
                }
                CurvePoint { x, response }
            })
            .collect()
    }
}
