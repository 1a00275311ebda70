use std::cell::Cell;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::rc::Rc;

use ndarray::Array2;
use tunemap::config::MeasureConfig;
use tunemap::sweep::collector::{ResponseCollector, SweepSession};
use tunemap::sweep::coordinators::{self, ContrastMode};
use tunemap::sweep::feature::{FeatureSpace, FeatureSpec};
use tunemap::sweep::stimulus::{CancelToken, MeasurementSource, Presenter, StimulusBundle};
use tunemap::sweep::SweepError;

const PREFS: [[f64; 2]; 2] = [[0.0, PI / 4.0], [PI / 2.0, 3.0 * PI / 4.0]];

/// Deterministic stand-in for the simulator: a 2x2 sheet of
/// orientation-tuned units, optionally modulated by phase and scale.
struct TunedSheet {
    calls: usize,
    cancel_after: Option<(usize, CancelToken)>,
    seen_scales: Vec<f64>,
}

impl TunedSheet {
    fn new() -> Self {
        Self {
            calls: 0,
            cancel_after: None,
            seen_scales: Vec::new(),
        }
    }

    fn response(&self, stimuli: &StimulusBundle) -> Array2<f64> {
        let ori = stimuli.get_any("orientation").unwrap_or(0.0);
        let phase_gain = match stimuli.get_any("phase") {
            Some(phase) => 0.5 + 0.5 * phase.cos().abs(),
            None => 1.0,
        };
        let scale = stimuli.get_any("scale").unwrap_or(1.0);
        Array2::from_shape_fn((2, 2), |(r, c)| {
            let tuning = (2.0 * ((2.0 * (ori - PREFS[r][c])).cos() - 1.0)).exp();
            scale * phase_gain * tuning
        })
    }
}

impl Presenter for TunedSheet {
    fn present(
        &mut self,
        stimuli: &StimulusBundle,
        outputs: &[String],
        _step: usize,
        _total: usize,
    ) -> BTreeMap<String, Array2<f64>> {
        self.calls += 1;
        if let Some(scale) = stimuli.get_any("scale") {
            self.seen_scales.push(scale);
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.calls >= *after {
                token.cancel();
            }
        }
        let mut out = BTreeMap::new();
        for name in outputs {
            out.insert(name.clone(), self.response(stimuli));
        }
        out
    }
}

fn orientation_space() -> FeatureSpace {
    let ori = FeatureSpec::stepped("orientation", 0.0, PI, PI / 8.0)
        .cyclic(true)
        .resolve()
        .unwrap();
    FeatureSpace::new(vec![ori])
}

fn v1() -> MeasurementSource {
    MeasurementSource::new("V1", 2, 2)
}

fn run_once(config: MeasureConfig) -> (ResponseCollector, TunedSheet) {
    let mut collector = ResponseCollector::new(vec![v1()], orientation_space(), config);
    let mut presenter = TunedSheet::new();
    let mut session = SweepSession::new();
    session.input_sources = vec!["Retina".to_owned()];
    collector.run(&mut presenter, &mut session).unwrap();
    (collector, presenter)
}

#[test]
fn identical_sweeps_collect_identical_distributions() {
    let (a, _) = run_once(MeasureConfig::default());
    let (b, _) = run_once(MeasureConfig::default());
    assert_eq!(a.responses("V1", "orientation"), b.responses("V1", "orientation"));
}

#[test]
fn repetitions_average_out_for_a_deterministic_collaborator() {
    let (once, p1) = run_once(MeasureConfig {
        repetitions: 1,
        ..MeasureConfig::default()
    });
    let (four, p4) = run_once(MeasureConfig {
        repetitions: 4,
        ..MeasureConfig::default()
    });
    assert_eq!(p1.calls * 4, p4.calls);
    assert_eq!(once.responses("V1", "orientation"), four.responses("V1", "orientation"));
}

#[test]
fn each_permutation_pushes_exactly_once_per_feature() {
    let (collector, _) = run_once(MeasureConfig {
        repetitions: 3,
        ..MeasureConfig::default()
    });
    let matrix = collector.responses("V1", "orientation").unwrap();
    let d = matrix.distribution(0, 0);
    assert_eq!(d.total_count(), 8);
    assert_eq!(d.num_bins(), 8);
    assert_eq!(collector.completed(), 8);
}

#[test]
fn cancellation_reports_progress_and_keeps_partial_data() {
    let mut collector = ResponseCollector::new(
        vec![v1()],
        orientation_space(),
        MeasureConfig::default(),
    );
    let mut presenter = TunedSheet::new();
    let mut session = SweepSession::new();
    session.input_sources = vec!["Retina".to_owned()];
    presenter.cancel_after = Some((3, session.cancel.clone()));

    let err = collector.run(&mut presenter, &mut session).unwrap_err();
    assert_eq!(
        err,
        SweepError::Interrupted {
            completed: 3,
            total: 8
        }
    );
    assert_eq!(collector.completed(), 3);
    let d = collector.responses("V1", "orientation").unwrap().distribution(1, 1);
    assert_eq!(d.total_count(), 3);
}

#[test]
fn missing_outputs_are_a_hard_error() {
    struct Silent;
    impl Presenter for Silent {
        fn present(
            &mut self,
            _stimuli: &StimulusBundle,
            _outputs: &[String],
            _step: usize,
            _total: usize,
        ) -> BTreeMap<String, Array2<f64>> {
            BTreeMap::new()
        }
    }

    let mut collector =
        ResponseCollector::new(vec![v1()], orientation_space(), MeasureConfig::default());
    let err = collector
        .run(&mut Silent, &mut SweepSession::new())
        .unwrap_err();
    assert!(matches!(err, SweepError::MissingOutput { .. }));
}

#[test]
fn wrong_activity_shape_is_a_hard_error() {
    struct WrongShape;
    impl Presenter for WrongShape {
        fn present(
            &mut self,
            _stimuli: &StimulusBundle,
            outputs: &[String],
            _step: usize,
            _total: usize,
        ) -> BTreeMap<String, Array2<f64>> {
            outputs
                .iter()
                .map(|n| (n.clone(), Array2::zeros((3, 3))))
                .collect()
        }
    }

    let mut collector =
        ResponseCollector::new(vec![v1()], orientation_space(), MeasureConfig::default());
    let err = collector
        .run(&mut WrongShape, &mut SweepSession::new())
        .unwrap_err();
    assert!(matches!(err, SweepError::ShapeMismatch { .. }));
}

#[test]
fn hooks_run_at_their_defined_points() {
    let mut collector = ResponseCollector::new(
        vec![v1()],
        orientation_space(),
        MeasureConfig {
            repetitions: 2,
            ..MeasureConfig::default()
        },
    );
    let mut presenter = TunedSheet::new();
    let mut session = SweepSession::new();
    session.input_sources = vec!["Retina".to_owned()];

    let pre_session = Rc::new(Cell::new(0));
    let post_session = Rc::new(Cell::new(0));
    let pre_present = Rc::new(Cell::new(0));
    let post_present = Rc::new(Cell::new(0));
    {
        let c = pre_session.clone();
        session.pre_session_hooks.push(Box::new(move || c.set(c.get() + 1)));
        let c = post_session.clone();
        session.post_session_hooks.push(Box::new(move || c.set(c.get() + 1)));
        let c = pre_present.clone();
        session.pre_presentation_hooks.push(Box::new(move || c.set(c.get() + 1)));
        let c = post_present.clone();
        session.post_presentation_hooks.push(Box::new(move || c.set(c.get() + 1)));
    }

    collector.run(&mut presenter, &mut session).unwrap();
    assert_eq!(pre_session.get(), 1);
    assert_eq!(post_session.get(), 1);
    assert_eq!(pre_present.get(), 16);
    assert_eq!(post_present.get(), 16);
}

#[test]
fn static_params_and_coordinators_shape_the_stimulus() {
    let mut collector =
        ResponseCollector::new(vec![v1()], orientation_space(), MeasureConfig::default());
    let mut presenter = TunedSheet::new();
    let mut session = SweepSession::new();
    session.input_sources = vec!["Retina".to_owned()];
    session.static_params.insert("contrast".to_owned(), 30.0);
    session
        .coordinators
        .push(coordinators::contrast(ContrastMode::MichelsonContrast));

    collector.run(&mut presenter, &mut session).unwrap();
    assert_eq!(presenter.seen_scales.len(), 8);
    assert!(presenter.seen_scales.iter().all(|s| (s - 0.3).abs() < 1e-12));
}

#[test]
fn peak_mode_records_the_best_response_over_nuisance_features() {
    let ori = FeatureSpec::stepped("orientation", 0.0, PI, PI / 4.0)
        .cyclic(true)
        .resolve()
        .unwrap();
    let phase = FeatureSpec::stepped("phase", 0.0, 2.0 * PI, PI / 2.0)
        .cyclic(true)
        .resolve()
        .unwrap();
    let space = FeatureSpace::new(vec![ori, phase]);

    let mut collector = ResponseCollector::new(vec![v1()], space, MeasureConfig::default());
    let mut presenter = TunedSheet::new();
    let mut session = SweepSession::new();
    session.input_sources = vec!["Retina".to_owned()];
    collector.run(&mut presenter, &mut session).unwrap();

    // Unit (0, 0) prefers orientation 0; at that bin the stored value is
    // the peak over the four phases, whose gain maxes out at 1.
    let d = collector.responses("V1", "orientation").unwrap().distribution(0, 0);
    assert!((d.get_value(0.0).unwrap() - 1.0).abs() < 1e-9);
    // Totals still count every push: 4 orientations x 4 phases.
    assert_eq!(d.total_count(), 16);
}

#[test]
fn full_matrix_caches_every_permutation_when_enabled() {
    let (collector, _) = run_once(MeasureConfig {
        store_full_matrix: true,
        ..MeasureConfig::default()
    });
    let full = collector.full_matrix("V1").unwrap();
    assert_eq!(full.dims(), &[8]);
    for i in 0..8 {
        let response = full.get(&[i]).unwrap();
        assert_eq!(response.dim(), (2, 2));
    }
    let expected = TunedSheet::new().response(&{
        let mut b = StimulusBundle::with_sources(&["Retina"]);
        b.set_on_all("orientation", PI / 8.0);
        b
    });
    assert_eq!(full.get_by_values(&[PI / 8.0]).unwrap(), &expected);
}
