use serde_json::json;

use fdcore::data::curve::ProcessedCurve;
use fdcore::error::{CurveError, ErrorKind};
use fdrheo::compute::{
    compute, compute_with, ComputeError, ComputeMode, NullProgress, ProgressSink, STEP_COMPUTING, STEP_PREPROCESSING,
};
use fdrheo::params::{AnalysisParameters, ParameterTree};
use fdrheo::results::{AnalysisResult, CurveOutcome};
use fdrheo::routines::{CurveAnalyzer, Method};
use fdrheo::session::Session;
use fdrheo::sim::{SimulationConfig, SyntheticForceFile};

fn tree(compute_all: bool) -> ParameterTree {
    [
        ("Spring Constant", json!(0.1)),
        ("Deflection Sensitivity", json!(50)),
        ("Contact Model", json!("paraboloid")),
        ("Tip Radius", json!(25)),
        ("PoC Window", json!(50)),
        ("Auto Init E0", json!(true)),
        ("Compute All Curves", json!(compute_all)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn params(method: Method, compute_all: bool) -> AnalysisParameters {
    AnalysisParameters::from_tree(method, &tree(compute_all)).unwrap()
}

fn session(configs: Vec<SimulationConfig>) -> Session {
    let mut session = Session::new();
    for config in configs {
        session.add_file(Box::new(SyntheticForceFile::new(config)));
    }
    session
}

/// Fails curve 2 of file "b", panics on curve 3 of file "b", empty otherwise.
struct FlakyAnalyzer;

impl CurveAnalyzer for FlakyAnalyzer {
    fn analyze(&self, curve: &ProcessedCurve, _params: &AnalysisParameters) -> Result<Option<AnalysisResult>, CurveError> {
        match (curve.file_id.as_str(), curve.curve_index) {
            ("b", 2) => Err(CurveError::FitConvergence("forced failure".to_string())),
            ("b", 3) => panic!("forced panic"),
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
struct RecordingProgress {
    steps: Vec<String>,
    ranges: Vec<usize>,
    last: usize,
}

impl ProgressSink for RecordingProgress {
    fn set_range(&mut self, total: usize) {
        self.ranges.push(total);
    }

    fn set_progress(&mut self, completed: usize) {
        self.last = completed;
    }

    fn set_step(&mut self, label: &str) {
        self.steps.push(label.to_string());
    }
}

#[test]
fn test_records_keep_file_and_curve_identity() {
    let mut config_a = SimulationConfig::map("a", 6);
    config_a.modulus_spread = 0.3;
    let mut config_b = SimulationConfig::map("b", 4);
    config_b.seed = 7;
    config_b.young_modulus = 2e4;
    let files = vec![SyntheticForceFile::new(config_a.clone()), SyntheticForceFile::new(config_b.clone())];
    let mut session = session(vec![config_a, config_b]);

    let ids = session.file_ids();
    let summary = compute(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 4).unwrap();
    assert_eq!(summary.mode, ComputeMode::Map);
    assert_eq!(summary.total().computed, 10);

    for file in &files {
        let records = session.results().get_results(Method::HertzFit, &file.config().file_name).unwrap();
        assert_eq!(records.len(), file.config().n_curves);
        for (position, record) in records.iter().enumerate() {
            assert_eq!(record.curve_index, position);
            let Some(AnalysisResult::Hertz(hertz)) = record.result() else {
                panic!("curve {} was not fitted: {:?}", position, record.outcome);
            };
            let expected = file.curve_modulus(position);
            assert!(
                (hertz.e0 - expected).abs() / expected < 0.1,
                "{} curve {}: fitted {} expected {}",
                file.config().file_name,
                position,
                hertz.e0,
                expected
            );
        }
    }
}

#[test]
fn test_rerun_replaces_results() {
    let mut session = session(vec![SimulationConfig::map("a", 5)]);
    let ids = session.file_ids();
    let params = params(Method::HertzFit, true);
    compute(&mut session, &params, &ids, &mut NullProgress, 2).unwrap();
    let first = session.results().clone();
    compute(&mut session, &params, &ids, &mut NullProgress, 3).unwrap();
    assert_eq!(session.results(), &first);
    assert_eq!(session.results().get_results(Method::HertzFit, "a").unwrap().len(), 5);
}

#[test]
fn test_failures_stay_with_their_curve() {
    let mut session = session(vec![
        SimulationConfig::map("a", 5),
        SimulationConfig::map("b", 5),
        SimulationConfig::map("c", 5),
    ]);
    let ids = session.file_ids();
    let summary = compute_with(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 4, &FlakyAnalyzer).unwrap();
    assert_eq!(summary.total().failed, 2);
    assert_eq!(summary.files["a"].failed, 0);
    assert_eq!(summary.files["c"].failed, 0);

    for id in ["a", "c"] {
        let records = session.results().get_results(Method::HertzFit, id).unwrap();
        assert_eq!(records.iter().map(|r| r.curve_index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(records.iter().all(|r| r.outcome == CurveOutcome::Empty));
    }

    let b = session.results().get_results(Method::HertzFit, "b").unwrap();
    assert_eq!(b.iter().map(|r| r.curve_index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    assert_eq!(b[2].failure().unwrap().kind, ErrorKind::FitConvergence);
    assert_eq!(b[3].failure().unwrap().kind, ErrorKind::TaskPanicked);
    assert!(b[3].failure().unwrap().message.contains("forced panic"));
    for index in [0, 1, 4] {
        assert_eq!(b[index].outcome, CurveOutcome::Empty);
    }
}

#[test]
fn test_repeated_file_ids_run_once() {
    let mut session = session(vec![SimulationConfig::map("a", 3), SimulationConfig::map("b", 3)]);
    let ids = vec!["a".to_string(), "b".to_string(), "a".to_string()];

    let summary = compute_with(&mut session, &params(Method::HertzFit, false), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    assert_eq!(summary.mode, ComputeMode::SingleCurve);
    assert_eq!(summary.total().total(), 2);
    let a = session.results().get_results(Method::HertzFit, "a").unwrap();
    assert_eq!(a.iter().map(|r| r.curve_index).collect::<Vec<_>>(), vec![0]);

    compute_with(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    let a = session.results().get_results(Method::HertzFit, "a").unwrap();
    assert_eq!(a.iter().map(|r| r.curve_index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn test_preprocessing_failures_are_recorded() {
    let mut config = SimulationConfig::map("a", 4);
    config.corrupt_curves.insert(1);
    let mut session = session(vec![config]);
    let ids = session.file_ids();
    let mut progress = RecordingProgress::default();
    compute(&mut session, &params(Method::HertzFit, true), &ids, &mut progress, 2).unwrap();

    let records = session.results().get_results(Method::HertzFit, "a").unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[1].failure().unwrap().kind, ErrorKind::ChannelNotFound);
    assert!(records[0].result().is_some());
    assert_eq!(progress.steps, vec![STEP_PREPROCESSING.to_string(), STEP_COMPUTING.to_string()]);
    assert_eq!(progress.ranges, vec![4, 4]);
    assert_eq!(progress.last, 4);
}

#[test]
fn test_mode_selection() {
    let mut session = session(vec![SimulationConfig::single("single"), SimulationConfig::map("map", 6)]);
    session.set_current_curve_index(0);
    let ids = session.file_ids();

    let summary = compute_with(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    assert_eq!(summary.mode, ComputeMode::Map);
    assert_eq!(session.results().get_results(Method::HertzFit, "map").unwrap().len(), 6);
    assert_eq!(session.results().get_results(Method::HertzFit, "single").unwrap().len(), 1);

    let summary = compute_with(&mut session, &params(Method::HertzFit, false), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    assert_eq!(summary.mode, ComputeMode::SingleCurve);
    assert_eq!(session.results().get_results(Method::HertzFit, "map").unwrap().len(), 1);

    let singles = vec!["single".to_string()];
    let summary = compute_with(&mut session, &params(Method::HertzFit, true), &singles, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    assert_eq!(summary.mode, ComputeMode::SingleCurve);
}

#[test]
fn test_single_curve_mode_uses_current_curve() {
    let mut session = session(vec![SimulationConfig::map("a", 6), SimulationConfig::map("b", 6)]);
    session.set_current_curve_index(4);
    let ids = session.file_ids();
    compute_with(&mut session, &params(Method::HertzFit, false), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    for id in ["a", "b"] {
        let records = session.results().get_results(Method::HertzFit, id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].curve_index, 4);
    }
}

#[test]
fn test_unknown_file_aborts_before_dispatch() {
    let mut session = session(vec![SimulationConfig::map("a", 3)]);
    let ids = vec!["a".to_string(), "missing".to_string()];
    let err = compute(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 2).unwrap_err();
    assert!(matches!(err, ComputeError::UnknownFile(ref id) if id == "missing"));
    assert!(session.results().is_empty());
}

#[test]
fn test_other_methods_are_untouched() {
    let mut session = session(vec![SimulationConfig::map("a", 3)]);
    let ids = session.file_ids();
    compute_with(&mut session, &params(Method::HertzFit, true), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    compute_with(&mut session, &params(Method::TingFit, true), &ids, &mut NullProgress, 2, &FlakyAnalyzer).unwrap();
    assert_eq!(session.results().get_results(Method::HertzFit, "a").unwrap().len(), 3);
    assert_eq!(session.results().get_results(Method::TingFit, "a").unwrap().len(), 3);
}
