use serde_json::json;

use fdrheo::compute::{compute, NullProgress};
use fdrheo::params::{AnalysisParameters, ParameterTree};
use fdrheo::piezo_table::{PiezoCharRow, PiezoCharTable, PiezoLookup};
use fdrheo::results::{AnalysisResult, CurveRecord};
use fdrheo::routines::Method;
use fdrheo::session::Session;
use fdrheo::sim::{ModulationResponse, SimulationConfig, SyntheticForceFile};

fn tree(extra: &[(&str, serde_json::Value)]) -> ParameterTree {
    let mut tree: ParameterTree = [
        ("Spring Constant", json!(0.1)),
        ("Deflection Sensitivity", json!(50)),
        ("Contact Model", json!("paraboloid")),
        ("Tip Radius", json!(25)),
        ("PoC Window", json!(50)),
        ("Auto Init E0", json!(true)),
        ("Compute All Curves", json!(true)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        tree.insert(k.to_string(), v.clone());
    }
    tree
}

fn run(session: &mut Session, method: Method, tree: &ParameterTree) -> Vec<CurveRecord> {
    let params = AnalysisParameters::from_tree(method, tree).unwrap();
    let ids = session.file_ids();
    compute(session, &params, &ids, &mut NullProgress, 2).unwrap();
    session.results().get_results(method, &ids[0]).unwrap().to_vec()
}

fn single_file(config: SimulationConfig) -> Session {
    let mut session = Session::new();
    session.add_file(Box::new(SyntheticForceFile::new(config)));
    session
}

#[test]
fn test_viscous_drag_with_unmatched_piezo_table() {
    let drag = 5e-6;
    let config = SimulationConfig {
        modulation_frequencies: vec![12.0],
        modulation_response: ModulationResponse::Hydrodynamic { drag },
        deflection_noise: 0.0,
        ..SimulationConfig::map("drag", 2)
    };
    let mut session = single_file(config);
    session.set_piezo_char_table(Some(PiezoCharTable::from_rows([PiezoCharRow {
        frequency: 10.0,
        fi_degrees: 30.0,
        amp_quotient: 0.8,
    }])));

    let records = run(&mut session, Method::VDrag, &tree(&[]));
    assert_eq!(records.len(), 2);
    for record in records {
        let Some(AnalysisResult::VDrag(result)) = record.result() else {
            panic!("vdrag failed: {:?}", record.outcome);
        };
        assert_eq!(result.points.len(), 1);
        let point = &result.points[0];
        assert_eq!(point.piezo, PiezoLookup::Mismatch);
        assert!((point.bh - drag).abs() / drag < 0.02, "bh {}", point.bh);
    }
}

#[test]
fn test_piezo_characterization_feeds_reference_table() {
    let config = SimulationConfig {
        modulation_frequencies: vec![5.0, 50.0],
        modulation_response: ModulationResponse::Contact { gain: 0.5, phase: -0.3 },
        deflection_noise: 0.0,
        ..SimulationConfig::map("piezo", 3)
    };
    let mut session = single_file(config);
    let records = run(&mut session, Method::PiezoChar, &tree(&[]));
    for record in &records {
        let Some(AnalysisResult::PiezoChar(points)) = record.result() else {
            panic!("piezo characterization failed: {:?}", record.outcome);
        };
        let frequencies: Vec<f64> = points.iter().map(|p| p.frequency).collect();
        assert_eq!(frequencies, vec![5.0, 50.0]);
        for point in points {
            assert!((point.amp_quotient - 0.5).abs() < 0.01);
            assert!((point.fi_degrees.abs() - 0.3f64.to_degrees()).abs() < 0.5);
        }
    }

    let table = session.piezo_table_from_results("piezo").unwrap();
    assert_eq!(table.frequencies(), vec![5.0, 50.0]);
    assert!(table.lookup(5.0).is_some());
    assert!(table.lookup(6.0).is_none());
}

#[test]
fn test_rheology_without_modulation_is_empty() {
    let mut session = single_file(SimulationConfig::map("flat", 2));
    let records = run(&mut session, Method::Microrheo, &tree(&[]));
    assert!(records.iter().all(|r| r.result().is_none() && r.failure().is_none()));
}

#[test]
fn test_microrheology_estimators_agree() {
    let config = SimulationConfig {
        modulation_frequencies: vec![1.0, 10.0],
        deflection_noise: 0.0,
        ..SimulationConfig::map("rheo", 2)
    };
    let mut session = single_file(config);
    let fft = run(&mut session, Method::Microrheo, &tree(&[]));
    let sine = run(&mut session, Method::MicrorheoSine, &tree(&[]));
    assert_eq!(fft.len(), 2);
    assert_eq!(sine.len(), 2);

    for (a, b) in fft.iter().zip(&sine) {
        let (Some(AnalysisResult::Microrheo(a)), Some(AnalysisResult::Microrheo(b))) = (a.result(), b.result()) else {
            panic!("microrheology failed: {:?} / {:?}", a.outcome, b.outcome);
        };
        assert!(a.wc > 0.0);
        assert_eq!(a.points.len(), 2);
        for (pa, pb) in a.points.iter().zip(&b.points) {
            assert_eq!(pa.frequency, pb.frequency);
            assert_eq!(pa.piezo, PiezoLookup::Uncorrected);
            assert!(pa.g_storage > 0.0 && pa.g_loss > 0.0);
            assert!((pa.g_storage - pb.g_storage).abs() / pa.g_storage < 0.05);
            assert!((pa.g_loss - pb.g_loss).abs() / pa.g_loss < 0.05);
            assert!(pb.indentation_fit.is_some());
        }
    }
}

#[test]
fn test_max_frequency_skips_segments() {
    let config = SimulationConfig {
        modulation_frequencies: vec![1.0, 10.0, 100.0],
        ..SimulationConfig::map("limit", 1)
    };
    let mut session = single_file(config);
    let records = run(&mut session, Method::Microrheo, &tree(&[("Max Frequency", json!(10))]));
    let Some(AnalysisResult::Microrheo(result)) = records[0].result() else {
        panic!("microrheology failed: {:?}", records[0].outcome);
    };
    let frequencies: Vec<f64> = result.points.iter().map(|p| p.frequency).collect();
    assert_eq!(frequencies, vec![1.0, 10.0]);
}

#[test]
fn test_ting_on_elastic_sample() {
    let file = SyntheticForceFile::new(SimulationConfig::map("ting", 2));
    let expected: Vec<f64> = (0..2).map(|i| file.curve_modulus(i)).collect();
    let mut session = Session::new();
    session.add_file(Box::new(file));

    let records = run(&mut session, Method::TingFit, &tree(&[("Init Fluid. Exp.", json!(0.05))]));
    for (record, expected) in records.iter().zip(expected) {
        let Some(AnalysisResult::Ting { ting, hertz }) = record.result() else {
            panic!("ting failed: {:?}", record.outcome);
        };
        assert!((hertz.e0 - expected).abs() / expected < 0.1);
        assert!((ting.e0 - expected).abs() / expected < 0.25, "ting e0 {} expected {}", ting.e0, expected);
        assert!(ting.beta < 0.2);
    }
}

#[test]
fn test_hertz_fit_on_retract_segment() {
    let mut session = single_file(SimulationConfig::map("hertz", 1));
    let records = run(
        &mut session,
        Method::HertzFit,
        &tree(&[("Curve Segment", json!("retract")), ("Fit Range Type", json!("indentation")), ("Max Indentation", json!(2000))]),
    );
    let Some(AnalysisResult::Hertz(hertz)) = records[0].result() else {
        panic!("retract fit failed: {:?}", records[0].outcome);
    };
    assert!(hertz.e0 > 0.0);
}
