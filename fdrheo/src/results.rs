use serde::{Deserialize, Serialize};

use fdcore::error::{CurveError, ErrorKind};
use fdcore::models::hertz::HertzResult;
use fdcore::models::sine::SineFit;
use fdcore::models::ting::TingResult;

use crate::piezo_table::PiezoLookup;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PiezoCharPoint {
    pub frequency: f64,
    pub fi_degrees: f64,
    pub amp_quotient: f64,
    pub gamma2: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VDragPoint {
    pub frequency: f64,
    /// N·s/m
    pub bh: f64,
    pub hd_real: f64,
    pub hd_imag: f64,
    pub gamma2: f64,
    pub piezo: PiezoLookup,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VDragResult {
    pub points: Vec<VDragPoint>,
    /// Signed retract step distances in m, x axis of the drag plot.
    pub distances: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MicrorheoPoint {
    pub frequency: f64,
    pub g_storage: f64,
    pub g_loss: f64,
    /// Coherence of the FFT estimate, absent for sine fits.
    pub gamma2: Option<f64>,
    pub indentation_fit: Option<SineFit>,
    pub deflection_fit: Option<SineFit>,
    pub piezo: PiezoLookup,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MicrorheoResult {
    /// Hertz fit on the approach that fixed the contact point.
    pub hertz: HertzResult,
    /// Working indentation in m.
    pub wc: f64,
    pub points: Vec<MicrorheoPoint>,
}

/// Result of one routine on one curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnalysisResult {
    Hertz(HertzResult),
    Ting { ting: TingResult, hertz: HertzResult },
    PiezoChar(Vec<PiezoCharPoint>),
    VDrag(VDragResult),
    Microrheo(MicrorheoResult),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CurveOutcome {
    Computed(AnalysisResult),
    /// The routine ran but had nothing to report, e.g. no modulation segments.
    Empty,
    Failed(CurveFailure),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveRecord {
    pub curve_index: usize,
    pub outcome: CurveOutcome,
}

impl CurveRecord {
    pub fn from_result(curve_index: usize, result: Result<Option<AnalysisResult>, CurveError>) -> Self {
        let outcome = match result {
            Ok(Some(result)) => CurveOutcome::Computed(result),
            Ok(None) => CurveOutcome::Empty,
            Err(err) => CurveOutcome::Failed(CurveFailure {
                kind: err.kind(),
                message: err.to_string(),
            }),
        };
        CurveRecord { curve_index, outcome }
    }

    pub fn panicked(curve_index: usize, message: String) -> Self {
        CurveRecord {
            curve_index,
            outcome: CurveOutcome::Failed(CurveFailure {
                kind: ErrorKind::TaskPanicked,
                message,
            }),
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            CurveOutcome::Computed(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&CurveFailure> {
        match &self.outcome {
            CurveOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
