use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use fdcore::algorithm::signal::{detrend_rolling_average, Detrended};
use fdcore::data::curve::ProcessedCurve;
use fdcore::data::segment::{Segment, SegmentType};
use fdcore::error::CurveError;

use crate::params::{AnalysisParameters, CurveSegment, RheologyParams};
use crate::piezo_table::PiezoCharTable;
use crate::results::AnalysisResult;

pub mod hertz_fit;
pub mod microrheo;
pub mod piezo_char;
pub mod ting_fit;
pub mod vdrag;

/// The analysis routines, one dispatch table for naming, segment
/// requirements, result slot and routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    HertzFit,
    TingFit,
    PiezoChar,
    VDrag,
    Microrheo,
    MicrorheoSine,
}

/// Where results of a method live in the result store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultSlot {
    Hertz,
    Ting,
    PiezoChar,
    VDrag,
    Microrheo,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::HertzFit,
        Method::TingFit,
        Method::PiezoChar,
        Method::VDrag,
        Method::Microrheo,
        Method::MicrorheoSine,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::HertzFit => "HertzFit",
            Method::TingFit => "TingFit",
            Method::PiezoChar => "PiezoChar",
            Method::VDrag => "VDrag",
            Method::Microrheo => "Microrheo",
            Method::MicrorheoSine => "MicrorheoSine",
        }
    }

    /// Both microrheology variants write into the same slot.
    pub fn slot(&self) -> ResultSlot {
        match self {
            Method::HertzFit => ResultSlot::Hertz,
            Method::TingFit => ResultSlot::Ting,
            Method::PiezoChar => ResultSlot::PiezoChar,
            Method::VDrag => ResultSlot::VDrag,
            Method::Microrheo | Method::MicrorheoSine => ResultSlot::Microrheo,
        }
    }

    /// Segment types a curve must carry before the routine is attempted.
    /// Modulation segments are never required: without them the rheology
    /// routines report an empty result.
    pub fn required_segments(&self, params: &AnalysisParameters) -> Vec<SegmentType> {
        match self {
            Method::HertzFit => match params.hertz.as_ref().map(|h| h.curve_segment) {
                Some(CurveSegment::Retract) => vec![SegmentType::Retract],
                _ => vec![SegmentType::Extend],
            },
            Method::TingFit => vec![SegmentType::Extend, SegmentType::Retract],
            Method::PiezoChar | Method::VDrag => vec![],
            Method::Microrheo | Method::MicrorheoSine => vec![SegmentType::Extend],
        }
    }

    /// Run the routine on one preprocessed curve.
    ///
    /// # Arguments
    /// * `curve` - preprocessed curve
    /// * `params` - parameter bundle of the compute call
    /// * `piezo_table` - optional piezo characterization reference
    ///
    /// # Returns
    /// * `Ok(None)` when the curve has nothing to analyze for this method
    pub fn run(
        &self,
        curve: &ProcessedCurve,
        params: &AnalysisParameters,
        piezo_table: Option<&PiezoCharTable>,
    ) -> Result<Option<AnalysisResult>, CurveError> {
        let k = params.spring_constant;
        match self {
            Method::HertzFit => {
                let hertz = section(params.hertz.as_ref(), "hertz")?;
                hertz_fit::run(curve, k, hertz).map(|r| Some(AnalysisResult::Hertz(r)))
            }
            Method::TingFit => {
                let ting = section(params.ting.as_ref(), "ting")?;
                ting_fit::run(curve, k, ting).map(|(ting, hertz)| Some(AnalysisResult::Ting { ting, hertz }))
            }
            Method::PiezoChar => {
                let rheology = section(params.rheology.as_ref(), "rheology")?;
                piezo_char::run(curve, rheology).map(|points| {
                    (!points.is_empty()).then_some(AnalysisResult::PiezoChar(points))
                })
            }
            Method::VDrag => {
                let rheology = section(params.rheology.as_ref(), "rheology")?;
                vdrag::run(curve, k, rheology, piezo_table).map(|r| {
                    (!r.points.is_empty()).then_some(AnalysisResult::VDrag(r))
                })
            }
            Method::Microrheo | Method::MicrorheoSine => {
                let hertz = section(params.hertz.as_ref(), "hertz")?;
                let rheology = section(params.rheology.as_ref(), "rheology")?;
                let estimator = if *self == Method::Microrheo {
                    microrheo::Estimator::Fft
                } else {
                    microrheo::Estimator::Sine
                };
                microrheo::run(curve, k, hertz, rheology, piezo_table, estimator).map(|r| {
                    (!r.points.is_empty()).then_some(AnalysisResult::Microrheo(r))
                })
            }
        }
    }
}

fn section<'a, T>(section: Option<&'a T>, name: &str) -> Result<&'a T, CurveError> {
    section.ok_or_else(|| CurveError::InvalidData(format!("parameter bundle has no {} section", name)))
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .find(|m| m.name() == s)
            .copied()
            .ok_or_else(|| format!("unknown method: {}", s))
    }
}

/// Turns one preprocessed curve into a result; implemented by the routine
/// dispatcher and by test doubles.
pub trait CurveAnalyzer: Sync {
    fn analyze(
        &self,
        curve: &ProcessedCurve,
        params: &AnalysisParameters,
    ) -> Result<Option<AnalysisResult>, CurveError>;
}

/// Routes curves to the routine named in the parameter bundle.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dispatcher<'a> {
    pub piezo_table: Option<&'a PiezoCharTable>,
}

impl CurveAnalyzer for Dispatcher<'_> {
    fn analyze(
        &self,
        curve: &ProcessedCurve,
        params: &AnalysisParameters,
    ) -> Result<Option<AnalysisResult>, CurveError> {
        for segment_type in params.method.required_segments(params) {
            if !curve.has_segment(segment_type) {
                return Err(CurveError::MissingSegment(segment_type));
            }
        }
        params.method.run(curve, params, self.piezo_table)
    }
}

/// Segment used for contact analyses: the first extend as acquired, or the
/// last retract read from its last sample.
pub fn contact_segment(curve: &ProcessedCurve, choice: CurveSegment) -> Result<Segment, CurveError> {
    match choice {
        CurveSegment::Extend => curve.first_extend().cloned(),
        CurveSegment::Retract => curve.last_retract().map(|s| s.reversed()),
    }
}

/// A modulation segment with its drift removed.
pub struct Oscillation {
    pub frequency: f64,
    pub sampling_rate: f64,
    pub signal: Detrended,
}

/// Detrended modulation segments within the frequency limit, in acquisition order.
pub fn oscillations(curve: &ProcessedCurve, rheology: &RheologyParams) -> Result<Vec<Oscillation>, CurveError> {
    let mut out = Vec::new();
    for segment in curve.modulation_segments() {
        let frequency = segment.modulation_frequency()?;
        if !rheology.accepts(frequency) {
            continue;
        }
        let sampling_rate = segment.sampling_rate()?;
        let signal = detrend_rolling_average(
            frequency,
            sampling_rate,
            &segment.height,
            &segment.deflection,
            &segment.time,
        )?;
        out.push(Oscillation {
            frequency,
            sampling_rate,
            signal,
        });
    }
    Ok(out)
}
