use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use fdcore::models::geometry::ContactGeometry;
use fdcore::models::hertz::HertzSettings;
use fdcore::models::ting::{TingModelType, TingSettings};

use crate::routines::Method;

/// Flat parameter map as entered by the user, values in display units.
pub type ParameterTree = BTreeMap<String, Value>;

pub const DEFAULT_HEIGHT_CHANNEL: &str = "measuredHeight";

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    MissingKey(String),
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
}

fn invalid(key: &str, reason: impl Into<String>) -> ParamError {
    ParamError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn number(tree: &ParameterTree, key: &str) -> Result<Option<f64>, ParamError> {
    match tree.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(key, "not representable as f64")),
        Some(other) => Err(invalid(key, format!("expected a number, got {}", other))),
    }
}

fn required(tree: &ParameterTree, key: &str) -> Result<f64, ParamError> {
    number(tree, key)?.ok_or_else(|| ParamError::MissingKey(key.to_string()))
}

fn number_or(tree: &ParameterTree, key: &str, default: f64) -> Result<f64, ParamError> {
    Ok(number(tree, key)?.unwrap_or(default))
}

fn count_or(tree: &ParameterTree, key: &str, default: usize) -> Result<usize, ParamError> {
    let value = number_or(tree, key, default as f64)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(invalid(key, format!("expected a non-negative integer, got {}", value)));
    }
    Ok(value as usize)
}

fn flag_or(tree: &ParameterTree, key: &str, default: bool) -> Result<bool, ParamError> {
    match tree.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(key, format!("expected a boolean, got {}", other))),
    }
}

fn text_or<'a>(tree: &'a ParameterTree, key: &str, default: &'a str) -> Result<&'a str, ParamError> {
    match tree.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(invalid(key, format!("expected a string, got {}", other))),
    }
}

fn parsed_or<T: FromStr<Err = String>>(tree: &ParameterTree, key: &str, default: &str) -> Result<T, ParamError> {
    text_or(tree, key, default)?.parse::<T>().map_err(|e| invalid(key, e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveSegment {
    Extend,
    Retract,
}

impl FromStr for CurveSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extend" => Ok(CurveSegment::Extend),
            "retract" => Ok(CurveSegment::Retract),
            other => Err(format!("unknown curve segment: {}", other)),
        }
    }
}

/// Which contact samples enter a Hertz fit; pre-contact samples always do.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FitRange {
    Full,
    Indentation { min: f64, max: f64 },
    Force { min: f64, max: f64 },
}

impl FitRange {
    pub fn contains(&self, indentation: f64, force: f64) -> bool {
        match *self {
            FitRange::Full => true,
            FitRange::Indentation { min, max } => indentation >= min && indentation <= max,
            FitRange::Force { min, max } => force >= min && force <= max,
        }
    }
}

/// Tip geometry shared by every contact analysis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactParams {
    pub geometry: ContactGeometry,
    /// Radius in m for paraboloids, half-angle in degrees otherwise.
    pub tip_param: f64,
    pub poisson: f64,
}

impl ContactParams {
    fn from_tree(tree: &ParameterTree) -> Result<Self, ParamError> {
        let geometry: ContactGeometry = parsed_or(tree, "Contact Model", "paraboloid")?;
        let tip_param = match geometry {
            // nm
            ContactGeometry::Paraboloid => required(tree, "Tip Radius")? / 1e9,
            ContactGeometry::Cone | ContactGeometry::Pyramid => required(tree, "Tip Angle")?,
        };
        if !(tip_param > 0.0) {
            return Err(invalid("Tip Radius / Tip Angle", "must be positive"));
        }
        let poisson = number_or(tree, "Poisson Ratio", 0.5)?;
        if !(0.0..0.5 + f64::EPSILON).contains(&poisson) {
            return Err(invalid("Poisson Ratio", format!("{} outside [0, 0.5]", poisson)));
        }
        Ok(ContactParams {
            geometry,
            tip_param,
            poisson,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HertzParams {
    pub contact: ContactParams,
    pub curve_segment: CurveSegment,
    pub poc_window: usize,
    pub fit_range: FitRange,
    pub e0_init: f64,
    pub d0_init: f64,
    pub f0_init: f64,
    pub slope_init: f64,
    pub fit_line: bool,
    pub auto_init_e0: bool,
}

impl HertzParams {
    fn from_tree(tree: &ParameterTree) -> Result<Self, ParamError> {
        let fit_range = match text_or(tree, "Fit Range Type", "full")? {
            "full" => FitRange::Full,
            // nm
            "indentation" => FitRange::Indentation {
                min: number_or(tree, "Min Indentation", 0.0)? / 1e9,
                max: number_or(tree, "Max Indentation", 100.0)? / 1e9,
            },
            // nN
            "force" => FitRange::Force {
                min: number_or(tree, "Min Force", 0.0)? / 1e9,
                max: number_or(tree, "Max Force", 100.0)? / 1e9,
            },
            other => return Err(invalid("Fit Range Type", format!("unknown range type {}", other))),
        };
        Ok(HertzParams {
            contact: ContactParams::from_tree(tree)?,
            curve_segment: parsed_or(tree, "Curve Segment", "extend")?,
            poc_window: count_or(tree, "PoC Window", 50)?,
            fit_range,
            e0_init: number_or(tree, "Init E0", 1000.0)?,
            d0_init: number_or(tree, "Init d0", 0.0)? / 1e9,
            f0_init: number_or(tree, "Init f0", 0.0)? / 1e9,
            slope_init: number_or(tree, "Init Slope", 0.0)?,
            fit_line: flag_or(tree, "Fit Line to non contact", false)?,
            auto_init_e0: flag_or(tree, "Auto Init E0", false)?,
        })
    }

    pub fn settings(&self) -> HertzSettings {
        HertzSettings {
            geometry: self.contact.geometry,
            tip_param: self.contact.tip_param,
            poisson: self.contact.poisson,
            e0_init: self.e0_init,
            d0_init: self.d0_init,
            f0_init: self.f0_init,
            slope_init: self.slope_init,
            fit_line: self.fit_line,
            auto_init_e0: self.auto_init_e0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TingParams {
    pub contact: ContactParams,
    pub poc_window: usize,
    pub model_type: TingModelType,
    pub e0_init: f64,
    pub auto_init_e0: bool,
    pub d0_init: f64,
    pub f0_init: f64,
    pub slope_init: f64,
    pub beta_init: f64,
    pub t0: f64,
    /// N·s/m
    pub vdrag: f64,
    pub smoothing_window: usize,
    /// m, samples shallower than `-contact_offset` are excluded
    pub contact_offset: f64,
    pub correct_vdrag: bool,
    pub poly_order: usize,
    /// m/s
    pub ramp_speed: f64,
    pub estimate_velocities: bool,
}

impl TingParams {
    fn from_tree(tree: &ParameterTree) -> Result<Self, ParamError> {
        let t0 = number_or(tree, "t0", 1.0)?;
        if !(t0 > 0.0) {
            return Err(invalid("t0", "must be positive"));
        }
        Ok(TingParams {
            contact: ContactParams::from_tree(tree)?,
            poc_window: count_or(tree, "PoC Window", 50)?,
            model_type: parsed_or(tree, "Model Type", "analytical")?,
            e0_init: number_or(tree, "Init E0", 1000.0)?,
            auto_init_e0: flag_or(tree, "Auto Init E0", false)?,
            d0_init: number_or(tree, "Init d0", 0.0)? / 1e9,
            f0_init: number_or(tree, "Init f0", 0.0)? / 1e9,
            slope_init: number_or(tree, "Init Slope", 0.0)?,
            beta_init: number_or(tree, "Init Fluid. Exp.", 0.2)?,
            t0,
            vdrag: number_or(tree, "Viscous Drag", 0.0)? / 1e3,
            smoothing_window: count_or(tree, "Smoothing Window", 5)?,
            contact_offset: number_or(tree, "Contact Offset", 1.0)? / 1e6,
            correct_vdrag: flag_or(tree, "Correct Viscous Drag", false)?,
            poly_order: count_or(tree, "Poly. Order", 2)?,
            ramp_speed: number_or(tree, "Ramp Speed", 0.0)? / 1e6,
            estimate_velocities: flag_or(tree, "Estimate V0t & V0r", false)?,
        })
    }

    /// Settings of the Hertz fit that seeds the Ting fit.
    pub fn hertz_settings(&self) -> HertzSettings {
        HertzSettings {
            geometry: self.contact.geometry,
            tip_param: self.contact.tip_param,
            poisson: self.contact.poisson,
            e0_init: self.e0_init,
            d0_init: self.d0_init,
            f0_init: self.f0_init,
            slope_init: self.slope_init,
            fit_line: false,
            auto_init_e0: self.auto_init_e0,
        }
    }

    pub fn ting_settings(&self, e0_init: f64, tc_init: f64) -> TingSettings {
        TingSettings {
            geometry: self.contact.geometry,
            tip_param: self.contact.tip_param,
            poisson: self.contact.poisson,
            model_type: self.model_type,
            e0_init,
            tc_init,
            beta_init: self.beta_init,
            f0_init: self.f0_init,
            t0: self.t0,
            vdrag: self.vdrag,
            smoothing_window: self.smoothing_window,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RheologyParams {
    /// Modulation segments above this frequency are skipped; `None` keeps all.
    pub max_frequency: Option<f64>,
    /// Damping coefficient in N·s/m subtracted from the loss term.
    pub bcoef: f64,
}

impl RheologyParams {
    fn from_tree(tree: &ParameterTree) -> Result<Self, ParamError> {
        let max_frequency = number_or(tree, "Max Frequency", 0.0)?;
        Ok(RheologyParams {
            max_frequency: (max_frequency != 0.0).then_some(max_frequency),
            bcoef: number_or(tree, "B Coef", 0.0)?,
        })
    }

    pub fn accepts(&self, frequency: f64) -> bool {
        self.max_frequency.map_or(true, |max| frequency <= max)
    }
}

/// Immutable SI parameter bundle for one compute call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParameters {
    pub method: Method,
    pub height_channel: String,
    /// N/m
    pub spring_constant: f64,
    /// m/V
    pub deflection_sensitivity: f64,
    pub compute_all_curves: bool,
    pub hertz: Option<HertzParams>,
    pub ting: Option<TingParams>,
    pub rheology: Option<RheologyParams>,
}

impl AnalysisParameters {
    /// Build the bundle for `method`, converting user units to SI.
    ///
    /// # Arguments
    /// * `method` - analysis routine the bundle is for
    /// * `tree` - flat user parameter map
    pub fn from_tree(method: Method, tree: &ParameterTree) -> Result<Self, ParamError> {
        let spring_constant = required(tree, "Spring Constant")?;
        if !(spring_constant > 0.0) {
            return Err(invalid("Spring Constant", "must be positive"));
        }
        // nm/V
        let deflection_sensitivity = required(tree, "Deflection Sensitivity")? / 1e9;
        if !(deflection_sensitivity > 0.0) {
            return Err(invalid("Deflection Sensitivity", "must be positive"));
        }

        let (hertz, ting, rheology) = match method {
            Method::HertzFit => (Some(HertzParams::from_tree(tree)?), None, None),
            Method::TingFit => (None, Some(TingParams::from_tree(tree)?), None),
            Method::PiezoChar | Method::VDrag => (None, None, Some(RheologyParams::from_tree(tree)?)),
            Method::Microrheo | Method::MicrorheoSine => (
                Some(HertzParams::from_tree(tree)?),
                None,
                Some(RheologyParams::from_tree(tree)?),
            ),
        };

        Ok(AnalysisParameters {
            method,
            height_channel: text_or(tree, "Height Channel", DEFAULT_HEIGHT_CHANNEL)?.to_string(),
            spring_constant,
            deflection_sensitivity,
            compute_all_curves: flag_or(tree, "Compute All Curves", false)?,
            hertz,
            ting,
            rheology,
        })
    }

    /// Same as [`AnalysisParameters::from_tree`] with the method given by name.
    pub fn from_named(method: &str, tree: &ParameterTree) -> Result<Self, ParamError> {
        let method = method
            .parse::<Method>()
            .map_err(|_| ParamError::UnknownMethod(method.to_string()))?;
        Self::from_tree(method, tree)
    }
}
