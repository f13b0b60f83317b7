use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::beta::{checked_beta, checked_beta_reg};

use crate::algorithm::signal::{linear_slope, smooth};
use crate::error::CurveError;
use crate::models::fit::{least_squares, FitConfig, Parameter, Residuals};
use crate::models::geometry::ContactGeometry;

/// Upper bound of the power-law exponent.
pub const MAX_BETA: f64 = 0.99;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TingModelType {
    /// Convolution of the measured indentation history.
    Numeric,
    /// Closed form for a constant approach and retract velocity.
    Analytical,
}

impl fmt::Display for TingModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TingModelType::Numeric => write!(f, "numerical"),
            TingModelType::Analytical => write!(f, "analytical"),
        }
    }
}

impl FromStr for TingModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "numeric" | "numerical" => Ok(TingModelType::Numeric),
            "analytical" => Ok(TingModelType::Analytical),
            other => Err(format!("unknown ting model type: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TingSettings {
    pub geometry: ContactGeometry,
    pub tip_param: f64,
    pub poisson: f64,
    pub model_type: TingModelType,
    pub e0_init: f64,
    pub tc_init: f64,
    pub beta_init: f64,
    pub f0_init: f64,
    /// Reference time of the relaxation function, not fitted.
    pub t0: f64,
    /// Viscous drag coefficient of the cantilever in N·s/m.
    pub vdrag: f64,
    /// Smoothing window in samples applied to the indentation history.
    pub smoothing_window: usize,
}

impl Default for TingSettings {
    fn default() -> Self {
        TingSettings {
            geometry: ContactGeometry::Paraboloid,
            tip_param: 25e-9,
            poisson: 0.5,
            model_type: TingModelType::Analytical,
            e0_init: 1000.0,
            tc_init: 0.0,
            beta_init: 0.2,
            f0_init: 0.0,
            t0: 1.0,
            vdrag: 0.0,
            smoothing_window: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TingResult {
    pub model_type: TingModelType,
    pub e0: f64,
    pub tc: f64,
    pub beta: f64,
    pub f0: f64,
    pub t0: f64,
    pub v0t: f64,
    pub v0r: f64,
    pub chisq: f64,
    pub redchi: f64,
    pub r_squared: f64,
    pub n_points: usize,
}

/// Approach and retract data of one contact cycle, time starting at zero.
pub struct TingData<'a> {
    pub time: &'a [f64],
    pub force: &'a [f64],
    pub indentation: &'a [f64],
    /// Index of the turning point between approach and retract.
    pub idx_tm: usize,
}

struct TingModel<'a> {
    settings: &'a TingSettings,
    time: &'a [f64],
    indentation: Vec<f64>,
    idx_tm: usize,
    v0t: f64,
    v0r: f64,
}

impl TingModel<'_> {
    fn coefficient(&self) -> f64 {
        self.settings.geometry.hertz_coefficient(self.settings.tip_param)
            / (1.0 - self.settings.poisson * self.settings.poisson)
    }

    fn drag(&self, i: usize) -> f64 {
        if i <= self.idx_tm {
            self.settings.vdrag * self.v0t
        } else {
            -self.settings.vdrag * self.v0r
        }
    }

    fn relaxation(&self, e0: f64, beta: f64, dt: f64) -> f64 {
        e0 * (dt / self.settings.t0).powf(-beta)
    }

    fn numeric(&self, e0: f64, tc: f64, beta: f64, f0: f64) -> Vec<f64> {
        let n = self.time.len();
        let exponent = self.settings.geometry.exponent();
        let coeff = self.coefficient();

        // indentation history relative to the contact time
        let start = self.time.iter().position(|&t| t >= tc).unwrap_or(n);
        let reference = if start < n { self.indentation[start] } else { 0.0 };
        let delta: Vec<f64> = (0..n)
            .map(|i| if i < start { 0.0 } else { (self.indentation[i] - reference).max(0.0) })
            .collect();
        let delta_n: Vec<f64> = delta.iter().map(|d| d.powf(exponent)).collect();

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            if i <= start || start >= n {
                out.push(f0 + if i >= start { self.drag(i) } else { 0.0 });
                continue;
            }
            let t = self.time[i];
            let upper = if i <= self.idx_tm {
                i
            } else {
                // t1: the history before it balances the relaxation of the retract
                let mut acc = 0.0;
                let mut j = i;
                let mut t1_index = start;
                while j > start {
                    let mid = 0.5 * (self.time[j] + self.time[j - 1]);
                    acc += self.relaxation(e0, beta, t - mid) * (delta[j] - delta[j - 1]);
                    if j <= self.idx_tm && acc >= 0.0 {
                        t1_index = j - 1;
                        break;
                    }
                    j -= 1;
                }
                t1_index
            };
            let mut integral = 0.0;
            for k in (start + 1)..=upper {
                let mid = 0.5 * (self.time[k] + self.time[k - 1]);
                integral += self.relaxation(e0, beta, t - mid) * (delta_n[k] - delta_n[k - 1]);
            }
            out.push(coeff * integral + f0 + self.drag(i));
        }
        out
    }

    fn analytical(&self, e0: f64, tc: f64, beta: f64, f0: f64) -> Vec<f64> {
        let n = self.settings.geometry.exponent();
        let coeff = self.coefficient();
        let tm = self.time[self.idx_tm];
        let beta_full = checked_beta(n, 1.0 - beta).unwrap_or(f64::NAN);
        let prefactor = coeff * e0 * self.settings.t0.powf(beta) * n * self.v0t.powf(n) * beta_full;
        let ratio = (1.0 + self.v0r / self.v0t).powf(1.0 / (1.0 - beta));

        self.time
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let tau = t - tc;
                if tau <= 0.0 {
                    return f0;
                }
                if t <= tm {
                    prefactor * tau.powf(n - beta) + f0 + self.drag(i)
                } else {
                    let tau_m = tm - tc;
                    let t1 = (tau - ratio * (tau - tau_m)).clamp(0.0, tau_m.max(0.0));
                    if t1 <= 0.0 {
                        return f0 + self.drag(i);
                    }
                    let fraction = checked_beta_reg(n, 1.0 - beta, (t1 / tau).min(1.0)).unwrap_or(f64::NAN);
                    prefactor * tau.powf(n - beta) * fraction + f0 + self.drag(i)
                }
            })
            .collect()
    }
}

impl Residuals for TingModel<'_> {
    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let (e0, tc, beta, f0) = (params[0], params[1], params[2], params[3]);
        match self.settings.model_type {
            TingModelType::Numeric => self.numeric(e0, tc, beta, f0),
            TingModelType::Analytical => self.analytical(e0, tc, beta, f0),
        }
    }
}

/// Approach and retract indentation velocities from linear fits of the
/// indentation against time on each side of the turning point.
pub fn estimate_velocities(time: &[f64], indentation: &[f64], idx_tm: usize) -> Option<(f64, f64)> {
    let split = (idx_tm + 1).min(time.len());
    let v0t = linear_slope(&time[..split], &indentation[..split])?;
    let v0r = -linear_slope(&time[idx_tm..], &indentation[idx_tm..])?;
    Some((v0t, v0r))
}

/// Fit the Ting viscoelastic model with a power-law relaxation modulus
/// `E(t) = E0 · (t / t0)^-β` to one approach-retract cycle.
///
/// # Arguments
/// * `data` - rezeroed force, indentation and time of the contact cycle
/// * `velocities` - approach and retract velocities in m/s, estimated from the data when `None`
/// * `settings` - geometry, model type and initial guesses
pub fn fit_ting(
    data: &TingData,
    velocities: Option<(f64, f64)>,
    settings: &TingSettings,
) -> Result<TingResult, CurveError> {
    let n = data.time.len();
    if data.force.len() != n || data.indentation.len() != n {
        return Err(CurveError::InvalidData(format!(
            "time ({}), force ({}) and indentation ({}) lengths differ",
            n,
            data.force.len(),
            data.indentation.len()
        )));
    }
    if n <= 4 {
        return Err(CurveError::insufficient("ting fit", 5, n));
    }
    if data.idx_tm == 0 || data.idx_tm >= n - 1 {
        return Err(CurveError::InvalidData(format!(
            "force maximum at sample {} leaves no approach or retract",
            data.idx_tm
        )));
    }

    let indentation = if settings.smoothing_window > 1 {
        smooth(data.indentation, settings.smoothing_window)
    } else {
        data.indentation.to_vec()
    };

    let (v0t, v0r) = match velocities {
        Some(v) => v,
        None => estimate_velocities(data.time, &indentation, data.idx_tm).ok_or_else(|| {
            CurveError::InvalidData("cannot estimate indentation velocities".to_string())
        })?,
    };
    if !(v0t > 0.0) || !(v0r > 0.0) {
        return Err(CurveError::InvalidData(format!(
            "indentation velocities must be positive, got approach {} and retract {}",
            v0t, v0r
        )));
    }

    let tm = data.time[data.idx_tm];
    let force_scale = data.force.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let params = vec![
        Parameter::new("E0", settings.e0_init).with_bounds(0.0, f64::INFINITY),
        Parameter::new("tc", settings.tc_init)
            .with_bounds(0.0, tm)
            .with_scale(tm.max(f64::EPSILON)),
        Parameter::new("betaE", settings.beta_init)
            .with_bounds(0.0, MAX_BETA)
            .with_scale(0.1),
        Parameter::new("F0", settings.f0_init).with_scale(force_scale.max(1e-15)),
    ];

    let model = TingModel {
        settings,
        time: data.time,
        indentation,
        idx_tm: data.idx_tm,
        v0t,
        v0r,
    };
    let report = least_squares(&model, data.force, &params, &FitConfig::default())?;

    Ok(TingResult {
        model_type: settings.model_type,
        e0: report.values[0],
        tc: report.values[1],
        beta: report.values[2],
        f0: report.values[3],
        t0: settings.t0,
        v0t,
        v0r,
        chisq: report.chisq,
        redchi: report.redchi,
        r_squared: report.r_squared,
        n_points: n,
    })
}

/// Force predicted by a fitted Ting result for the given cycle.
pub fn evaluate_ting(result: &TingResult, data: &TingData, settings: &TingSettings) -> Vec<f64> {
    let model = TingModel {
        settings,
        time: data.time,
        indentation: data.indentation.to_vec(),
        idx_tm: data.idx_tm,
        v0t: result.v0t,
        v0r: result.v0r,
    };
    model.predict(&[result.e0, result.tc, result.beta, result.f0])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangular indentation: approach at `v` until `tm`, retract at `v`.
    fn cycle(tc: f64, tm: f64, v: f64, n: usize) -> (Vec<f64>, Vec<f64>, usize) {
        let t_end = 2.0 * tm - tc;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * t_end / (n - 1) as f64).collect();
        let indentation: Vec<f64> = time
            .iter()
            .map(|&t| if t <= tm { v * (t - tc) } else { v * (tm - tc) - v * (t - tm) })
            .collect();
        let idx_tm = time.iter().position(|&t| t >= tm).unwrap();
        (time, indentation, idx_tm)
    }

    #[test]
    fn test_analytical_approach_is_power_law() {
        let settings = TingSettings::default();
        let (time, indentation, idx_tm) = cycle(0.1, 0.6, 1e-6, 201);
        let model = TingModel {
            settings: &settings,
            time: &time,
            indentation: indentation.clone(),
            idx_tm,
            v0t: 1e-6,
            v0r: 1e-6,
        };
        let force = model.predict(&[1000.0, 0.1, 0.0, 0.0]);
        // beta = 0 reduces to Hertz on the approach
        let coeff = settings.geometry.hertz_coefficient(settings.tip_param) / (1.0 - 0.25);
        let i = idx_tm / 2 + 20;
        let expected = coeff * 1000.0 * indentation[i].max(0.0).powf(1.5);
        assert!((force[i] - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_analytical_fit_recovers_parameters() {
        let settings = TingSettings {
            e0_init: 500.0,
            tc_init: 0.05,
            beta_init: 0.1,
            ..Default::default()
        };
        let (time, indentation, idx_tm) = cycle(0.1, 0.6, 1e-6, 301);
        let truth = TingModel {
            settings: &settings,
            time: &time,
            indentation: indentation.clone(),
            idx_tm,
            v0t: 1e-6,
            v0r: 1e-6,
        }
        .predict(&[1500.0, 0.1, 0.25, 0.0]);
        let data = TingData {
            time: &time,
            force: &truth,
            indentation: &indentation,
            idx_tm,
        };
        let result = fit_ting(&data, Some((1e-6, 1e-6)), &settings).unwrap();
        assert!((result.e0 - 1500.0).abs() / 1500.0 < 1e-2);
        assert!((result.beta - 0.25).abs() < 1e-2);
        assert!((result.tc - 0.1).abs() < 1e-2);
        assert!(result.beta <= MAX_BETA);
    }

    #[test]
    fn test_numeric_model_follows_analytical_on_approach() {
        let mut settings = TingSettings::default();
        let (time, indentation, idx_tm) = cycle(0.1, 0.6, 1e-6, 401);
        let params = [1000.0, 0.1, 0.2, 0.0];
        let analytical = TingModel {
            settings: &settings,
            time: &time,
            indentation: indentation.clone(),
            idx_tm,
            v0t: 1e-6,
            v0r: 1e-6,
        }
        .predict(&params);
        settings.model_type = TingModelType::Numeric;
        let numeric = TingModel {
            settings: &settings,
            time: &time,
            indentation: indentation.clone(),
            idx_tm,
            v0t: 1e-6,
            v0r: 1e-6,
        }
        .predict(&params);
        let peak = analytical[idx_tm];
        assert!(peak > 0.0);
        assert!((numeric[idx_tm] - peak).abs() / peak < 0.05);
    }

    #[test]
    fn test_estimate_velocities() {
        let (time, indentation, idx_tm) = cycle(0.0, 0.5, 2e-6, 101);
        let (v0t, v0r) = estimate_velocities(&time, &indentation, idx_tm).unwrap();
        assert!((v0t - 2e-6).abs() / 2e-6 < 1e-6);
        assert!((v0r - 2e-6).abs() / 2e-6 < 1e-6);
    }

    #[test]
    fn test_rejects_turning_point_at_edge() {
        let (time, indentation, _) = cycle(0.0, 0.5, 1e-6, 50);
        let force = vec![0.0; 50];
        let data = TingData {
            time: &time,
            force: &force,
            indentation: &indentation,
            idx_tm: 49,
        };
        assert!(fit_ting(&data, Some((1e-6, 1e-6)), &TingSettings::default()).is_err());
    }

    #[test]
    fn test_model_type_from_str() {
        assert_eq!("numerical".parse::<TingModelType>().unwrap(), TingModelType::Numeric);
        assert_eq!("Analytical".parse::<TingModelType>().unwrap(), TingModelType::Analytical);
    }
}
