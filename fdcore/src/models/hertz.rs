use serde::{Deserialize, Serialize};

use crate::error::CurveError;
use crate::models::fit::{least_squares, FitConfig, Parameter, Residuals};
use crate::models::geometry::ContactGeometry;

/// Starting values and options of a Hertz fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HertzSettings {
    pub geometry: ContactGeometry,
    pub tip_param: f64,
    pub poisson: f64,
    pub e0_init: f64,
    pub d0_init: f64,
    pub f0_init: f64,
    pub slope_init: f64,
    /// Fit a sloped line on the non-contact part instead of a flat baseline.
    pub fit_line: bool,
    /// Seed E0 from the deepest contact point instead of `e0_init`.
    pub auto_init_e0: bool,
}

impl Default for HertzSettings {
    fn default() -> Self {
        HertzSettings {
            geometry: ContactGeometry::Paraboloid,
            tip_param: 25e-9,
            poisson: 0.5,
            e0_init: 1000.0,
            d0_init: 0.0,
            f0_init: 0.0,
            slope_init: 0.0,
            fit_line: false,
            auto_init_e0: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HertzResult {
    pub geometry: ContactGeometry,
    pub tip_param: f64,
    pub poisson: f64,
    pub e0: f64,
    pub delta0: f64,
    pub f0: f64,
    pub slope: Option<f64>,
    pub chisq: f64,
    pub redchi: f64,
    pub r_squared: f64,
    pub n_points: usize,
}

impl HertzResult {
    pub fn evaluate(&self, indentation: &[f64]) -> Vec<f64> {
        let model = HertzModel {
            geometry: self.geometry,
            tip_param: self.tip_param,
            poisson: self.poisson,
            indentation,
        };
        model.predict(&[self.e0, self.delta0, self.f0, self.slope.unwrap_or(0.0)])
    }
}

struct HertzModel<'a> {
    geometry: ContactGeometry,
    tip_param: f64,
    poisson: f64,
    indentation: &'a [f64],
}

impl Residuals for HertzModel<'_> {
    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let (e0, d0, f0, slope) = (params[0], params[1], params[2], params[3]);
        let coeff = self.geometry.hertz_coefficient(self.tip_param) / (1.0 - self.poisson * self.poisson);
        let n = self.geometry.exponent();
        self.indentation
            .iter()
            .map(|&ind| {
                let delta = ind - d0;
                if delta >= 0.0 {
                    coeff * e0 * delta.powf(n) + f0
                } else {
                    slope * delta + f0
                }
            })
            .collect()
    }
}

/// Young's modulus that puts the Hertz curve through the deepest sample.
pub fn estimate_e0(indentation: &[f64], force: &[f64], settings: &HertzSettings) -> Option<f64> {
    let (ind, f) = indentation
        .iter()
        .zip(force)
        .filter(|(i, _)| i.is_finite())
        .max_by(|a, b| a.0.total_cmp(b.0))?;
    let delta = ind - settings.d0_init;
    if delta <= 0.0 {
        return None;
    }
    let coeff = settings.geometry.hertz_coefficient(settings.tip_param)
        / (1.0 - settings.poisson * settings.poisson);
    let e0 = (f - settings.f0_init) / (coeff * delta.powf(settings.geometry.exponent()));
    (e0.is_finite() && e0 > 0.0).then_some(e0)
}

/// Fit the Hertz contact model to a force-indentation curve.
///
/// Parameters are `E0` (Pa), `delta0` (m), `f0` (N) and, with `fit_line`,
/// the baseline slope (N/m).
pub fn fit_hertz(
    indentation: &[f64],
    force: &[f64],
    settings: &HertzSettings,
) -> Result<HertzResult, CurveError> {
    if indentation.len() != force.len() {
        return Err(CurveError::InvalidData(format!(
            "indentation ({}) and force ({}) lengths differ",
            indentation.len(),
            force.len()
        )));
    }
    let free = if settings.fit_line { 4 } else { 3 };
    if indentation.len() <= free {
        return Err(CurveError::insufficient("hertz fit", free + 1, indentation.len()));
    }

    let e0_init = if settings.auto_init_e0 {
        estimate_e0(indentation, force, settings).unwrap_or(settings.e0_init)
    } else {
        settings.e0_init
    };

    let ind_scale = indentation.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let force_scale = force.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));

    let params = vec![
        Parameter::new("E0", e0_init).with_bounds(0.0, f64::INFINITY),
        Parameter::new("delta0", settings.d0_init).with_scale(ind_scale.max(1e-12)),
        Parameter::new("f0", settings.f0_init).with_scale(force_scale.max(1e-15)),
        Parameter::new("slope", if settings.fit_line { settings.slope_init } else { 0.0 })
            .with_scale((force_scale / ind_scale.max(1e-12)).max(1e-6))
            .with_vary(settings.fit_line),
    ];

    let model = HertzModel {
        geometry: settings.geometry,
        tip_param: settings.tip_param,
        poisson: settings.poisson,
        indentation,
    };
    let report = least_squares(&model, force, &params, &FitConfig::default())?;

    Ok(HertzResult {
        geometry: settings.geometry,
        tip_param: settings.tip_param,
        poisson: settings.poisson,
        e0: report.values[0],
        delta0: report.values[1],
        f0: report.values[2],
        slope: settings.fit_line.then_some(report.values[3]),
        chisq: report.chisq,
        redchi: report.redchi,
        r_squared: report.r_squared,
        n_points: indentation.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(e0: f64, d0: f64, settings: &HertzSettings) -> (Vec<f64>, Vec<f64>) {
        let indentation: Vec<f64> = (0..200).map(|i| -100e-9 + i as f64 * 1.5e-9).collect();
        let model = HertzModel {
            geometry: settings.geometry,
            tip_param: settings.tip_param,
            poisson: settings.poisson,
            indentation: &indentation,
        };
        let force = model.predict(&[e0, d0, 0.0, 0.0]);
        (indentation, force)
    }

    #[test]
    fn test_recovers_paraboloid_modulus() {
        let settings = HertzSettings::default();
        let (ind, force) = synthetic(2500.0, 5e-9, &settings);
        let result = fit_hertz(&ind, &force, &settings).unwrap();
        assert!((result.e0 - 2500.0).abs() / 2500.0 < 1e-3);
        assert!((result.delta0 - 5e-9).abs() < 1e-10);
        assert!(result.r_squared > 0.9999);
    }

    #[test]
    fn test_recovers_cone_modulus_with_auto_seed() {
        let settings = HertzSettings {
            geometry: ContactGeometry::Cone,
            tip_param: 35.0,
            e0_init: 1.0,
            auto_init_e0: true,
            ..Default::default()
        };
        let (ind, force) = synthetic(10_000.0, 0.0, &settings);
        let seed = estimate_e0(&ind, &force, &settings).unwrap();
        assert!((seed - 10_000.0).abs() / 10_000.0 < 1e-9);
        let result = fit_hertz(&ind, &force, &settings).unwrap();
        assert!((result.e0 - 10_000.0).abs() / 10_000.0 < 1e-3);
        assert_eq!(result.slope, None);
    }

    #[test]
    fn test_too_few_points() {
        let err = fit_hertz(&[0.0, 1e-9], &[0.0, 1e-10], &HertzSettings::default()).unwrap_err();
        assert!(matches!(err, CurveError::InsufficientSamples { .. }));
    }

    #[test]
    fn test_evaluate_matches_model() {
        let settings = HertzSettings::default();
        let (ind, force) = synthetic(1200.0, 0.0, &settings);
        let result = fit_hertz(&ind, &force, &settings).unwrap();
        let evaluated = result.evaluate(&ind);
        let max_err = evaluated.iter().zip(&force).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max);
        let max_force = force.iter().cloned().fold(0.0, f64::max);
        assert!(max_err < max_force * 1e-3);
    }
}
