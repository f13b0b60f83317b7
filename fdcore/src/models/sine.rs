use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::CurveError;
use crate::models::fit::{least_squares, FitConfig, Parameter, Residuals};

/// `wave(t) = amplitude · sin(omega · t + phase) + offset`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SineFit {
    pub amplitude: f64,
    pub omega: f64,
    pub phase: f64,
    pub offset: f64,
    pub redchi: f64,
    pub r_squared: f64,
}

impl SineFit {
    /// Same sine with a non-negative amplitude; a negative amplitude is
    /// folded into the phase by adding π.
    pub fn canonical(&self) -> SineFit {
        if self.amplitude < 0.0 {
            SineFit {
                amplitude: -self.amplitude,
                phase: self.phase + PI,
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        self.amplitude * (self.omega * t + self.phase).sin() + self.offset
    }
}

struct Sine<'a> {
    time: &'a [f64],
}

impl Residuals for Sine<'_> {
    fn predict(&self, params: &[f64]) -> Vec<f64> {
        let (a, w, p, c) = (params[0], params[1], params[2], params[3]);
        self.time.iter().map(|t| a * (w * t + p).sin() + c).collect()
    }
}

/// Fit a sine of known frequency to `wave`. Amplitude starts at `std · √2`,
/// offset at the mean and phase at zero; the angular frequency is fixed.
pub fn fit_sine(time: &[f64], wave: &[f64], frequency: f64) -> Result<SineFit, CurveError> {
    if time.len() != wave.len() {
        return Err(CurveError::InvalidData(format!(
            "time ({}) and wave ({}) lengths differ",
            time.len(),
            wave.len()
        )));
    }
    if wave.len() < 4 {
        return Err(CurveError::insufficient("sine fit", 4, wave.len()));
    }

    let omega = 2.0 * PI * frequency;
    let amplitude = wave.iter().population_std_dev() * 2f64.sqrt();
    let offset = wave.iter().mean();
    let scale = amplitude.abs().max(f64::MIN_POSITIVE);

    let params = vec![
        Parameter::new("A", amplitude).with_scale(scale),
        Parameter::fixed("w", omega),
        Parameter::new("p", 0.0).with_scale(1.0),
        Parameter::new("c", offset).with_scale(scale),
    ];
    let report = least_squares(&Sine { time }, wave, &params, &FitConfig::default())?;

    Ok(SineFit {
        amplitude: report.values[0],
        omega,
        phase: report.values[2],
        offset: report.values[3],
        redchi: report.redchi,
        r_squared: report.r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_amplitude_and_phase() {
        let f = 5.0;
        let time: Vec<f64> = (0..400).map(|i| i as f64 / 1000.0).collect();
        let wave: Vec<f64> = time.iter().map(|t| 3e-9 * (2.0 * PI * f * t + 0.6).sin() + 1e-9).collect();
        let fit = fit_sine(&time, &wave, f).unwrap().canonical();
        assert!((fit.amplitude - 3e-9).abs() < 1e-13);
        let phase = fit.phase.rem_euclid(2.0 * PI);
        assert!((phase - 0.6).abs() < 1e-4);
        assert!((fit.offset - 1e-9).abs() < 1e-13);
    }

    #[test]
    fn test_canonical_folds_negative_amplitude() {
        let fit = SineFit {
            amplitude: -2.0,
            omega: 1.0,
            phase: 0.3,
            offset: 0.0,
            redchi: 0.0,
            r_squared: 1.0,
        };
        let canonical = fit.canonical();
        assert_eq!(canonical.amplitude, 2.0);
        assert!((canonical.phase - (0.3 + PI)).abs() < 1e-12);
        for t in [0.0, 0.7, 2.1] {
            assert!((fit.evaluate(t) - canonical.evaluate(t)).abs() < 1e-12);
        }
    }
}
