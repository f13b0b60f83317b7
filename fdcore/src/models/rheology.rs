use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::CurveError;
use crate::models::geometry::ContactGeometry;

/// Upper limit on the number of blocks averaged for one transfer function.
const MAX_BLOCKS: usize = 4;

/// Response of an output signal to an input signal at one drive frequency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferFunction {
    pub h: Complex<f64>,
    /// Magnitude-squared coherence between input and output, in `[0, 1]`.
    pub gamma2: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PiezoLag {
    pub fi_degrees: f64,
    pub amp_quotient: f64,
    pub gamma2: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragCoefficient {
    /// Hydrodynamic drag coefficient in N·s/m.
    pub bh: f64,
    /// Force over height transfer function after piezo correction, in N/m.
    pub hd: Complex<f64>,
    pub gamma2: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComplexModulus {
    pub g_storage: f64,
    pub g_loss: f64,
    pub gamma2: f64,
}

/// Piezo correction applied to a measured transfer function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PiezoCorrection {
    pub fi_degrees: f64,
    pub amp_quotient: f64,
}

impl Default for PiezoCorrection {
    fn default() -> Self {
        PiezoCorrection {
            fi_degrees: 0.0,
            amp_quotient: 1.0,
        }
    }
}

impl PiezoCorrection {
    fn apply(&self, h: Complex<f64>) -> Complex<f64> {
        h / Complex::from_polar(self.amp_quotient, self.fi_degrees.to_radians())
    }
}

/// Transfer function `output / input` at `frequency`.
///
/// The signals are cut into up to four blocks spanning whole drive periods;
/// cross and auto spectra at the drive bin are averaged over the blocks.
///
/// # Arguments
/// * `input`, `output` - detrended signals sharing one time axis
/// * `fs` - sampling rate in Hz
/// * `frequency` - drive frequency in Hz
pub fn transfer_function(
    input: &[f64],
    output: &[f64],
    fs: f64,
    frequency: f64,
) -> Result<TransferFunction, CurveError> {
    let n = input.len().min(output.len());
    if !(frequency > 0.0) || !(fs > 0.0) {
        return Err(CurveError::InvalidData(format!(
            "invalid sampling rate {} or drive frequency {}",
            fs, frequency
        )));
    }
    let period = ((fs / frequency).round() as usize).max(1);
    if n < period {
        return Err(CurveError::insufficient("transfer function period", period, n));
    }

    let periods = n / period;
    let periods_per_block = (periods / MAX_BLOCKS).max(1);
    let block_len = periods_per_block * period;
    let blocks = n / block_len;
    let bin = ((frequency * block_len as f64 / fs).round() as usize).min(block_len / 2);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(block_len);

    let mut sxy = Complex::new(0.0, 0.0);
    let mut sxx = 0.0;
    let mut syy = 0.0;

    for b in 0..blocks {
        let range = b * block_len..(b + 1) * block_len;
        let mut x = centered(&input[range.clone()]);
        let mut y = centered(&output[range]);
        fft.process(&mut x);
        fft.process(&mut y);
        let (xk, yk) = (x[bin], y[bin]);
        sxy += xk.conj() * yk;
        sxx += xk.norm_sqr();
        syy += yk.norm_sqr();
    }

    if sxx == 0.0 {
        return Err(CurveError::InvalidData(format!(
            "input carries no power at {} Hz",
            frequency
        )));
    }

    let gamma2 = if syy > 0.0 { sxy.norm_sqr() / (sxx * syy) } else { 0.0 };
    Ok(TransferFunction { h: sxy / sxx, gamma2 })
}

fn centered(values: &[f64]) -> Vec<Complex<f64>> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| Complex::new(v - mean, 0.0)).collect()
}

/// Phase lag and amplitude ratio of the deflection against the piezo height
/// measured on a hard reference surface.
pub fn piezo_lag(height: &[f64], deflection: &[f64], fs: f64, frequency: f64) -> Result<PiezoLag, CurveError> {
    let tf = transfer_function(height, deflection, fs, frequency)?;
    Ok(PiezoLag {
        fi_degrees: tf.h.arg().to_degrees(),
        amp_quotient: tf.h.norm(),
        gamma2: tf.gamma2,
    })
}

/// Hydrodynamic drag coefficient from an oscillation away from the surface.
pub fn drag_coefficient(
    deflection: &[f64],
    height: &[f64],
    spring_constant: f64,
    fs: f64,
    frequency: f64,
    correction: PiezoCorrection,
) -> Result<DragCoefficient, CurveError> {
    let tf = transfer_function(height, deflection, fs, frequency)?;
    let hd = correction.apply(tf.h) * spring_constant;
    Ok(DragCoefficient {
        bh: hd.im / (2.0 * PI * frequency),
        hd,
        gamma2: tf.gamma2,
    })
}

/// Contact geometry and working point of an oscillatory indentation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoint {
    pub geometry: ContactGeometry,
    pub tip_param: f64,
    pub poisson: f64,
    /// Working indentation in meters.
    pub wc: f64,
}

/// Complex shear modulus from an oscillation in contact.
///
/// `G* = factor · (k · D / (Z - D) - i · ω · bcoef)` where `D / Z` is the
/// corrected height-to-deflection transfer function.
pub fn complex_modulus(
    deflection: &[f64],
    height: &[f64],
    spring_constant: f64,
    fs: f64,
    frequency: f64,
    contact: ContactPoint,
    correction: PiezoCorrection,
    bcoef: f64,
) -> Result<ComplexModulus, CurveError> {
    if !(contact.wc > 0.0) {
        return Err(CurveError::InvalidData(format!(
            "working indentation must be positive, got {}",
            contact.wc
        )));
    }
    let tf = transfer_function(height, deflection, fs, frequency)?;
    let h = correction.apply(tf.h);
    let one = Complex::new(1.0, 0.0);
    let omega = 2.0 * PI * frequency;
    let stiffness = h / (one - h) * spring_constant - Complex::new(0.0, omega * bcoef);
    let g = stiffness * contact.geometry.modulus_factor(contact.tip_param, contact.poisson, contact.wc);
    Ok(ComplexModulus {
        g_storage: g.re,
        g_loss: g.im,
        gamma2: tf.gamma2,
    })
}

/// Complex shear modulus from fitted sine amplitudes and phase difference.
pub fn complex_modulus_from_sines(
    contact: ContactPoint,
    spring_constant: f64,
    amp_deflection: f64,
    amp_indentation: f64,
    delta_phi: f64,
    frequency: f64,
    bcoef: f64,
) -> Complex<f64> {
    let ratio = spring_constant * amp_deflection / amp_indentation;
    let g = Complex::new(
        ratio * delta_phi.cos(),
        ratio * delta_phi.sin() - 2.0 * PI * frequency * bcoef,
    );
    g * contact.geometry.modulus_factor(contact.tip_param, contact.poisson, contact.wc)
}
