use nalgebra::{DMatrix, DVector};

use crate::error::CurveError;

/// Height, deflection and time of a modulation segment with the slow drift removed.
#[derive(Clone, Debug, PartialEq)]
pub struct Detrended {
    pub height: Vec<f64>,
    pub deflection: Vec<f64>,
    pub time: Vec<f64>,
}

/// Centered rolling mean over `window` samples; only positions where the
/// full window fits are returned, `result[k]` belongs to sample `k + window / 2`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - window + 1);
    let mut acc: f64 = values[..window].iter().sum();
    out.push(acc / window as f64);
    for i in window..values.len() {
        acc += values[i] - values[i - window];
        out.push(acc / window as f64);
    }
    out
}

/// Remove the drift of a modulated signal by subtracting a rolling average
/// spanning one oscillation period. Edge samples without a full window are dropped.
///
/// # Arguments
/// * `frequency` - modulation frequency in Hz
/// * `sampling_rate` - samples per second
/// * `height`, `deflection`, `time` - channels of the segment
pub fn detrend_rolling_average(
    frequency: f64,
    sampling_rate: f64,
    height: &[f64],
    deflection: &[f64],
    time: &[f64],
) -> Result<Detrended, CurveError> {
    if !(frequency > 0.0) {
        return Err(CurveError::InvalidData(format!(
            "modulation frequency must be positive, got {}",
            frequency
        )));
    }
    let window = ((sampling_rate / frequency).round() as usize).max(1);
    let n = height.len();
    if window > n {
        return Err(CurveError::insufficient("detrend window", window, n));
    }

    let half = window / 2;
    let height_mean = rolling_mean(height, window);
    let deflection_mean = rolling_mean(deflection, window);

    let indices = half..half + height_mean.len();
    Ok(Detrended {
        height: indices.clone().zip(&height_mean).map(|(i, m)| height[i] - m).collect(),
        deflection: indices.clone().zip(&deflection_mean).map(|(i, m)| deflection[i] - m).collect(),
        time: indices.map(|i| time[i]).collect(),
    })
}

/// Same-length moving average, the window shrinks at the edges.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let half = window / 2;
    let n = values.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

/// Least squares polynomial coefficients, lowest order first.
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Result<Vec<f64>, CurveError> {
    let n = x.len();
    if n <= order {
        return Err(CurveError::insufficient("polynomial fit", order + 1, n));
    }
    let design = DMatrix::from_fn(n, order + 1, |r, c| x[r].powi(c as i32));
    let target = DVector::from_column_slice(y);
    let coefficients = design
        .svd(true, true)
        .solve(&target, 1e-15)
        .map_err(|e| CurveError::InvalidData(format!("polynomial fit failed: {}", e)))?;
    Ok(coefficients.iter().copied().collect())
}

pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Slope of the ordinary least squares line through `(x, y)`.
pub fn linear_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / n_f;
    let mean_y = y[..n].iter().sum::<f64>() / n_f;
    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..n {
        cov += (x[i] - mean_x) * (y[i] - mean_y);
        var += (x[i] - mean_x) * (x[i] - mean_x);
    }
    if var == 0.0 {
        return None;
    }
    Some(cov / var)
}

/// Index of the largest value, first occurrence wins.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ if v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
