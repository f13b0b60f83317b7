use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::CurveError;

/// Relative floor applied to the pre-contact variance, scaled by the
/// variance of the whole trace.
const VARIANCE_FLOOR: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointOfContact {
    pub index: usize,
    pub height: f64,
    pub deflection: f64,
}

impl PointOfContact {
    /// Contact point as `[height, deflection]`, deflection referenced to zero.
    pub fn as_reference(&self) -> [f64; 2] {
        [self.height, 0.0]
    }
}

/// Estimate the point of contact with the ratio-of-variance method.
///
/// For every split `j` the deflection variance of the `window_size` samples
/// after the split is divided by the variance of the `window_size` samples
/// before it. The split with the largest ratio is the contact point.
///
/// # Arguments
/// * `height` - zero-referenced height, ordered from free to in-contact
/// * `deflection` - deflection sharing the height index
/// * `window_size` - window length in samples
pub fn estimate_poc(
    height: &[f64],
    deflection: &[f64],
    window_size: usize,
) -> Result<PointOfContact, CurveError> {
    let n = height.len();
    if deflection.len() != n {
        return Err(CurveError::InvalidData(format!(
            "height ({}) and deflection ({}) lengths differ",
            n,
            deflection.len()
        )));
    }
    if window_size == 0 {
        return Err(CurveError::insufficient("poc window", 1, 0));
    }
    if window_size > n || 2 * window_size > n {
        return Err(CurveError::insufficient("poc window", 2 * window_size, n));
    }

    let floor = deflection.iter().population_variance() * VARIANCE_FLOOR;

    let mut best_index = window_size;
    let mut best_ratio = f64::NEG_INFINITY;

    for j in window_size..=(n - window_size) {
        let pre = deflection[j - window_size..j].iter().population_variance();
        let post = deflection[j..j + window_size].iter().population_variance();
        let ratio = if post > 0.0 { post / (pre + floor) } else { 0.0 };
        if ratio > best_ratio {
            best_ratio = ratio;
            best_index = j;
        }
    }

    Ok(PointOfContact {
        index: best_index,
        height: height[best_index],
        deflection: deflection[best_index],
    })
}
