use itertools::izip;

use fdcore::algorithm::force::{rezero, to_force_indentation, Reference};
use fdcore::algorithm::poc::{estimate_poc, PointOfContact};
use fdcore::data::curve::ProcessedCurve;
use fdcore::data::segment::Segment;
use fdcore::error::CurveError;
use fdcore::models::hertz::{fit_hertz, HertzResult, HertzSettings};

use crate::params::{FitRange, HertzParams};
use crate::routines::contact_segment;

/// Samples kept for a Hertz fit: all pre-contact samples followed by the
/// contact samples inside `range`.
pub fn select_fit_range(indentation: &[f64], force: &[f64], range: FitRange) -> (Vec<f64>, Vec<f64>) {
    let mut pre = (Vec::new(), Vec::new());
    let mut contact = (Vec::new(), Vec::new());
    for (&i, &f) in izip!(indentation, force) {
        if i < 0.0 {
            pre.0.push(i);
            pre.1.push(f);
        } else if range.contains(i, f) {
            contact.0.push(i);
            contact.1.push(f);
        }
    }
    pre.0.extend(contact.0);
    pre.1.extend(contact.1);
    pre
}

/// Locate the contact point on `segment` and fit the Hertz model to its
/// force-indentation curve.
pub fn fit_segment(
    segment: &Segment,
    spring_constant: f64,
    poc_window: usize,
    settings: &HertzSettings,
    range: FitRange,
    rezero_force: bool,
) -> Result<(HertzResult, PointOfContact), CurveError> {
    let poc = estimate_poc(&segment.height, &segment.deflection, poc_window)?;
    let (indentation, mut force) =
        to_force_indentation(&segment.height, &segment.deflection, poc.as_reference(), spring_constant);
    if rezero_force {
        rezero(&mut force, Reference::First);
    }
    let (indentation, force) = select_fit_range(&indentation, &force, range);
    let result = fit_hertz(&indentation, &force, settings)?;
    Ok((result, poc))
}

pub fn run(curve: &ProcessedCurve, spring_constant: f64, params: &HertzParams) -> Result<HertzResult, CurveError> {
    let segment = contact_segment(curve, params.curve_segment)?;
    let (result, _) = fit_segment(
        &segment,
        spring_constant,
        params.poc_window,
        &params.settings(),
        params.fit_range,
        true,
    )?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_contact_samples_always_kept() {
        let indentation = vec![-2e-9, -1e-9, 0.0, 5e-9, 50e-9, 150e-9];
        let force = vec![0.0, 0.0, 0.0, 1e-10, 1e-9, 5e-9];
        let range = FitRange::Indentation { min: 0.0, max: 100e-9 };
        let (ind, f) = select_fit_range(&indentation, &force, range);
        assert_eq!(ind, vec![-2e-9, -1e-9, 0.0, 5e-9, 50e-9]);
        assert_eq!(f.len(), 5);

        let (ind, _) = select_fit_range(&indentation, &force, FitRange::Force { min: 5e-10, max: 2e-9 });
        assert_eq!(ind, vec![-2e-9, -1e-9, 50e-9]);
    }
}
